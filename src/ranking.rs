use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::Signal;

/// Canonical dedup key. Matches `Signal::id` for signals built through
/// `Signal::builder`.
pub fn dedup_key(signal: &Signal) -> String {
    Signal::key(
        signal.signal_type,
        &signal.organization_id,
        signal.class_id.as_deref(),
        signal.student_id.as_deref(),
    )
}

/// Severity first (highest first), then most recent `detected_at` first.
pub fn compare_signals(a: &Signal, b: &Signal) -> Ordering {
    b.severity
        .rank()
        .cmp(&a.severity.rank())
        .then_with(|| b.detected_at.cmp(&a.detected_at))
}

pub fn sort_signals(signals: &mut [Signal]) {
    signals.sort_by(compare_signals);
}

/// Sort, then keep the first signal seen for each canonical key.
pub fn dedupe_and_sort(mut signals: Vec<Signal>) -> Vec<Signal> {
    sort_signals(&mut signals);
    let mut seen = HashSet::with_capacity(signals.len());
    signals.retain(|signal| seen.insert(dedup_key(signal)));
    signals
}

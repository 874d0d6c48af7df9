use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::copilot::{get_recommended_signal_actions, CatalogAction};
use crate::models::{Severity, Signal, SignalType};

#[derive(Debug, Clone, PartialEq)]
pub struct SignalTypeSummary {
    pub signal_type: SignalType,
    pub count: usize,
    pub highest_severity: Severity,
}

pub fn summarize_by_type(signals: &[Signal]) -> Vec<SignalTypeSummary> {
    let mut map: HashMap<SignalType, (usize, Severity)> = HashMap::new();

    for signal in signals {
        let entry = map.entry(signal.signal_type).or_insert((0, signal.severity));
        entry.0 += 1;
        entry.1 = entry.1.max(signal.severity);
    }

    let mut summaries: Vec<SignalTypeSummary> = map
        .into_iter()
        .map(|(signal_type, (count, highest_severity))| SignalTypeSummary {
            signal_type,
            count,
            highest_severity,
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.highest_severity
            .cmp(&a.highest_severity)
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.signal_type.cmp(&b.signal_type))
    });
    summaries
}

/// Markdown report over an already ranked signal list.
pub fn build_report<A: CatalogAction + std::fmt::Display>(
    organization_id: &str,
    generated_at: DateTime<Utc>,
    signals: &[Signal],
    catalog: &[A],
    limit: usize,
) -> String {
    let summaries = summarize_by_type(signals);
    let mut output = String::new();

    let _ = writeln!(output, "# Coaching Risk Signals");
    let _ = writeln!(
        output,
        "Generated for organization {} at {}",
        organization_id,
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Signal Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No signals detected.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} signals (highest severity {})",
                summary.signal_type, summary.count, summary.highest_severity
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Signals");

    if signals.is_empty() {
        let _ = writeln!(output, "Nothing needs attention right now.");
    } else {
        for signal in signals.iter().take(limit) {
            let _ = writeln!(
                output,
                "- [{}] {} ({})",
                signal.severity,
                signal.title,
                signal.detected_at.format("%Y-%m-%d")
            );
            let _ = writeln!(output, "  {}", signal.summary);

            let actions = get_recommended_signal_actions(Some(signal), catalog);
            if !actions.is_empty() {
                let labels: Vec<String> = actions.iter().map(|a| a.to_string()).collect();
                let _ = writeln!(output, "  Next steps: {}", labels.join(", "));
            }
        }
    }

    output
}

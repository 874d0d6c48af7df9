//! Ranking and action lookup for the copilot panel.

use crate::models::{CopilotAction, Signal};
use crate::ranking;

/// Anything in an action catalog that can be matched by id.
pub trait CatalogAction {
    fn action_id(&self) -> &str;
}

impl CatalogAction for CopilotAction {
    fn action_id(&self) -> &str {
        &self.id
    }
}

/// Copy of `signals` in engine order. The input is left untouched.
pub fn sort_copilot_signals(signals: &[Signal]) -> Vec<Signal> {
    let mut sorted = signals.to_vec();
    ranking::sort_signals(&mut sorted);
    sorted
}

/// Catalog entries named by the signal, in the signal's order. Ids missing
/// from the catalog are dropped.
pub fn get_recommended_signal_actions<'a, A: CatalogAction>(
    signal: Option<&Signal>,
    actions: &'a [A],
) -> Vec<&'a A> {
    let Some(signal) = signal else {
        return Vec::new();
    };

    signal
        .recommended_action_ids
        .iter()
        .filter_map(|id| actions.iter().find(|action| action.action_id() == id))
        .collect()
}

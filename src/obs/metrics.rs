// self
use crate::obs::{FlowKind, FlowOutcome};

/// Counter incremented once per flow attempt, success, and failure.
pub const FLOW_COUNTER: &str = "session_broker_flow_total";

/// Bumps [`FLOW_COUNTER`] labeled by `flow` and `outcome`; a no-op unless the `metrics`
/// feature is enabled and a recorder is installed.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(FLOW_COUNTER, "flow" => kind.as_str(), "outcome" => outcome.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashSet;
	// self
	use super::*;

	const KINDS: [FlowKind; 4] =
		[FlowKind::Request, FlowKind::Refresh, FlowKind::Bootstrap, FlowKind::Logout];
	const OUTCOMES: [FlowOutcome; 3] =
		[FlowOutcome::Attempt, FlowOutcome::Success, FlowOutcome::Failure];

	#[test]
	fn every_flow_and_outcome_has_its_own_label_pair() {
		let mut pairs = HashSet::new();

		for kind in KINDS {
			for outcome in OUTCOMES {
				record_flow_outcome(kind, outcome);

				assert_eq!(kind.to_string(), kind.as_str());
				assert!(pairs.insert((kind.as_str(), outcome.as_str())));
			}
		}

		assert_eq!(pairs.len(), KINDS.len() * OUTCOMES.len());
		assert!(FLOW_COUNTER.starts_with("session_broker_"));
	}
}

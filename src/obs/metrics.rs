// self
use crate::obs::{FlowKind, FlowOutcome};

/// Counter incremented once per recorded flow outcome.
pub const FLOW_COUNTER: &str = "session_broker_flow_total";

/// Label pairs attached to [`FLOW_COUNTER`] for one outcome.
pub fn flow_labels(kind: FlowKind, outcome: FlowOutcome) -> [(&'static str, &'static str); 2] {
	[("flow", kind.as_str()), ("outcome", outcome.as_str())]
}

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		let [(flow_key, flow), (outcome_key, outcome)] = flow_labels(kind, outcome);

		metrics::counter!(FLOW_COUNTER, flow_key => flow, outcome_key => outcome).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn session_expiry_is_labelled_under_the_request_flow() {
		assert_eq!(flow_labels(FlowKind::Request, FlowOutcome::Expired), [
			("flow", "request"),
			("outcome", "expired")
		]);
		assert_eq!(flow_labels(FlowKind::Refresh, FlowOutcome::Failure), [
			("flow", "refresh"),
			("outcome", "failure")
		]);

		record_flow_outcome(FlowKind::Request, FlowOutcome::Expired);
	}
}

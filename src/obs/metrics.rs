// self
use crate::{connection::PiggybackKind, obs::PiggybackOutcome};

/// Records a piggyback outcome via the global metrics recorder (when enabled).
pub fn record_piggyback_outcome(kind: PiggybackKind, outcome: PiggybackOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"graph_piggyback_total",
			"kind" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

//! Optional observability helpers for piggyback decisions and outcomes.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `graph_piggyback.piggyback` with the `kind` and
//!   `stage` fields, plus `debug`/`warn` events for skips and failures.
//! - Enable `metrics` to increment the `graph_piggyback_total` counter for every decision and
//!   settlement, labeled by `kind` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Outcome labels recorded per piggyback kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PiggybackOutcome {
	/// A sub-request was appended to the connection.
	Attached,
	/// The caller was attached as a listener to an in-flight request.
	Joined,
	/// Nothing was attached.
	Skipped,
	/// The piggyback completed and its result was applied.
	Success,
	/// The piggyback completed without effect.
	Failure,
}
impl PiggybackOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			PiggybackOutcome::Attached => "attached",
			PiggybackOutcome::Joined => "joined",
			PiggybackOutcome::Skipped => "skipped",
			PiggybackOutcome::Success => "success",
			PiggybackOutcome::Failure => "failure",
		}
	}
}
impl Display for PiggybackOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

// self
use crate::{_prelude::*, connection::PiggybackKind};

/// A span scoped to one piggyback decision or settlement.
#[derive(Clone, Debug)]
pub struct PiggybackSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl PiggybackSpan {
	/// Creates a new span tagged with the provided kind + stage.
	pub fn new(kind: PiggybackKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::debug_span!("graph_piggyback.piggyback", kind = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Enters the span; it stays entered until the guard drops.
	pub fn entered(self) -> PiggybackSpanGuard {
		#[cfg(feature = "tracing")]
		{
			PiggybackSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			PiggybackSpanGuard {}
		}
	}
}

/// RAII guard returned by [`PiggybackSpan::entered`].
pub struct PiggybackSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for PiggybackSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("PiggybackSpanGuard(..)")
	}
}

/// Logs why a piggyback was not attached.
pub fn log_skip(kind: PiggybackKind, connection: &str, reason: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(kind = kind.as_str(), connection, %reason, "piggyback skipped");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, connection, reason);
	}
}

/// Logs a piggyback that completed without effect.
pub fn log_failure(kind: PiggybackKind, error: &Error) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(kind = kind.as_str(), error = %error, "piggyback failed");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, error);
	}
}

// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by session flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind, stage, and request path.
	pub fn new(kind: FlowKind, stage: &'static str, path: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("session_broker.flow", flow = kind.as_str(), stage, path);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage, path);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a warning event inside the current span (when enabled).
pub fn warn_event(kind: FlowKind, message: &'static str, detail: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(flow = kind.as_str(), detail = %detail, "{message}");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, message, detail);
	}
}

/// Emits a debug event inside the current span (when enabled).
pub fn debug_event(kind: FlowKind, message: &'static str) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(flow = kind.as_str(), "{message}");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, message);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn events_are_safe_without_a_subscriber() {
		warn_event(FlowKind::Refresh, "refresh failed", &"status 500");
		debug_event(FlowKind::Request, "retrying");
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = FlowSpan::new(FlowKind::Request, "instrument_wraps_future", "/teams");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}

// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by broker flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind, stage, and issuer.
	///
	/// `issuer` is empty when it is not known yet (e.g. before resolution).
	pub fn new(kind: FlowKind, stage: &'static str, issuer: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("oidc_broker.flow", flow = kind.as_str(), stage, issuer);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage, issuer);

			Self {}
		}
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> FlowSpanGuard {
		#[cfg(feature = "tracing")]
		{
			FlowSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			FlowSpanGuard {}
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

/// RAII guard returned by [`FlowSpan::entered`].
pub struct FlowSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for FlowSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("FlowSpanGuard(..)")
	}
}

/// Logs the full detail of a failure before it is collapsed at the boundary.
///
/// Client faults are logged at `DEBUG`; everything else at `WARN` with the failed check.
pub fn log_failure(kind: FlowKind, err: &Error) {
	#[cfg(feature = "tracing")]
	{
		let check = match err {
			Error::Protocol(e) => e.check(),
			_ => "",
		};

		if err.is_client_fault() {
			tracing::debug!(
				flow = kind.as_str(),
				error_kind = %err.kind(),
				error = %err,
				"Rejected request."
			);
		} else {
			tracing::warn!(
				flow = kind.as_str(),
				error_kind = %err.kind(),
				check,
				error = %err,
				"Authentication step failed."
			);
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, err);
	}
}

/// Logs a stored config that could not be loaded into the registry.
pub fn log_skipped_config(id: &str, err: &Error) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			config_id = id,
			error_kind = %err.kind(),
			error = %err,
			"Skipped stored client config."
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (id, err);
	}
}

//! Optional observability helpers for broker flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oidc_broker.flow` with the `flow` (leg of
//!   the login flow), `stage` (call site) and `issuer` fields, and `WARN` events carrying the
//!   precise failure behind every collapsed `authentication failed` outcome.
//! - Enable `metrics` to increment the `oidc_broker_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Broker operations observed by spans, logs, and metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Issuer resolution from an inbound request.
	Resolve,
	/// Start leg: state, nonce, and authorization URL.
	Start,
	/// Authorization code exchange at the token endpoint.
	Exchange,
	/// ID token verification.
	Authenticate,
	/// Full callback leg (checks, exchange, verification).
	Callback,
	/// Registry rebuild from the config store.
	RegistryLoad,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Resolve => "resolve",
			FlowKind::Start => "start",
			FlowKind::Exchange => "exchange",
			FlowKind::Authenticate => "authenticate",
			FlowKind::Callback => "callback",
			FlowKind::RegistryLoad => "registry_load",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a broker helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

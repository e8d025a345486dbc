//! Caller-supplied deadline for operations that leave the process.

// self
use crate::_prelude::*;

/// Per-call context bounding every blocking round trip (store, token endpoint, discovery, JWKS).
///
/// Each bounded call gets the full timeout; dropping the returned future cancels the call and
/// leaves no broker-side state behind. Bounded calls must run on a Tokio runtime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallContext {
	timeout: Option<StdDuration>,
}
impl CallContext {
	/// Context without a deadline of its own.
	pub fn new() -> Self {
		Self::default()
	}

	/// Context bounding each call by `timeout`.
	pub fn with_timeout(timeout: StdDuration) -> Self {
		Self { timeout: Some(timeout) }
	}

	/// Returns the configured timeout.
	pub fn timeout(&self) -> Option<StdDuration> {
		self.timeout
	}

	/// Fills in `fallback` when the caller did not choose a timeout.
	pub fn or_timeout(self, fallback: StdDuration) -> Self {
		Self { timeout: self.timeout.or(Some(fallback)) }
	}

	/// Runs `fut`, failing with [`Error::Timeout`] once the deadline passes.
	pub(crate) async fn bound<F, T>(&self, operation: &'static str, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		match self.timeout {
			Some(limit) => tokio::time::timeout(limit, fut)
				.await
				.map_err(|_| Error::Timeout { operation })?,
			None => fut.await,
		}
	}
}

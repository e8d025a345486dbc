// self
use crate::{_prelude::*, error::UpstreamError};

/// Bounded exponential backoff for idempotent provider reads (discovery, JWKS).
///
/// Only [`UpstreamError`]s reporting themselves as retryable are retried. The token exchange is
/// never routed through this policy: authorization codes are single-use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	/// Total attempts including the first one; `0` behaves like `1`.
	pub max_attempts: u32,
	/// Delay before the first retry.
	pub initial_backoff: StdDuration,
	/// Upper bound for any single delay, including `Retry-After` hints.
	pub max_backoff: StdDuration,
}
impl RetryPolicy {
	/// Policy performing a single attempt.
	pub const fn none() -> Self {
		Self { max_attempts: 1, initial_backoff: StdDuration::ZERO, max_backoff: StdDuration::ZERO }
	}

	/// Delay applied after the `failed`-th failed attempt (1-based).
	pub fn backoff(&self, failed: u32) -> StdDuration {
		let factor = 2_u32.saturating_pow(failed.saturating_sub(1));

		self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
	}

	pub(crate) async fn run<F, Fut, T>(&self, mut op: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let attempts = self.max_attempts.max(1);
		let mut failed = 0;

		loop {
			let err = match op().await {
				Ok(value) => return Ok(value),
				Err(err) => err,
			};

			failed += 1;

			let delay = match &err {
				Error::Upstream(upstream) if upstream.is_retryable() && failed < attempts =>
					self.delay_for(upstream, failed),
				_ => return Err(err),
			};

			#[cfg(feature = "tracing")]
			tracing::debug!(attempt = failed, ?delay, error = %err, "Retrying provider request.");

			tokio::time::sleep(delay).await;
		}
	}

	fn delay_for(&self, err: &UpstreamError, failed: u32) -> StdDuration {
		let hinted = match err {
			UpstreamError::Status { retry_after: Some(hint), .. } =>
				StdDuration::try_from(*hint).ok(),
			_ => None,
		};

		hinted.map_or_else(|| self.backoff(failed), |hint| hint.min(self.max_backoff))
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			initial_backoff: StdDuration::from_millis(200),
			max_backoff: StdDuration::from_secs(2),
		}
	}
}

//! ID token verification: discovery, JWKS caching, signature and claim checks.
//!
//! Key material is resolved from [`VerifierParams::jwks_uri`](crate::provider::VerifierParams)
//! or, when absent, from the issuer's discovery document. Both documents are cached per URL with
//! a TTL and fetched at most once concurrently. A token signed with a `kid` missing from the
//! cached set triggers one forced JWKS refresh, which covers key rotation at the provider.

/// Verified ID token claims and the resulting identity.
pub mod claims;
pub mod discovery;
/// Backoff policy for idempotent provider reads.
pub mod retry;

mod cache;
mod verify;

pub use claims::*;
pub use discovery::*;
pub use retry::*;

// crates.io
use jsonwebtoken::jwk::JwkSet;
// self
use crate::{
	_prelude::*,
	context::CallContext,
	error::ProtocolError,
	http::{self, TokenHttpClient},
	oauth::TransportErrorMapper,
	oidc::{
		cache::{Cached, SingleflightCache},
		verify::ClaimChecks,
	},
	provider::ClientConfig,
};

/// Verifies ID tokens against provider keys.
#[derive(Debug)]
pub struct IdTokenVerifier {
	jwks: SingleflightCache<JwkSet>,
	discovery: SingleflightCache<ProviderMetadata>,
	retry: RetryPolicy,
	leeway: StdDuration,
}
impl IdTokenVerifier {
	/// Creates a verifier caching documents for `cache_ttl`.
	pub fn new(cache_ttl: StdDuration, retry: RetryPolicy, leeway: StdDuration) -> Self {
		Self {
			jwks: SingleflightCache::new(cache_ttl),
			discovery: SingleflightCache::new(cache_ttl),
			retry,
			leeway,
		}
	}

	/// Verifies `raw` for `config`, requiring the `nonce` claim to equal `expected_nonce`.
	pub async fn verify<C, M>(
		&self,
		ctx: &CallContext,
		http_client: &C,
		mapper: &M,
		config: &ClientConfig,
		raw: &str,
		expected_nonce: &str,
	) -> Result<IdTokenClaims>
	where
		C: ?Sized + TokenHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		let header = verify::parse_header(raw, &config.verifier.allowed_algorithms)?;
		let jwks_uri = self.jwks_uri(ctx, http_client, mapper, config).await?;
		let checks = ClaimChecks {
			issuer: &config.issuer,
			client_id: (!config.verifier.skip_client_id_check)
				.then_some(config.oauth2.client_id.as_str()),
			expected_nonce,
			leeway: self.leeway,
		};
		let keys = self.key_set(ctx, http_client, mapper, &jwks_uri, None).await?;
		let keys = match verify::select_key(&keys.value, header.kid.as_deref()) {
			Err(ProtocolError::UnknownSigningKey { kid: Some(_) }) =>
				self.key_set(ctx, http_client, mapper, &jwks_uri, Some(keys.generation)).await?,
			_ => keys,
		};
		let jwk = verify::select_key(&keys.value, header.kid.as_deref())?;

		Ok(verify::verify_claims(raw, &header, jwk, checks)?)
	}

	async fn jwks_uri<C, M>(
		&self,
		ctx: &CallContext,
		http_client: &C,
		mapper: &M,
		config: &ClientConfig,
	) -> Result<Url>
	where
		C: ?Sized + TokenHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		if let Some(uri) = config.verifier.jwks_uri.as_ref() {
			return Ok(uri.clone());
		}

		let url = discovery_url(&config.issuer)?;
		let metadata = self
			.discovery
			.get_or_fetch(url.as_str(), None, || {
				ctx.bound(
					"discovery endpoint",
					self.retry.run(|| http::get_json(http_client, mapper, "discovery", &url)),
				)
			})
			.await?;

		if metadata.value.issuer != config.issuer.as_str() {
			return Err(ProtocolError::DiscoveryIssuerMismatch.into());
		}

		Ok(metadata.value.jwks_uri.clone())
	}

	async fn key_set<C, M>(
		&self,
		ctx: &CallContext,
		http_client: &C,
		mapper: &M,
		uri: &Url,
		stale: Option<u64>,
	) -> Result<Cached<JwkSet>>
	where
		C: ?Sized + TokenHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		self.jwks
			.get_or_fetch(uri.as_str(), stale, || {
				ctx.bound(
					"jwks endpoint",
					self.retry.run(|| http::get_json(http_client, mapper, "jwks", uri)),
				)
			})
			.await
	}
}

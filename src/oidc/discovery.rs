//! OpenID Provider metadata (`/.well-known/openid-configuration`).

// self
use crate::{_prelude::*, auth::Issuer, error::ConfigError};

const WELL_KNOWN_PATH: &str = ".well-known/openid-configuration";

/// Subset of the provider metadata document the broker relies on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
	/// Issuer the document speaks for; must equal the registered issuer.
	pub issuer: String,
	/// JWKS location.
	pub jwks_uri: Url,
	/// Advertised authorization endpoint.
	#[serde(default)]
	pub authorization_endpoint: Option<Url>,
	/// Advertised token endpoint.
	#[serde(default)]
	pub token_endpoint: Option<Url>,
	/// Advertised ID token signature algorithms.
	#[serde(default)]
	pub id_token_signing_alg_values_supported: Vec<String>,
}

/// Location of the discovery document for `issuer`.
///
/// The well-known suffix is appended to the issuer path, so `https://idp.example/tenant` maps to
/// `https://idp.example/tenant/.well-known/openid-configuration`.
pub fn discovery_url(issuer: &Issuer) -> Result<Url> {
	let base = format!("{}/", issuer.trim_end_matches('/'));
	let base = Url::parse(&base).map_err(|source| ConfigError::InvalidEndpoint { source })?;

	base.join(WELL_KNOWN_PATH).map_err(|source| ConfigError::InvalidEndpoint { source }.into())
}

// crates.io
use jsonwebtoken::Algorithm;
// self
use crate::{
	_prelude::*,
	auth::{ConfigId, Issuer, ScopeSet, Secret},
	provider::{ClientConfigBuilder, ClientConfigError},
};

/// How the client authenticates at the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// OAuth 2.0 client parameters of a provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Params {
	/// Client identifier registered at the provider.
	pub client_id: String,
	/// Client secret; redacted in logs.
	pub client_secret: Secret,
	/// Authorization endpoint users are redirected to.
	pub authorization_endpoint: Url,
	/// Token endpoint used for the code exchange.
	pub token_endpoint: Url,
	/// Redirect URI registered at the provider.
	pub redirect_uri: Url,
	/// Requested scopes; `openid` is always added on the wire.
	#[serde(default)]
	pub scopes: ScopeSet,
	/// Token endpoint client authentication.
	#[serde(default)]
	pub client_auth_method: ClientAuthMethod,
	/// Character joining scopes in the `scope` parameter.
	#[serde(default = "default_scope_delimiter")]
	pub scope_delimiter: char,
}

/// ID token verification policy of a provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierParams {
	/// Disables the `aud` == client id check (providers issuing foreign audiences).
	pub skip_client_id_check: bool,
	/// Explicit JWKS location; when absent the issuer's discovery document is consulted.
	pub jwks_uri: Option<Url>,
	/// Accepted ID token signature algorithms.
	pub allowed_algorithms: Vec<Algorithm>,
}
impl Default for VerifierParams {
	fn default() -> Self {
		Self { skip_client_id_check: false, jwks_uri: None, allowed_algorithms: vec![Algorithm::RS256] }
	}
}

/// Encrypted-at-rest part of a client config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcSpec {
	/// OAuth 2.0 parameters.
	pub oauth2: OAuth2Params,
	/// Verifier parameters.
	#[serde(default)]
	pub verifier: VerifierParams,
}

/// Ready-to-use provider configuration.
///
/// Instances are handed out as `Arc<ClientConfig>` snapshots; a flow keeps using the snapshot
/// it started with even if the registry entry is replaced meanwhile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
	/// Immutable identifier.
	pub id: ConfigId,
	/// Issuer, unique across the registry.
	pub issuer: Issuer,
	/// OAuth 2.0 parameters.
	pub oauth2: OAuth2Params,
	/// Verifier parameters.
	pub verifier: VerifierParams,
}
impl ClientConfig {
	/// Creates a new builder.
	pub fn builder(id: ConfigId, issuer: Issuer) -> ClientConfigBuilder {
		ClientConfigBuilder::new(id, issuer)
	}

	/// Assembles and validates a config from its decrypted spec.
	pub fn from_spec(id: ConfigId, issuer: Issuer, spec: OidcSpec) -> Result<Self, ClientConfigError> {
		let config = Self { id, issuer, oauth2: spec.oauth2, verifier: spec.verifier };

		config.validate()?;

		Ok(config)
	}

	/// Splits off the part that is encrypted at rest.
	pub fn spec(&self) -> OidcSpec {
		OidcSpec { oauth2: self.oauth2.clone(), verifier: self.verifier.clone() }
	}

	/// Scopes sent in the authorization request.
	pub fn requested_scopes(&self) -> ScopeSet {
		self.oauth2.scopes.with_openid()
	}
}

fn default_scope_delimiter() -> char {
	' '
}

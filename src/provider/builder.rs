// std
use std::net::IpAddr;
// crates.io
use jsonwebtoken::Algorithm;
// self
use crate::{
	_prelude::*,
	auth::{ConfigId, Issuer, ScopeSet, Secret},
	provider::{ClientAuthMethod, ClientConfig, OAuth2Params, VerifierParams},
};

/// Errors raised while constructing or validating client configs.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ClientConfigError {
	/// Client identifier is required.
	#[error("Missing OAuth 2.0 client id.")]
	MissingClientId,
	/// Authorization endpoint is required.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Token endpoint is required.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Redirect URI is required.
	#[error("Missing redirect URI.")]
	MissingRedirectUri,
	/// Endpoints must use HTTPS (plain HTTP is accepted on loopback hosts only).
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Reject scope delimiters that are control characters.
	#[error("Scope delimiter must be a printable character.")]
	InvalidScopeDelimiter {
		/// Invalid delimiter that was supplied.
		delimiter: char,
	},
	/// At least one signature algorithm must be allowed.
	#[error("Verifier must allow at least one signature algorithm.")]
	NoAllowedAlgorithms,
	/// Shared-secret algorithms cannot verify provider-signed tokens.
	#[error("Symmetric algorithm {algorithm:?} cannot verify ID tokens.")]
	SymmetricAlgorithm {
		/// Rejected algorithm.
		algorithm: Algorithm,
	},
	/// Discovery needs the issuer to be an HTTPS URL.
	#[error("Issuer must be an HTTPS URL when no JWKS URI is configured.")]
	IssuerNotDiscoverable,
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	id: ConfigId,
	issuer: Issuer,
	client_id: Option<String>,
	client_secret: Secret,
	authorization_endpoint: Option<Url>,
	token_endpoint: Option<Url>,
	redirect_uri: Option<Url>,
	scopes: ScopeSet,
	client_auth_method: ClientAuthMethod,
	scope_delimiter: char,
	verifier: VerifierParams,
}
impl ClientConfigBuilder {
	/// Creates a new builder for the provided identity.
	pub fn new(id: ConfigId, issuer: Issuer) -> Self {
		Self {
			id,
			issuer,
			client_id: None,
			client_secret: Secret::default(),
			authorization_endpoint: None,
			token_endpoint: None,
			redirect_uri: None,
			scopes: ScopeSet::default(),
			client_auth_method: ClientAuthMethod::default(),
			scope_delimiter: ' ',
			verifier: VerifierParams::default(),
		}
	}

	/// Sets the OAuth 2.0 client id.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());

		self
	}

	/// Sets the OAuth 2.0 client secret.
	pub fn client_secret(mut self, secret: impl Into<Secret>) -> Self {
		self.client_secret = secret.into();

		self
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the redirect URI.
	pub fn redirect_uri(mut self, url: Url) -> Self {
		self.redirect_uri = Some(url);

		self
	}

	/// Sets the requested scopes.
	pub fn scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Overrides the token endpoint client authentication.
	pub fn client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth_method = method;

		self
	}

	/// Overrides the scope delimiter.
	pub fn scope_delimiter(mut self, delimiter: char) -> Self {
		self.scope_delimiter = delimiter;

		self
	}

	/// Disables the audience check.
	pub fn skip_client_id_check(mut self, skip: bool) -> Self {
		self.verifier.skip_client_id_check = skip;

		self
	}

	/// Pins the JWKS location instead of using discovery.
	pub fn jwks_uri(mut self, url: Url) -> Self {
		self.verifier.jwks_uri = Some(url);

		self
	}

	/// Replaces the accepted signature algorithms.
	pub fn allowed_algorithms<I>(mut self, algorithms: I) -> Self
	where
		I: IntoIterator<Item = Algorithm>,
	{
		self.verifier.allowed_algorithms = algorithms.into_iter().collect();

		self
	}

	/// Consumes the builder and validates the resulting config.
	pub fn build(self) -> Result<ClientConfig, ClientConfigError> {
		let oauth2 = OAuth2Params {
			client_id: self.client_id.ok_or(ClientConfigError::MissingClientId)?,
			client_secret: self.client_secret,
			authorization_endpoint: self
				.authorization_endpoint
				.ok_or(ClientConfigError::MissingAuthorizationEndpoint)?,
			token_endpoint: self.token_endpoint.ok_or(ClientConfigError::MissingTokenEndpoint)?,
			redirect_uri: self.redirect_uri.ok_or(ClientConfigError::MissingRedirectUri)?,
			scopes: self.scopes,
			client_auth_method: self.client_auth_method,
			scope_delimiter: self.scope_delimiter,
		};
		let config =
			ClientConfig { id: self.id, issuer: self.issuer, oauth2, verifier: self.verifier };

		config.validate()?;

		Ok(config)
	}
}

impl ClientConfig {
	/// Validates invariants for the config.
	pub(crate) fn validate(&self) -> Result<(), ClientConfigError> {
		if self.oauth2.client_id.is_empty() {
			return Err(ClientConfigError::MissingClientId);
		}

		validate_endpoint("authorization", &self.oauth2.authorization_endpoint)?;
		validate_endpoint("token", &self.oauth2.token_endpoint)?;

		if let Some(jwks_uri) = self.verifier.jwks_uri.as_ref() {
			validate_endpoint("jwks", jwks_uri)?;
		} else {
			let issuer =
				Url::parse(&self.issuer).map_err(|_| ClientConfigError::IssuerNotDiscoverable)?;

			validate_endpoint("issuer", &issuer)
				.map_err(|_| ClientConfigError::IssuerNotDiscoverable)?;
		}

		if self.oauth2.scope_delimiter.is_control() {
			return Err(ClientConfigError::InvalidScopeDelimiter {
				delimiter: self.oauth2.scope_delimiter,
			});
		}
		if self.verifier.allowed_algorithms.is_empty() {
			return Err(ClientConfigError::NoAllowedAlgorithms);
		}
		if let Some(algorithm) = self
			.verifier
			.allowed_algorithms
			.iter()
			.find(|alg| matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512))
		{
			return Err(ClientConfigError::SymmetricAlgorithm { algorithm: *algorithm });
		}

		Ok(())
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ClientConfigError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(ClientConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host_str() {
		Some("localhost") => true,
		Some(host) => host
			.trim_start_matches('[')
			.trim_end_matches(']')
			.parse::<IpAddr>()
			.is_ok_and(|ip| ip.is_loopback()),
		None => false,
	}
}

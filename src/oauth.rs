//! Internal OAuth client facade for the authorization code exchange.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, EndpointNotSet,
	EndpointSet, ExtraTokenFields, HttpClientError, RedirectUrl, RequestTokenError,
	StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicErrorResponseType, BasicRequestTokenError,
		BasicRevocationErrorResponse, BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::Secret,
	error::{ConfigError, ProtocolError, UpstreamError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{ClientAuthMethod, ClientConfig},
};

const TOKEN_ENDPOINT: &str = "token";

type ExchangeClient = Client<
	BasicErrorResponse,
	TokenExchangeResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Token response shape accepted from providers; unknown fields (notably `id_token`) are kept.
pub type TokenExchangeResponse = StandardTokenResponse<TokenExtraFields, BasicTokenType>;

/// Non-standard token response fields, kept verbatim.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenExtraFields {
	/// Every field the OAuth 2.0 core response does not define.
	#[serde(flatten)]
	pub fields: BTreeMap<String, serde_json::Value>,
}
impl ExtraTokenFields for TokenExtraFields {}

/// Outcome of a successful code exchange, handed to identity verification.
#[derive(Clone, PartialEq)]
pub struct OAuth2Result {
	/// Access token issued by the provider.
	pub access_token: Secret,
	/// Token type, usually `bearer`.
	pub token_type: String,
	/// Refresh token, when issued.
	pub refresh_token: Option<Secret>,
	/// Access token lifetime, when advertised.
	pub expires_in: Option<StdDuration>,
	/// Extra response fields such as `id_token`.
	pub extra: BTreeMap<String, serde_json::Value>,
}
impl OAuth2Result {
	/// Creates a bearer result without extra fields.
	pub fn new(access_token: impl Into<Secret>) -> Self {
		Self {
			access_token: access_token.into(),
			token_type: "bearer".into(),
			refresh_token: None,
			expires_in: None,
			extra: BTreeMap::new(),
		}
	}

	/// Attaches an `id_token` extra field.
	pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
		self.extra.insert("id_token".into(), serde_json::Value::String(id_token.into()));

		self
	}

	/// Returns the raw `id_token`, when the provider issued one as a string.
	pub fn id_token(&self) -> Option<&str> {
		self.extra.get("id_token").and_then(serde_json::Value::as_str)
	}

	fn from_response(response: TokenExchangeResponse) -> Self {
		Self {
			access_token: Secret::new(response.access_token().secret().as_str()),
			token_type: response.token_type().as_ref().to_owned(),
			refresh_token: response.refresh_token().map(|token| Secret::new(token.secret().as_str())),
			expires_in: response.expires_in(),
			extra: response.extra_fields().fields.clone(),
		}
	}
}
impl Debug for OAuth2Result {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuth2Result")
			.field("access_token", &self.access_token)
			.field("token_type", &self.token_type)
			.field("refresh_token", &self.refresh_token)
			.field("expires_in", &self.expires_in)
			.field("extra_fields", &self.extra.keys().collect::<Vec<_>>())
			.finish()
	}
}

/// Maps HTTP transport failures into broker [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a broker error.
	///
	/// `endpoint` labels the provider endpoint (`token`, `discovery`, `jwks`).
	fn map_transport_error(
		&self,
		endpoint: &'static str,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		endpoint: &'static str,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(endpoint, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => UpstreamError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(endpoint, meta, message),
			_ => map_generic_transport_error(endpoint, meta, "unknown HTTP client error"),
		}
	}
}

pub(crate) trait OAuth2Facade {
	fn exchange_authorization_code<'a, 'code>(
		&'a self,
		code: &'code str,
	) -> FacadeFuture<'a, OAuth2Result>
	where
		'code: 'a;
}

pub(crate) struct BasicFacade<'h, C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ExchangeClient,
	http_client: &'h C,
	error_mapper: &'h M,
}
impl<'h, C, M> BasicFacade<'h, C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_config(
		config: &ClientConfig,
		http_client: &'h C,
		error_mapper: &'h M,
	) -> Result<Self> {
		let params = &config.oauth2;
		let auth_url = AuthUrl::new(params.authorization_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let token_url = TokenUrl::new(params.token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let redirect_url = RedirectUrl::new(params.redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let mut oauth_client: ExchangeClient = Client::new(ClientId::new(params.client_id.clone()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_redirect_uri(redirect_url);

		if !params.client_secret.is_empty() {
			oauth_client = oauth_client
				.set_client_secret(ClientSecret::new(params.client_secret.expose().to_owned()));
		}
		if matches!(params.client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, http_client, error_mapper })
	}
}
impl<C, M> OAuth2Facade for BasicFacade<'_, C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_authorization_code<'a, 'code>(
		&'a self,
		code: &'code str,
	) -> FacadeFuture<'a, OAuth2Result>
	where
		'code: 'a,
	{
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let response = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.request_async(&instrumented)
				.await
				.map_err(|err| map_request_error(meta.take(), err, self.error_mapper))?;

			Ok(OAuth2Result::from_response(response))
		})
	}
}

fn map_request_error<E, M>(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(response, meta_ref),
		RequestTokenError::Request(error) =>
			mapper.map_transport_error(TOKEN_ENDPOINT, meta_ref, error),
		RequestTokenError::Parse(source, _body) =>
			UpstreamError::MalformedResponse { endpoint: TOKEN_ENDPOINT, source }.into(),
		RequestTokenError::Other(message) =>
			UpstreamError::TokenEndpoint { message, status: meta_status(meta_ref) }.into(),
	}
}

fn map_server_response_error(
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let description = response.error_description().cloned();

	match response.error() {
		BasicErrorResponseType::Extension(code)
			if code == "temporarily_unavailable" || code == "server_error" =>
			UpstreamError::TokenEndpoint {
				message: description.unwrap_or_else(|| code.clone()),
				status: meta_status(meta),
			}
			.into(),
		error => ProtocolError::TokenRejected { error: error.as_ref().to_owned(), description }
			.into(),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(endpoint: &'static str, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}

	UpstreamError::network(endpoint, err).into()
}

fn map_generic_transport_error(
	endpoint: &'static str,
	meta: Option<&ResponseMetadata>,
	message: impl Display,
) -> Error {
	match meta_status(meta) {
		Some(status) => UpstreamError::Status {
			endpoint,
			status,
			retry_after: meta.and_then(|value| value.retry_after),
		}
		.into(),
		None => UpstreamError::Network {
			endpoint,
			source: format!("HTTP client error: {message}.").into(),
		}
		.into(),
	}
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

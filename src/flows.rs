//! Login flow orchestration: issuer resolution, start parameters, and the callback leg.

pub mod callback;
pub mod start;

pub use start::*;

// self
use crate::{
	_prelude::*,
	error::ValidationError,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	oidc::{IdTokenVerifier, RetryPolicy},
	provider::ClientConfig,
	registry::ClientConfigRegistry,
};
#[cfg(feature = "reqwest")]
use crate::{error::ConfigError, http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestFlowBroker = FlowBroker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Tunables for the login flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
	/// Longest accepted time between start and callback.
	pub max_flow_age: Duration,
	/// Clock skew tolerated for `exp`/`nbf`.
	pub clock_leeway: StdDuration,
	/// Per-call upstream timeout used when the caller's context has none.
	pub upstream_timeout: StdDuration,
	/// Lifetime of cached discovery documents and key sets.
	pub jwks_cache_ttl: StdDuration,
	/// Retry policy for discovery and JWKS reads.
	pub retry: RetryPolicy,
}
impl Default for BrokerSettings {
	fn default() -> Self {
		Self {
			max_flow_age: Duration::minutes(5),
			clock_leeway: StdDuration::from_secs(60),
			upstream_timeout: StdDuration::from_secs(10),
			jwks_cache_ttl: StdDuration::from_secs(600),
			retry: RetryPolicy::default(),
		}
	}
}

/// Drives OpenID Connect login flows against the providers of a [`ClientConfigRegistry`].
///
/// The broker keeps no per-flow state: `state` and `nonce` travel to the caller in a
/// [`FlowState`] and come back with the callback. Shared state is limited to the registry and
/// the verifier's discovery/JWKS caches.
pub struct FlowBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Registry consulted on every resolution.
	pub registry: Arc<ClientConfigRegistry>,
	/// HTTP client wrapper used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	settings: BrokerSettings,
	verifier: Arc<IdTokenVerifier>,
}
impl<C, M> FlowBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		registry: Arc<ClientConfigRegistry>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		let settings = BrokerSettings::default();

		Self {
			registry,
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			verifier: Arc::new(verifier_for(&settings)),
			settings,
		}
	}

	/// Replaces the settings; discovery and JWKS caches start empty afterwards.
	pub fn with_settings(mut self, settings: BrokerSettings) -> Self {
		self.verifier = Arc::new(verifier_for(&settings));
		self.settings = settings;

		self
	}

	/// Active settings.
	pub fn settings(&self) -> &BrokerSettings {
		&self.settings
	}

	/// Resolves the client config named by the `issuer` query parameter of `request_target`.
	///
	/// `request_target` is a request path with query (`/start?issuer=...`) or a full URL. This is
	/// the single resolution point for both legs of a flow.
	pub fn client_config_from_request(&self, request_target: &str) -> Result<Arc<ClientConfig>> {
		const KIND: FlowKind = FlowKind::Resolve;

		let _guard = FlowSpan::new(KIND, "client_config_from_request", "").entered();

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = self.resolve(&QueryParams::parse(request_target));

		observe_outcome(KIND, &result);

		result
	}

	fn resolve(&self, params: &QueryParams) -> Result<Arc<ClientConfig>> {
		let issuer = params.require("issuer")?;

		self.registry.get_by_issuer(issuer)
	}
}
#[cfg(feature = "reqwest")]
impl FlowBroker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a broker with its own reqwest transport that never follows redirects.
	pub fn new(registry: Arc<ClientConfigRegistry>) -> Result<Self, ConfigError> {
		Ok(Self::with_http_client(
			registry,
			ReqwestHttpClient::new()?,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}
}
impl<C, M> Clone for FlowBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			registry: self.registry.clone(),
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			settings: self.settings,
			verifier: self.verifier.clone(),
		}
	}
}
impl<C, M> Debug for FlowBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FlowBroker")
			.field("registered_configs", &self.registry.len())
			.field("settings", &self.settings)
			.finish()
	}
}

/// Decoded query parameters of a request target; the first occurrence of a name wins.
#[derive(Clone, Debug, Default)]
pub(crate) struct QueryParams(HashMap<String, String>);
impl QueryParams {
	pub(crate) fn parse(request_target: &str) -> Self {
		let without_fragment = request_target.split_once('#').map_or(request_target, |(t, _)| t);
		let query = without_fragment.split_once('?').map_or("", |(_, query)| query);
		let mut params = HashMap::new();

		for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
			params.entry(name.into_owned()).or_insert_with(|| value.into_owned());
		}

		Self(params)
	}

	pub(crate) fn get(&self, name: &str) -> Option<&str> {
		self.0.get(name).map(String::as_str).filter(|value| !value.is_empty())
	}

	pub(crate) fn require(&self, name: &'static str) -> Result<&str, ValidationError> {
		self.get(name).ok_or(ValidationError::MissingParameter { name })
	}
}

fn verifier_for(settings: &BrokerSettings) -> IdTokenVerifier {
	IdTokenVerifier::new(settings.jwks_cache_ttl, settings.retry, settings.clock_leeway)
}

fn observe_outcome<T>(kind: FlowKind, result: &Result<T>) {
	match result {
		Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
		Err(e) => {
			obs::log_failure(kind, e);
			obs::record_flow_outcome(kind, FlowOutcome::Failure);
		},
	}
}

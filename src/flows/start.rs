//! Start leg: fresh `state`/`nonce` and the provider authorization URL.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
// self
use crate::{
	_prelude::*,
	auth::Issuer,
	flows::FlowBroker,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::ClientConfig,
};

/// Random bytes behind each `state` and `nonce` (256 bits).
const TOKEN_BYTES: usize = 32;

/// Client-bound artifact of an in-flight login.
///
/// The caller persists it in a tamper-evident container (e.g. a signed cookie) and hands it
/// back on callback. Callback handling consumes it, so one artifact completes at most one login.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
	/// Issuer the flow was started for.
	pub issuer: Issuer,
	/// CSRF binding echoed by the provider.
	pub state: String,
	/// Replay binding echoed inside the ID token.
	pub nonce: String,
	/// Start time, bounded by the configured maximum flow age.
	#[serde(with = "time::serde::rfc3339")]
	pub started_at: OffsetDateTime,
}

/// Output of the start leg.
#[derive(Clone, Debug)]
pub struct StartParams {
	/// Fresh `state`.
	pub state: String,
	/// Fresh `nonce`.
	pub nonce: String,
	/// Where to redirect the user agent.
	pub authorization_url: Url,
	/// Artifact to persist client-side until the callback.
	pub flow: FlowState,
}

impl<C, M> FlowBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Generates `state` and `nonce` and builds the authorization URL for `config`.
	///
	/// Both values carry 256 bits of randomness each, drawn independently per call.
	pub fn start_params(&self, config: &ClientConfig) -> StartParams {
		const KIND: FlowKind = FlowKind::Start;

		let _guard = FlowSpan::new(KIND, "start_params", &config.issuer).entered();

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let state = random_token();
		let nonce = random_token();
		let authorization_url = build_authorization_url(config, &state, &nonce);
		let flow = FlowState {
			issuer: config.issuer.clone(),
			state: state.clone(),
			nonce: nonce.clone(),
			started_at: OffsetDateTime::now_utc(),
		};

		obs::record_flow_outcome(KIND, FlowOutcome::Success);

		StartParams { state, nonce, authorization_url, flow }
	}
}

fn build_authorization_url(config: &ClientConfig, state: &str, nonce: &str) -> Url {
	let params = &config.oauth2;
	let mut url = params.authorization_endpoint.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("response_type", "code");
	pairs.append_pair("client_id", &params.client_id);
	pairs.append_pair("redirect_uri", params.redirect_uri.as_str());

	if let Some(scope) = config.requested_scopes().joined(params.scope_delimiter) {
		pairs.append_pair("scope", &scope);
	}

	pairs.append_pair("state", state);
	pairs.append_pair("nonce", nonce);

	drop(pairs);

	url
}

fn random_token() -> String {
	let mut bytes = [0_u8; TOKEN_BYTES];

	rand::rng().fill_bytes(&mut bytes);

	URL_SAFE_NO_PAD.encode(bytes)
}

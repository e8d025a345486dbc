//! Callback leg: code exchange, ID token verification, and the guarded end-to-end handler.

// self
use crate::{
	_prelude::*,
	auth::Secret,
	context::CallContext,
	error::{ProtocolError, ValidationError},
	flows::{FlowBroker, FlowState, QueryParams, observe_outcome},
	http::TokenHttpClient,
	oauth::{BasicFacade, OAuth2Facade, OAuth2Result, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	oidc::VerifiedIdentity,
	provider::ClientConfig,
};

impl<C, M> FlowBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Exchanges an authorization code at the config's token endpoint.
	///
	/// Never retried: codes are single-use, so a failed exchange needs a fresh login.
	pub async fn exchange_code(
		&self,
		ctx: &CallContext,
		config: &ClientConfig,
		code: &str,
	) -> Result<OAuth2Result> {
		const KIND: FlowKind = FlowKind::Exchange;

		let span = FlowSpan::new(KIND, "exchange_code", &config.issuer);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		span.instrument(async {
			let result = self.exchange(ctx, config, code).await;

			observe_outcome(KIND, &result);

			result
		})
		.await
	}

	/// Verifies the ID token carried by `result` for the config owning `issuer`.
	///
	/// Signature, `iss`, `aud` (unless the config opts out), `exp`, and `nonce` are all checked;
	/// the `nonce` must equal `expected_nonce` exactly. A validly signed token with any other
	/// nonce is rejected.
	pub async fn authenticate(
		&self,
		ctx: &CallContext,
		result: OAuth2Result,
		issuer: &str,
		expected_nonce: &str,
	) -> Result<VerifiedIdentity> {
		const KIND: FlowKind = FlowKind::Authenticate;

		let span = FlowSpan::new(KIND, "authenticate", issuer);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		span.instrument(async {
			let identity = self.verify(ctx, result, issuer, expected_nonce).await;

			observe_outcome(KIND, &identity);

			identity
		})
		.await
	}

	/// Completes a login from the provider's redirect.
	///
	/// Resolves the config from the request's `issuer`, rejects provider errors, requires `code`
	/// and `state`, checks `state` and issuer against `flow`, enforces the maximum flow age, then
	/// exchanges the code and authenticates with the flow's nonce.
	pub async fn complete_callback(
		&self,
		ctx: &CallContext,
		request_target: &str,
		flow: FlowState,
	) -> Result<VerifiedIdentity> {
		const KIND: FlowKind = FlowKind::Callback;

		let span = FlowSpan::new(KIND, "complete_callback", &flow.issuer);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		span.instrument(async {
			let identity = self.callback(ctx, request_target, flow).await;

			observe_outcome(KIND, &identity);

			identity
		})
		.await
	}

	async fn callback(
		&self,
		ctx: &CallContext,
		request_target: &str,
		flow: FlowState,
	) -> Result<VerifiedIdentity> {
		let params = QueryParams::parse(request_target);
		let config = self.resolve(&params)?;

		if let Some(error) = params.get("error") {
			return Err(ProtocolError::ProviderError {
				error: error.to_owned(),
				description: params.get("error_description").map(str::to_owned),
			}
			.into());
		}

		let code = params.require("code")?;
		let state = params.require("state")?;

		if state != flow.state {
			return Err(ProtocolError::StateMismatch.into());
		}
		if flow.issuer != config.issuer {
			return Err(ProtocolError::FlowIssuerMismatch.into());
		}

		let age = OffsetDateTime::now_utc() - flow.started_at;
		let leeway = Duration::try_from(self.settings.clock_leeway).unwrap_or(Duration::MAX);

		if age > self.settings.max_flow_age {
			return Err(ProtocolError::FlowExpired { age }.into());
		}
		if -age > leeway {
			return Err(ProtocolError::FlowFromFuture { skew: -age }.into());
		}

		let token = self.exchange(ctx, &config, code).await?;

		// The resolved snapshot stays authoritative even if the registry changes mid-flow.
		self.verify_with(ctx, &config, token, &flow.nonce).await
	}

	async fn exchange(
		&self,
		ctx: &CallContext,
		config: &ClientConfig,
		code: &str,
	) -> Result<OAuth2Result> {
		if code.is_empty() {
			return Err(ValidationError::MissingParameter { name: "code" }.into());
		}

		let facade = BasicFacade::from_config(
			config,
			self.http_client.as_ref(),
			self.transport_mapper.as_ref(),
		)?;

		ctx.or_timeout(self.settings.upstream_timeout)
			.bound("token endpoint", facade.exchange_authorization_code(code))
			.await
	}

	async fn verify(
		&self,
		ctx: &CallContext,
		token: OAuth2Result,
		issuer: &str,
		expected_nonce: &str,
	) -> Result<VerifiedIdentity> {
		let config = self.registry.get_by_issuer(issuer)?;

		self.verify_with(ctx, &config, token, expected_nonce).await
	}

	async fn verify_with(
		&self,
		ctx: &CallContext,
		config: &ClientConfig,
		token: OAuth2Result,
		expected_nonce: &str,
	) -> Result<VerifiedIdentity> {
		if expected_nonce.is_empty() {
			return Err(ValidationError::EmptyNonce.into());
		}

		let raw = token.id_token().ok_or(ProtocolError::MissingIdToken)?.to_owned();
		let ctx = ctx.or_timeout(self.settings.upstream_timeout);
		let claims = self
			.verifier
			.verify(
				&ctx,
				self.http_client.as_ref(),
				self.transport_mapper.as_ref(),
				config,
				&raw,
				expected_nonce,
			)
			.await?;

		Ok(VerifiedIdentity {
			config_id: config.id.clone(),
			issuer: config.issuer.clone(),
			subject: claims.sub.clone(),
			claims,
			id_token: Secret::new(raw),
			token,
		})
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{build_reqwest_test_broker, config_id, issuer},
		error::{Error, NotFoundError},
	};

	fn config() -> ClientConfig {
		let url = |value: &str| Url::parse(value).expect("URL fixture should parse.");

		ClientConfig::builder(config_id("google-1"), issuer("https://accounts.google.com"))
			.client_id("client-id-123")
			.authorization_endpoint(url("https://accounts.google.com/o/oauth2/v2/auth"))
			.token_endpoint(url("https://127.0.0.1:9/token"))
			.redirect_uri(url("https://app.example.com/iam/oidc/callback"))
			.jwks_uri(url("https://127.0.0.1:9/jwks"))
			.build()
			.expect("Config fixture should build.")
	}

	fn flow(state: &str) -> FlowState {
		FlowState {
			issuer: issuer("https://accounts.google.com"),
			state: state.into(),
			nonce: "nonce-1".into(),
			started_at: OffsetDateTime::now_utc(),
		}
	}

	const CALLBACK: &str = "/callback?issuer=https%3A%2F%2Faccounts.google.com";

	#[tokio::test]
	async fn callback_checks_run_before_any_network_call() {
		let (broker, registry) = build_reqwest_test_broker();
		let ctx = CallContext::new();

		registry.add_client_config(config()).expect("Registration should succeed.");

		let err = broker
			.complete_callback(&ctx, &format!("{CALLBACK}&code=c&state=forged"), flow("s-1"))
			.await
			.expect_err("State mismatch must fail.");

		assert!(matches!(err, Error::Protocol(ProtocolError::StateMismatch)));

		let err = broker
			.complete_callback(&ctx, &format!("{CALLBACK}&state=s-1"), flow("s-1"))
			.await
			.expect_err("Missing code must fail.");

		assert!(matches!(
			err,
			Error::Validation(ValidationError::MissingParameter { name: "code" })
		));

		let err = broker
			.complete_callback(
				&ctx,
				&format!("{CALLBACK}&error=access_denied&error_description=User+cancelled"),
				flow("s-1"),
			)
			.await
			.expect_err("Provider errors must fail.");

		assert!(matches!(
			err,
			Error::Protocol(ProtocolError::ProviderError { ref description, .. })
				if description.as_deref() == Some("User cancelled")
		));

		let mut stale = flow("s-1");

		stale.started_at -= Duration::minutes(6);

		let err = broker
			.complete_callback(&ctx, &format!("{CALLBACK}&code=c&state=s-1"), stale)
			.await
			.expect_err("Expired flows must fail.");

		assert!(matches!(err, Error::Protocol(ProtocolError::FlowExpired { .. })));

		let mut future = flow("s-1");

		future.started_at += Duration::minutes(10);

		let err = broker
			.complete_callback(&ctx, &format!("{CALLBACK}&code=c&state=s-1"), future)
			.await
			.expect_err("Flows dated beyond the clock leeway must fail.");

		assert!(matches!(err, Error::Protocol(ProtocolError::FlowFromFuture { .. })));

		let mut other = flow("s-1");

		other.issuer = issuer("https://login.example.com");

		let err = broker
			.complete_callback(&ctx, &format!("{CALLBACK}&code=c&state=s-1"), other)
			.await
			.expect_err("Issuer switch must fail.");

		assert!(matches!(err, Error::Protocol(ProtocolError::FlowIssuerMismatch)));

		let err = broker
			.complete_callback(&ctx, "/callback?issuer=UNKNOWN&code=c&state=s-1", flow("s-1"))
			.await
			.expect_err("Unknown issuer must fail.");

		assert!(matches!(err, Error::NotFound(NotFoundError::Issuer { .. })));
	}

	#[tokio::test]
	async fn authenticate_rejects_bad_input_before_verification() {
		let (broker, registry) = build_reqwest_test_broker();
		let ctx = CallContext::new();

		registry.add_client_config(config()).expect("Registration should succeed.");

		let err = broker
			.authenticate(&ctx, OAuth2Result::new("at"), "https://accounts.google.com", "n")
			.await
			.expect_err("Missing id_token must fail.");

		assert!(matches!(err, Error::Protocol(ProtocolError::MissingIdToken)));

		let err = broker
			.authenticate(
				&ctx,
				OAuth2Result::new("at").with_id_token("a.b.c"),
				"https://accounts.google.com",
				"",
			)
			.await
			.expect_err("Empty expected nonce must fail.");

		assert!(matches!(err, Error::Validation(ValidationError::EmptyNonce)));

		let err = broker
			.authenticate(&ctx, OAuth2Result::new("at").with_id_token("a.b.c"), "UNKNOWN", "n")
			.await
			.expect_err("Unknown issuer must fail.");

		assert!(matches!(err, Error::NotFound(_)));
	}
}

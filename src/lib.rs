//! OpenID Connect federation broker: per-tenant provider configs encrypted at rest, single-use
//! state/nonce guarded login flows, and JWKS-verified identities.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cipher;
pub mod context;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod oidc;
pub mod provider;
pub mod registry;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	#[cfg(feature = "reqwest")]
	use crate::{
		flows::FlowBroker, http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper,
		registry::ClientConfigRegistry,
	};
	use crate::{
		auth::{ConfigId, Issuer},
		cipher::{CipherKey, CipherKeySet, CipherService},
		flows::BrokerSettings,
		oidc::RetryPolicy,
	};

	/// Broker type alias used by reqwest-backed integration tests.
	#[cfg(feature = "reqwest")]
	pub type ReqwestTestBroker = FlowBroker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// 32 bytes of deterministic key material for cipher fixtures.
	pub const TEST_KEY_MATERIAL: &[u8; 32] = b"testtesttesttesttesttesttesttest";

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Parses a config identifier fixture.
	pub fn config_id(value: &str) -> ConfigId {
		ConfigId::new(value).expect("Config identifier fixture should be valid.")
	}

	/// Parses an issuer fixture.
	pub fn issuer(value: &str) -> Issuer {
		Issuer::new(value).expect("Issuer fixture should be valid.")
	}

	/// Cipher service with a single primary `default/1` key.
	pub fn test_cipher() -> CipherService {
		let key = CipherKey::new("default", 1, *TEST_KEY_MATERIAL)
			.expect("Cipher key fixture should be valid.");
		let keys = CipherKeySet::new([key], ("default", 1))
			.expect("Cipher key set fixture should be valid.");

		CipherService::new(keys)
	}

	/// Settings with zero backoff so retry tests stay fast.
	pub fn test_settings() -> BrokerSettings {
		BrokerSettings {
			retry: RetryPolicy {
				max_attempts: 3,
				initial_backoff: StdDuration::from_millis(1),
				max_backoff: StdDuration::from_millis(5),
			},
			..BrokerSettings::default()
		}
	}

	/// Constructs a [`FlowBroker`] over a fresh registry and the reqwest transport used across
	/// integration tests.
	#[cfg(feature = "reqwest")]
	pub fn build_reqwest_test_broker() -> (ReqwestTestBroker, Arc<ClientConfigRegistry>) {
		let registry = Arc::new(ClientConfigRegistry::default());
		let broker = FlowBroker::with_http_client(
			registry.clone(),
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
		)
		.with_settings(test_settings());

		(broker, registry)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		marker::PhantomData,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use jsonwebtoken;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};

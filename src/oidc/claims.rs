// self
use crate::{
	_prelude::*,
	auth::{ConfigId, Issuer, Secret},
	oauth::OAuth2Result,
};

/// `aud` claim, either a single string or an array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
	/// Single audience.
	Single(String),
	/// Multiple audiences.
	Multiple(Vec<String>),
}
impl Audience {
	/// Returns `true` when `client_id` is one of the audiences.
	pub fn contains(&self, client_id: &str) -> bool {
		match self {
			Audience::Single(aud) => aud == client_id,
			Audience::Multiple(auds) => auds.iter().any(|aud| aud == client_id),
		}
	}
}

/// Claims of a verified ID token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
	/// Issuer.
	pub iss: String,
	/// Subject, stable per user at the provider.
	pub sub: String,
	/// Audience.
	pub aud: Audience,
	/// Expiry (seconds since the epoch).
	pub exp: i64,
	/// Issue time (seconds since the epoch).
	#[serde(default)]
	pub iat: Option<i64>,
	/// Replay protection value echoed from the authorization request.
	#[serde(default)]
	pub nonce: Option<String>,
	/// Remaining claims (`email`, `name`, ...).
	#[serde(flatten)]
	pub extra: BTreeMap<String, serde_json::Value>,
}
impl IdTokenClaims {
	/// Returns a string claim from the non-standard set.
	pub fn string_claim(&self, name: &str) -> Option<&str> {
		self.extra.get(name).and_then(serde_json::Value::as_str)
	}

	/// `email` claim, when present.
	pub fn email(&self) -> Option<&str> {
		self.string_claim("email")
	}
}

/// Identity established by a completed login flow.
#[derive(Clone, Debug)]
pub struct VerifiedIdentity {
	/// Config that handled the login.
	pub config_id: ConfigId,
	/// Registered issuer.
	pub issuer: Issuer,
	/// Subject from the ID token.
	pub subject: String,
	/// All verified claims.
	pub claims: IdTokenClaims,
	/// The raw ID token.
	pub id_token: Secret,
	/// Token endpoint result that carried the ID token.
	pub token: OAuth2Result,
}

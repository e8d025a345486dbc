//! Broker-level error taxonomy shared by the cipher, stores, registry, and flows.
//!
//! Validation, not-found, and conflict failures are deterministic client faults and may be
//! surfaced verbatim. Everything else is logged with full detail and collapsed into
//! [`PublicOutcome::AuthenticationFailed`] at the boundary, see [`Error::public_outcome`].

// self
use crate::{
	_prelude::*,
	auth::{ConfigId, IdentifierError, ScopeValidationError},
	cipher::KeySetError,
	provider::ClientConfigError,
	store::StoreError,
};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Malformed or missing caller input.
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// Unknown issuer or config identifier.
	#[error(transparent)]
	NotFound(#[from] NotFoundError),
	/// Uniqueness violation on administrative writes.
	#[error(transparent)]
	Conflict(#[from] ConflictError),
	/// Envelope could not be decrypted or decoded.
	#[error(transparent)]
	Decryption(#[from] DecryptionError),
	/// Login flow or ID token check failed.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),
	/// Identity provider could not be reached or answered unexpectedly.
	#[error(transparent)]
	Upstream(#[from] UpstreamError),
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// A blocking upstream call exceeded the caller's deadline.
	#[error("Timed out while calling the {operation}.")]
	Timeout {
		/// Label of the operation that timed out.
		operation: &'static str,
	},
}
impl Error {
	/// Returns the coarse classification of this error.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::Validation(_) => ErrorKind::Validation,
			Error::NotFound(_) => ErrorKind::NotFound,
			Error::Conflict(_) => ErrorKind::Conflict,
			Error::Decryption(_) => ErrorKind::Decryption,
			Error::Protocol(_) => ErrorKind::Protocol,
			Error::Upstream(_) => ErrorKind::Upstream,
			Error::Storage(_) => ErrorKind::Storage,
			Error::Config(_) => ErrorKind::Config,
			Error::Timeout { .. } => ErrorKind::Timeout,
		}
	}

	/// Returns `true` when the failure was caused by caller input and is safe to surface.
	pub fn is_client_fault(&self) -> bool {
		matches!(self.kind(), ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Conflict)
	}

	/// Collapses the error into what the outer HTTP layer may reveal.
	pub fn public_outcome(&self) -> PublicOutcome {
		if self.is_client_fault() {
			PublicOutcome::ClientFault { message: self.to_string() }
		} else {
			PublicOutcome::AuthenticationFailed
		}
	}
}

/// Coarse error classification used for logging and metrics labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// See [`ValidationError`].
	Validation,
	/// See [`NotFoundError`].
	NotFound,
	/// See [`ConflictError`].
	Conflict,
	/// See [`DecryptionError`].
	Decryption,
	/// See [`ProtocolError`].
	Protocol,
	/// See [`UpstreamError`].
	Upstream,
	/// See [`StoreError`].
	Storage,
	/// See [`ConfigError`].
	Config,
	/// See [`Error::Timeout`].
	Timeout,
}
impl ErrorKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ErrorKind::Validation => "validation",
			ErrorKind::NotFound => "not_found",
			ErrorKind::Conflict => "conflict",
			ErrorKind::Decryption => "decryption",
			ErrorKind::Protocol => "protocol",
			ErrorKind::Upstream => "upstream",
			ErrorKind::Storage => "storage",
			ErrorKind::Config => "config",
			ErrorKind::Timeout => "timeout",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Externally observable result of a failed broker call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicOutcome {
	/// Deterministic input fault; the message is safe to show.
	ClientFault {
		/// Human-readable explanation.
		message: String,
	},
	/// Opaque failure; details only exist in server-side logs.
	AuthenticationFailed,
}
impl Display for PublicOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			PublicOutcome::ClientFault { message } => f.write_str(message),
			PublicOutcome::AuthenticationFailed => f.write_str("authentication failed"),
		}
	}
}

/// Malformed or missing caller input.
#[derive(Debug, ThisError)]
pub enum ValidationError {
	/// A required request parameter is absent or empty.
	#[error("Request is missing the `{name}` parameter.")]
	MissingParameter {
		/// Parameter name.
		name: &'static str,
	},
	/// Identifier failed validation.
	#[error(transparent)]
	Identifier(#[from] IdentifierError),
	/// Scope list failed validation.
	#[error(transparent)]
	Scope(#[from] ScopeValidationError),
	/// Client config failed validation.
	#[error(transparent)]
	ClientConfig(#[from] ClientConfigError),
	/// The caller supplied an empty expected nonce.
	#[error("Expected nonce must not be empty.")]
	EmptyNonce,
}

/// Lookup misses; never reveals anything beyond the requested key.
#[derive(Debug, ThisError)]
pub enum NotFoundError {
	/// No active config owns the issuer.
	#[error("No client config is registered for issuer `{issuer}`.")]
	Issuer {
		/// Requested issuer.
		issuer: String,
	},
	/// No active config carries the identifier.
	#[error("Client config `{id}` does not exist.")]
	ConfigId {
		/// Requested identifier.
		id: String,
	},
}

/// Uniqueness violations raised by the registry or the store.
#[derive(Debug, ThisError)]
pub enum ConflictError {
	/// Another config already owns the issuer.
	#[error("Issuer `{issuer}` is already owned by client config `{owner}`.")]
	IssuerTaken {
		/// Contested issuer.
		issuer: String,
		/// Current owner.
		owner: ConfigId,
	},
	/// The identifier is already in use.
	#[error("Client config `{id}` already exists.")]
	DuplicateId {
		/// Contested identifier.
		id: String,
	},
}

/// Decryption and envelope decoding failures. Never yields partial plaintext.
#[derive(Debug, ThisError)]
pub enum DecryptionError {
	/// Envelope references a key absent from the key set.
	#[error("Cipher key `{name}` version {version} is unknown.")]
	UnknownKey {
		/// Recorded key name.
		name: String,
		/// Recorded key version.
		version: u32,
	},
	/// IV does not match the cipher block size.
	#[error("Initialization vector has {len} bytes; expected 16.")]
	InvalidIv {
		/// Observed length.
		len: usize,
	},
	/// Ciphertext is empty or not block aligned.
	#[error("Ciphertext length {len} is not a positive multiple of the block size.")]
	CiphertextLength {
		/// Observed length.
		len: usize,
	},
	/// PKCS#7 padding check failed (tampering or wrong key material).
	#[error("Ciphertext padding is invalid.")]
	Padding,
	/// A base64 field could not be decoded.
	#[error("Envelope field `{field}` is not valid base64.")]
	Base64 {
		/// Envelope field.
		field: &'static str,
		/// Underlying decode failure.
		#[source]
		source: base64::DecodeError,
	},
	/// The envelope itself is not valid JSON.
	#[error("Encrypted envelope is malformed.")]
	MalformedEnvelope {
		/// Underlying parse failure.
		#[source]
		source: serde_json::Error,
	},
	/// Plaintext did not decode into the requested schema.
	#[error("Decrypted payload does not match the expected schema.")]
	MalformedPayload {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

/// Protocol failures; each variant names the check that failed.
#[derive(Debug, ThisError)]
pub enum ProtocolError {
	/// Returned `state` differs from the one issued at start.
	#[error("Callback state does not match the flow state.")]
	StateMismatch,
	/// The callback names a different issuer than the flow was started for.
	#[error("Callback issuer does not match the flow issuer.")]
	FlowIssuerMismatch,
	/// The flow outlived the configured maximum age.
	#[error("Login flow expired after {age}.")]
	FlowExpired {
		/// Observed flow age.
		age: Duration,
	},
	/// The flow claims to start further in the future than the clock leeway allows.
	#[error("Login flow starts {skew} in the future.")]
	FlowFromFuture {
		/// Distance between the recorded start and now.
		skew: Duration,
	},
	/// The provider redirected back with an OAuth error.
	#[error("Provider returned an authorization error: {error}.")]
	ProviderError {
		/// OAuth `error` code.
		error: String,
		/// OAuth `error_description`, when present.
		description: Option<String>,
	},
	/// Token endpoint rejected the code exchange.
	#[error("Token endpoint rejected the code exchange: {error}.")]
	TokenRejected {
		/// OAuth `error` code.
		error: String,
		/// OAuth `error_description`, when present.
		description: Option<String>,
	},
	/// Token response carried no `id_token`.
	#[error("Token response does not contain an id_token.")]
	MissingIdToken,
	/// ID token cannot be parsed.
	#[error("ID token is malformed: {reason}.")]
	MalformedIdToken {
		/// Parser explanation.
		reason: String,
	},
	/// ID token algorithm is not allowed for this config.
	#[error("ID token algorithm {algorithm} is not allowed.")]
	UnsupportedAlgorithm {
		/// Header algorithm.
		algorithm: String,
	},
	/// No JWKS entry matches the token's key identifier.
	#[error("No signing key matches kid {kid:?}.")]
	UnknownSigningKey {
		/// Header `kid`, when present.
		kid: Option<String>,
	},
	/// Signature verification failed.
	#[error("ID token signature is invalid.")]
	InvalidSignature,
	/// `iss` differs from the registered issuer.
	#[error("ID token issuer does not match the registered issuer.")]
	IssuerMismatch,
	/// `aud` does not contain the client id.
	#[error("ID token audience does not contain the client id.")]
	AudienceMismatch,
	/// `exp` lies in the past.
	#[error("ID token has expired.")]
	Expired,
	/// `nbf` lies in the future.
	#[error("ID token is not valid yet.")]
	NotYetValid,
	/// A required claim is absent.
	#[error("ID token is missing the `{claim}` claim.")]
	MissingClaim {
		/// Claim name.
		claim: String,
	},
	/// `nonce` differs from the expected value.
	#[error("ID token nonce does not match the flow nonce.")]
	NonceMismatch,
	/// Discovery document names another issuer.
	#[error("Discovery document issuer does not match the registered issuer.")]
	DiscoveryIssuerMismatch,
}
impl ProtocolError {
	/// Stable label of the failed check, used in logs.
	pub const fn check(&self) -> &'static str {
		match self {
			ProtocolError::StateMismatch => "state",
			ProtocolError::FlowIssuerMismatch => "flow_issuer",
			ProtocolError::FlowExpired { .. } | ProtocolError::FlowFromFuture { .. } => "flow_age",
			ProtocolError::ProviderError { .. } => "provider_error",
			ProtocolError::TokenRejected { .. } => "token_exchange",
			ProtocolError::MissingIdToken => "id_token_present",
			ProtocolError::MalformedIdToken { .. } => "id_token_format",
			ProtocolError::UnsupportedAlgorithm { .. } => "algorithm",
			ProtocolError::UnknownSigningKey { .. } => "kid",
			ProtocolError::InvalidSignature => "signature",
			ProtocolError::IssuerMismatch => "iss",
			ProtocolError::AudienceMismatch => "aud",
			ProtocolError::Expired => "exp",
			ProtocolError::NotYetValid => "nbf",
			ProtocolError::MissingClaim { .. } => "required_claim",
			ProtocolError::NonceMismatch => "nonce",
			ProtocolError::DiscoveryIssuerMismatch => "discovery_issuer",
		}
	}
}

/// Upstream failures talking to the identity provider.
#[derive(Debug, ThisError)]
pub enum UpstreamError {
	/// Transport failure (DNS, TCP, TLS).
	#[error("Network error occurred while calling the {endpoint} endpoint.")]
	Network {
		/// Endpoint label.
		endpoint: &'static str,
		/// Transport-specific error.
		#[source]
		source: BoxError,
	},
	/// Non-success HTTP status.
	#[error("The {endpoint} endpoint answered with HTTP {status}.")]
	Status {
		/// Endpoint label.
		endpoint: &'static str,
		/// HTTP status code.
		status: u16,
		/// Retry-After hint, if supplied.
		retry_after: Option<Duration>,
	},
	/// Response body could not be parsed.
	#[error("The {endpoint} endpoint returned malformed JSON.")]
	MalformedResponse {
		/// Endpoint label.
		endpoint: &'static str,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Any other unexpected response from the token endpoint.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the identity provider.")]
	Io(#[from] std::io::Error),
}
impl UpstreamError {
	/// Wraps a transport-specific network error.
	pub fn network(endpoint: &'static str, src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { endpoint, source: Box::new(src) }
	}

	/// Returns `true` when an idempotent request may be retried.
	pub fn is_retryable(&self) -> bool {
		match self {
			UpstreamError::Network { .. } | UpstreamError::Io(_) => true,
			UpstreamError::Status { status, .. } => *status == 429 || *status >= 500,
			UpstreamError::TokenEndpoint { status, .. } =>
				status.is_none_or(|code| code == 429 || code >= 500),
			UpstreamError::MalformedResponse { .. } => false,
		}
	}
}

/// Configuration failures raised while building broker components.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Endpoint URL rejected by the oauth2 client.
	#[error("Endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Cipher key configuration is invalid.
	#[error(transparent)]
	KeySet(#[from] KeySetError),
	/// A payload could not be serialized before encryption.
	#[error("Payload could not be serialized.")]
	Serialization {
		/// Underlying serializer failure.
		#[source]
		source: serde_json::Error,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

macro_rules! impl_from_via_validation {
	($($ty:ty),*) => {
		$(
			impl From<$ty> for Error {
				fn from(e: $ty) -> Self {
					ValidationError::from(e).into()
				}
			}
		)*
	};
}

impl_from_via_validation! { IdentifierError, ScopeValidationError, ClientConfigError }

//! Provider configuration: one explicit data structure per concern.
//!
//! `config` holds [`ClientConfig`], the decrypted, ready-to-use federation config made of
//! [`OAuth2Params`] (client credentials, endpoints, scopes) and [`VerifierParams`] (ID token
//! checks and key source). [`OidcSpec`] is the part that is encrypted at rest. Provider
//! quirks are plain flags on these structures. `builder` validates everything before a config
//! can reach the registry.

/// Validating builder for client configs.
pub mod builder;
/// Client config data structures.
pub mod config;

pub use builder::*;
pub use config::*;

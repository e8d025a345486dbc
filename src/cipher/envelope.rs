//! Serialized ciphertext envelope: ciphertext, IV, and the identity of the key used.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::{_prelude::*, cipher::KeyMetadata, error::DecryptionError};

/// Per-encryption parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyParams {
	/// Base64 initialization vector.
	pub iv: String,
}

/// Ciphertext plus everything needed to pick the right key on decryption.
///
/// Wire shape:
/// `{"data":"<base64>","keyParams":{"iv":"<base64>"},"keyMetadata":{"name":"general","version":1}}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherEnvelope {
	/// Base64 ciphertext.
	pub data: String,
	/// Encryption parameters.
	pub key_params: KeyParams,
	/// Identity of the encrypting key.
	pub key_metadata: KeyMetadata,
}
impl CipherEnvelope {
	pub(crate) fn new(ciphertext: &[u8], iv: &[u8], key_metadata: KeyMetadata) -> Self {
		Self {
			data: STANDARD.encode(ciphertext),
			key_params: KeyParams { iv: STANDARD.encode(iv) },
			key_metadata,
		}
	}

	/// Parses an envelope from its JSON representation.
	pub fn from_json(json: &str) -> Result<Self, DecryptionError> {
		serde_json::from_str(json).map_err(|source| DecryptionError::MalformedEnvelope { source })
	}

	/// Serializes the envelope to JSON.
	pub fn to_json(&self) -> String {
		// Only strings and integers; serialization cannot fail.
		serde_json::to_string(self).unwrap_or_default()
	}

	/// Decoded ciphertext bytes.
	pub fn ciphertext(&self) -> Result<Vec<u8>, DecryptionError> {
		STANDARD.decode(&self.data).map_err(|source| DecryptionError::Base64 { field: "data", source })
	}

	/// Decoded initialization vector.
	pub fn iv(&self) -> Result<Vec<u8>, DecryptionError> {
		STANDARD
			.decode(&self.key_params.iv)
			.map_err(|source| DecryptionError::Base64 { field: "keyParams.iv", source })
	}
}

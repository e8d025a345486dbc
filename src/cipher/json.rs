//! Typed wrapper for an encrypted JSON document of a known schema.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	cipher::{CipherEnvelope, CipherService},
	error::{ConfigError, DecryptionError},
};

/// Encrypted JSON payload whose plaintext decodes into `T`.
///
/// Holding the wrapper never materializes the plaintext; [`EncryptedJson::decrypt`] is the only
/// decode step.
#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct EncryptedJson<T> {
	envelope: CipherEnvelope,
	#[serde(skip)]
	schema: PhantomData<fn() -> T>,
}
impl<T> EncryptedJson<T> {
	/// Wraps an existing envelope.
	pub fn from_envelope(envelope: CipherEnvelope) -> Self {
		Self { envelope, schema: PhantomData }
	}

	/// Raw envelope, e.g. for auditing the key identity.
	pub fn envelope(&self) -> &CipherEnvelope {
		&self.envelope
	}
}
impl<T> EncryptedJson<T>
where
	T: Serialize + DeserializeOwned,
{
	/// Serializes and encrypts `value` with the primary key.
	pub fn encrypt(value: &T, cipher: &CipherService) -> Result<Self> {
		let plaintext =
			serde_json::to_vec(value).map_err(|source| ConfigError::Serialization { source })?;

		Ok(Self::from_envelope(cipher.encrypt(&plaintext)))
	}

	/// Decrypts and decodes the payload.
	pub fn decrypt(&self, cipher: &CipherService) -> Result<T, DecryptionError> {
		let plaintext = cipher.decrypt(&self.envelope)?;
		let mut de = serde_json::Deserializer::from_slice(&plaintext);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| DecryptionError::MalformedPayload { source })
	}
}
impl<T> Clone for EncryptedJson<T> {
	fn clone(&self) -> Self {
		Self::from_envelope(self.envelope.clone())
	}
}
impl<T> PartialEq for EncryptedJson<T> {
	fn eq(&self, other: &Self) -> bool {
		self.envelope == other.envelope
	}
}
impl<T> Debug for EncryptedJson<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EncryptedJson").field("key", &self.envelope.key_metadata).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::cipher::{CipherKey, CipherKeySet};

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Sample {
		name: String,
		count: u32,
	}

	fn cipher() -> CipherService {
		let key = CipherKey::new("general", 1, [5; 32]).expect("Key should build.");

		CipherService::new(CipherKeySet::new([key], ("general", 1)).expect("Key set should build."))
	}

	#[test]
	fn decrypts_into_the_declared_schema() {
		let cipher = cipher();
		let value = Sample { name: "google".into(), count: 2 };
		let encrypted = EncryptedJson::encrypt(&value, &cipher).expect("Encryption should succeed.");

		assert_eq!(encrypted.decrypt(&cipher).expect("Decryption should succeed."), value);
	}

	#[test]
	fn schema_mismatch_is_a_decryption_error() {
		let cipher = cipher();
		let encrypted = EncryptedJson::<String>::encrypt(&"plain".to_owned(), &cipher)
			.expect("Encryption should succeed.");
		let retyped = EncryptedJson::<Sample>::from_envelope(encrypted.envelope().clone());

		assert!(matches!(
			retyped.decrypt(&cipher),
			Err(DecryptionError::MalformedPayload { .. })
		));
	}

	#[test]
	fn debug_never_shows_ciphertext() {
		let cipher = cipher();
		let encrypted = EncryptedJson::encrypt(&Sample { name: "x".into(), count: 0 }, &cipher)
			.expect("Encryption should succeed.");
		let rendered = format!("{encrypted:?}");

		assert!(!rendered.contains(&encrypted.envelope().data));
	}
}

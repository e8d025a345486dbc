//! Symmetric encryption of opaque payloads with versioned keys.
//!
//! [`CipherService`] encrypts with AES-256-CBC and PKCS#7 padding under the key set's primary
//! key, drawing a fresh random IV for every call. Decryption resolves the key from the
//! envelope's own [`KeyMetadata`], so rotating the primary key never strands older records.
//!
//! CBC offers confidentiality only. A padding failure is the sole tamper signal at this layer;
//! typed payloads ([`EncryptedJson`]) add a schema decode on top, which catches most other
//! corruption.

pub mod envelope;
pub mod json;
pub mod key;

pub use envelope::*;
pub use json::*;
pub use key::*;

// crates.io
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use rand::Rng;
// self
use crate::{_prelude::*, error::DecryptionError};

/// AES block size in bytes.
pub const BLOCK_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Cipher bound to an immutable key set. Cheap to clone and safe to share across flows.
#[derive(Clone, Debug)]
pub struct CipherService {
	keys: Arc<CipherKeySet>,
}
impl CipherService {
	/// Creates a service over the provided key set.
	pub fn new(keys: CipherKeySet) -> Self {
		Self { keys: Arc::new(keys) }
	}

	/// Key set backing this service.
	pub fn keys(&self) -> &CipherKeySet {
		&self.keys
	}

	/// Returns a service whose primary key is `name`/`version`; other keys stay decryptable.
	pub fn rotate_primary(&self, name: &str, version: u32) -> Result<Self, KeySetError> {
		Ok(Self::new(self.keys.with_primary(name, version)?))
	}

	/// Encrypts `plaintext` with the primary key.
	pub fn encrypt(&self, plaintext: &[u8]) -> CipherEnvelope {
		encrypt_with(plaintext, self.keys.primary())
	}

	/// Decrypts an envelope using this service's key set.
	pub fn decrypt(&self, envelope: &CipherEnvelope) -> Result<Vec<u8>, DecryptionError> {
		decrypt_with(envelope, self.keys.as_ref())
	}
}

/// Encrypts `plaintext` under an explicit key.
pub fn encrypt_with(plaintext: &[u8], key: &CipherKey) -> CipherEnvelope {
	let mut iv = [0_u8; BLOCK_LEN];

	rand::rng().fill(&mut iv);

	let ciphertext = Aes256CbcEnc::new(&key.material().into(), &iv.into())
		.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

	CipherEnvelope::new(&ciphertext, &iv, key.metadata().clone())
}

/// Decrypts an envelope with a key looked up through `resolver`.
pub fn decrypt_with(
	envelope: &CipherEnvelope,
	resolver: &dyn KeyResolver,
) -> Result<Vec<u8>, DecryptionError> {
	let metadata = &envelope.key_metadata;
	let key = resolver.resolve(metadata).ok_or_else(|| DecryptionError::UnknownKey {
		name: metadata.name.clone(),
		version: metadata.version,
	})?;
	let iv = envelope.iv()?;
	let iv = <[u8; BLOCK_LEN]>::try_from(iv.as_slice())
		.map_err(|_| DecryptionError::InvalidIv { len: iv.len() })?;
	let ciphertext = envelope.ciphertext()?;

	if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
		return Err(DecryptionError::CiphertextLength { len: ciphertext.len() });
	}

	Aes256CbcDec::new(&key.material().into(), &iv.into())
		.decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
		.map_err(|_| DecryptionError::Padding)
}

#[cfg(test)]
mod tests {
	// crates.io
	use base64::{Engine as _, engine::general_purpose::STANDARD};
	// self
	use super::*;

	fn service() -> CipherService {
		let v1 = CipherKey::new("general", 1, *b"testtesttesttesttesttesttesttest")
			.expect("Key fixture should build.");
		let v2 = CipherKey::new("general", 2, [42; KEY_LEN]).expect("Key fixture should build.");

		CipherService::new(
			CipherKeySet::new([v1, v2], ("general", 1)).expect("Key set fixture should build."),
		)
	}

	fn flip(encoded: &str, index: usize) -> String {
		let mut bytes = STANDARD.decode(encoded).expect("Fixture should be valid base64.");

		bytes[index] ^= 0x01;

		STANDARD.encode(bytes)
	}

	#[test]
	fn round_trips_arbitrary_payloads_bit_for_bit() {
		let cipher = service();
		let payloads: [&[u8]; 4] = [b"", b"a", &[0_u8; BLOCK_LEN], &[0xff; 1000]];

		for plaintext in payloads {
			let envelope = cipher.encrypt(plaintext);

			assert_eq!(cipher.decrypt(&envelope).expect("Round trip should succeed."), plaintext);
		}
	}

	#[test]
	fn fresh_iv_per_call() {
		let cipher = service();
		let a = cipher.encrypt(b"same plaintext");
		let b = cipher.encrypt(b"same plaintext");

		assert_ne!(a.key_params.iv, b.key_params.iv);
		assert_ne!(a.data, b.data);
	}

	#[test]
	fn rotation_keeps_old_records_readable() {
		let cipher = service();
		let old = cipher.encrypt(b"written under v1");
		let rotated = cipher.rotate_primary("general", 2).expect("Rotation should succeed.");
		let new = rotated.encrypt(b"written under v2");

		assert_eq!(new.key_metadata, KeyMetadata::new("general", 2));
		assert_eq!(rotated.decrypt(&old).expect("Old record should decrypt."), b"written under v1");
		assert_eq!(cipher.decrypt(&new).expect("New record should decrypt."), b"written under v2");
	}

	#[test]
	fn unknown_key_identity_is_rejected() {
		let cipher = service();
		let mut envelope = cipher.encrypt(b"secret");

		envelope.key_metadata.version = 9;

		assert!(matches!(
			cipher.decrypt(&envelope),
			Err(DecryptionError::UnknownKey { version: 9, .. })
		));

		envelope.key_metadata = KeyMetadata::new("other", 1);

		assert!(matches!(cipher.decrypt(&envelope), Err(DecryptionError::UnknownKey { .. })));
	}

	#[test]
	fn tampering_with_the_padding_block_is_rejected() {
		let cipher = service();
		// Single block: the IV's last byte masks the final padding byte.
		let mut single = cipher.encrypt(b"short");

		single.key_params.iv = flip(&single.key_params.iv, BLOCK_LEN - 1);

		assert!(matches!(cipher.decrypt(&single), Err(DecryptionError::Padding)));

		// Multiple blocks: the penultimate block masks the final padding byte.
		let mut multi = cipher.encrypt(&[7_u8; 40]);
		let len = multi.ciphertext().expect("Ciphertext should decode.").len();

		multi.data = flip(&multi.data, len - BLOCK_LEN - 1);

		assert!(matches!(cipher.decrypt(&multi), Err(DecryptionError::Padding)));
	}

	#[test]
	fn malformed_lengths_are_rejected() {
		let cipher = service();
		let mut truncated = cipher.encrypt(b"payload");
		let mut bytes = truncated.ciphertext().expect("Ciphertext should decode.");

		bytes.pop();
		truncated.data = STANDARD.encode(&bytes);

		assert!(matches!(
			cipher.decrypt(&truncated),
			Err(DecryptionError::CiphertextLength { len: 15 })
		));

		let mut short_iv = cipher.encrypt(b"payload");

		short_iv.key_params.iv = STANDARD.encode([0_u8; 8]);

		assert!(matches!(cipher.decrypt(&short_iv), Err(DecryptionError::InvalidIv { len: 8 })));

		let mut empty = cipher.encrypt(b"payload");

		empty.data = String::new();

		assert!(matches!(cipher.decrypt(&empty), Err(DecryptionError::CiphertextLength { len: 0 })));
	}
}

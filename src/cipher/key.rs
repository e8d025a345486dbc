//! Versioned symmetric keys and the key set used for rotation.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::{_prelude::*, auth::Secret};

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// `(name, version)` identity recorded next to every ciphertext.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyMetadata {
	/// Key name, e.g. `general`.
	pub name: String,
	/// Monotonic key version.
	pub version: u32,
}
impl KeyMetadata {
	/// Builds metadata from a name/version pair.
	pub fn new(name: impl Into<String>, version: u32) -> Self {
		Self { name: name.into(), version }
	}
}
impl Display for KeyMetadata {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}/{}", self.name, self.version)
	}
}

/// Errors raised while assembling a [`CipherKeySet`].
#[derive(Debug, ThisError)]
pub enum KeySetError {
	/// Key name is empty.
	#[error("Cipher key name cannot be empty.")]
	EmptyName,
	/// Key material has the wrong size.
	#[error("Cipher key {key} has {len} bytes of material; expected 32.")]
	InvalidLength {
		/// Offending key.
		key: KeyMetadata,
		/// Observed length.
		len: usize,
	},
	/// Key material is not valid base64.
	#[error("Cipher key {key} material is not valid base64.")]
	InvalidMaterial {
		/// Offending key.
		key: KeyMetadata,
		/// Underlying decode failure.
		#[source]
		source: base64::DecodeError,
	},
	/// The same name/version appears twice.
	#[error("Cipher key {key} is declared more than once.")]
	DuplicateKey {
		/// Duplicated key.
		key: KeyMetadata,
	},
	/// Designated primary key is absent.
	#[error("Primary cipher key {key} is not part of the key set.")]
	MissingPrimary {
		/// Requested primary.
		key: KeyMetadata,
	},
	/// Configuration marks zero or several keys as primary.
	#[error("Key configuration must mark exactly one primary key; found {count}.")]
	PrimaryCount {
		/// Number of primary keys found.
		count: usize,
	},
	/// Configuration document cannot be parsed.
	#[error("Key configuration is not valid JSON.")]
	Parse {
		/// Underlying parse failure.
		#[source]
		source: serde_json::Error,
	},
}

/// Symmetric key plus its identity. Material never renders through [`Debug`].
#[derive(Clone)]
pub struct CipherKey {
	metadata: KeyMetadata,
	material: [u8; KEY_LEN],
}
impl CipherKey {
	/// Creates a key from raw material.
	pub fn new(
		name: impl Into<String>,
		version: u32,
		material: [u8; KEY_LEN],
	) -> Result<Self, KeySetError> {
		let metadata = KeyMetadata::new(name, version);

		if metadata.name.is_empty() {
			return Err(KeySetError::EmptyName);
		}

		Ok(Self { metadata, material })
	}

	/// Creates a key from a byte slice, checking its length.
	pub fn from_slice(
		name: impl Into<String>,
		version: u32,
		material: &[u8],
	) -> Result<Self, KeySetError> {
		let key = KeyMetadata::new(name, version);
		let material = <[u8; KEY_LEN]>::try_from(material)
			.map_err(|_| KeySetError::InvalidLength { key: key.clone(), len: material.len() })?;

		Self::new(key.name, key.version, material)
	}

	/// Key identity.
	pub fn metadata(&self) -> &KeyMetadata {
		&self.metadata
	}

	pub(crate) fn material(&self) -> [u8; KEY_LEN] {
		self.material
	}
}
impl Debug for CipherKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CipherKey")
			.field("metadata", &self.metadata)
			.field("material", &"<redacted>")
			.finish()
	}
}

/// One entry of the key configuration handed over by the secret manager.
///
/// ```json
/// [{ "name": "general", "version": 1, "primary": true, "material": "<base64>" }]
/// ```
#[derive(Clone, Debug, Deserialize)]
pub struct KeyConfig {
	/// Key name.
	pub name: String,
	/// Key version.
	pub version: u32,
	/// Marks the key used for new encryptions.
	#[serde(default)]
	pub primary: bool,
	/// Base64 (standard alphabet) key material.
	pub material: Secret,
}

/// Resolves keys by the identity recorded in an envelope.
pub trait KeyResolver
where
	Self: Send + Sync,
{
	/// Returns the key with the provided identity, if known.
	fn resolve(&self, metadata: &KeyMetadata) -> Option<&CipherKey>;
}

/// Immutable set of decryption keys with exactly one primary key for encryption.
#[derive(Clone, Debug)]
pub struct CipherKeySet {
	keys: HashMap<KeyMetadata, CipherKey>,
	primary: KeyMetadata,
}
impl CipherKeySet {
	/// Builds a key set, designating `primary` for new encryptions.
	pub fn new<I, N>(keys: I, primary: (N, u32)) -> Result<Self, KeySetError>
	where
		I: IntoIterator<Item = CipherKey>,
		N: Into<String>,
	{
		let mut map = HashMap::new();

		for key in keys {
			let metadata = key.metadata.clone();

			if map.insert(metadata.clone(), key).is_some() {
				return Err(KeySetError::DuplicateKey { key: metadata });
			}
		}

		let primary = KeyMetadata::new(primary.0, primary.1);

		if !map.contains_key(&primary) {
			return Err(KeySetError::MissingPrimary { key: primary });
		}

		Ok(Self { keys: map, primary })
	}

	/// Builds a key set from parsed configuration entries.
	pub fn from_configs<I>(configs: I) -> Result<Self, KeySetError>
	where
		I: IntoIterator<Item = KeyConfig>,
	{
		let mut keys = Vec::new();
		let mut primaries = Vec::new();

		for config in configs {
			let metadata = KeyMetadata::new(config.name, config.version);
			let material = STANDARD.decode(config.material.expose()).map_err(|source| {
				KeySetError::InvalidMaterial { key: metadata.clone(), source }
			})?;

			if config.primary {
				primaries.push(metadata.clone());
			}

			keys.push(CipherKey::from_slice(metadata.name, metadata.version, &material)?);
		}

		if primaries.len() != 1 {
			return Err(KeySetError::PrimaryCount { count: primaries.len() });
		}

		let primary = primaries.remove(0);

		Self::new(keys, (primary.name, primary.version))
	}

	/// Parses the JSON key configuration document.
	pub fn from_json(json: &str) -> Result<Self, KeySetError> {
		let configs: Vec<KeyConfig> =
			serde_json::from_str(json).map_err(|source| KeySetError::Parse { source })?;

		Self::from_configs(configs)
	}

	/// Key used for new encryptions.
	pub fn primary(&self) -> &CipherKey {
		// `new` guarantees the primary is present.
		&self.keys[&self.primary]
	}

	/// Looks up a key by name and version.
	pub fn get(&self, name: &str, version: u32) -> Option<&CipherKey> {
		self.keys.get(&KeyMetadata::new(name, version))
	}

	/// Returns a copy of the set with another primary key.
	pub fn with_primary(&self, name: &str, version: u32) -> Result<Self, KeySetError> {
		let primary = KeyMetadata::new(name, version);

		if !self.keys.contains_key(&primary) {
			return Err(KeySetError::MissingPrimary { key: primary });
		}

		Ok(Self { keys: self.keys.clone(), primary })
	}

	/// Number of keys available for decryption.
	pub fn len(&self) -> usize {
		self.keys.len()
	}

	/// Always `false`; a key set holds at least its primary key.
	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}
}
impl KeyResolver for CipherKeySet {
	fn resolve(&self, metadata: &KeyMetadata) -> Option<&CipherKey> {
		self.keys.get(metadata)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn material(byte: u8) -> String {
		STANDARD.encode([byte; KEY_LEN])
	}

	#[test]
	fn json_config_requires_exactly_one_primary() {
		let json = format!(
			r#"[{{"name":"general","version":1,"primary":true,"material":"{}"}},
			    {{"name":"general","version":2,"material":"{}"}}]"#,
			material(1),
			material(2),
		);
		let keys = CipherKeySet::from_json(&json).expect("Key configuration should parse.");

		assert_eq!(keys.len(), 2);
		assert_eq!(keys.primary().metadata(), &KeyMetadata::new("general", 1));

		let none_primary =
			format!(r#"[{{"name":"general","version":1,"material":"{}"}}]"#, material(1));

		assert!(matches!(
			CipherKeySet::from_json(&none_primary),
			Err(KeySetError::PrimaryCount { count: 0 })
		));
	}

	#[test]
	fn rejects_short_material_and_duplicates() {
		let short = format!(
			r#"[{{"name":"general","version":1,"primary":true,"material":"{}"}}]"#,
			STANDARD.encode([0_u8; 16])
		);

		assert!(matches!(
			CipherKeySet::from_json(&short),
			Err(KeySetError::InvalidLength { len: 16, .. })
		));

		let key = CipherKey::new("general", 1, [7; KEY_LEN]).expect("Key should build.");
		let err = CipherKeySet::new([key.clone(), key], ("general", 1))
			.expect_err("Duplicate keys must be rejected.");

		assert!(matches!(err, KeySetError::DuplicateKey { .. }));
	}

	#[test]
	fn primary_can_rotate_to_known_keys_only() {
		let v1 = CipherKey::new("general", 1, [1; KEY_LEN]).expect("Key should build.");
		let v2 = CipherKey::new("general", 2, [2; KEY_LEN]).expect("Key should build.");
		let keys = CipherKeySet::new([v1, v2], ("general", 1)).expect("Key set should build.");
		let rotated = keys.with_primary("general", 2).expect("Rotation should succeed.");

		assert_eq!(rotated.primary().metadata().version, 2);
		assert!(keys.with_primary("general", 3).is_err());
	}

	#[test]
	fn debug_redacts_material() {
		let key = CipherKey::new("general", 1, [9; KEY_LEN]).expect("Key should build.");

		assert!(format!("{key:?}").contains("<redacted>"));
	}
}

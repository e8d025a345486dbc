//! Persistence of client configs as encrypted rows.
//!
//! [`ConfigStore`] is the relational-store collaborator: it only ever sees ciphertext.
//! [`EncryptedConfigStore`] sits on top and owns the encrypt-on-write step; decryption is an
//! explicit call on [`ClientConfigRecord`], so rows can be listed without materializing secrets.

pub mod encrypted;
pub mod file;
pub mod memory;

pub use encrypted::EncryptedConfigStore;
pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{ConfigId, Issuer},
	cipher::{CipherService, EncryptedJson},
	error::DecryptionError,
	provider::{ClientConfig, OidcSpec},
};

/// Boxed future returned by [`ConfigStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Row-level contract implemented by config store backends.
///
/// `id` is the primary key across all rows, soft-deleted ones included. `issuer` is unique among
/// non-deleted rows. Rows are never hard-deleted.
pub trait ConfigStore
where
	Self: Send + Sync,
{
	/// Writes a new row, assigning `last_modified`.
	fn insert(
		&self,
		id: ConfigId,
		issuer: Issuer,
		data: EncryptedJson<OidcSpec>,
	) -> StoreFuture<'_, ClientConfigRecord>;

	/// Fetches the non-deleted row with the provided id.
	fn get_by_id<'a>(&'a self, id: &'a ConfigId) -> StoreFuture<'a, Option<ClientConfigRecord>>;

	/// Lists every non-deleted row.
	fn list_active(&self) -> StoreFuture<'_, Vec<ClientConfigRecord>>;

	/// Flags a row as deleted; returns `false` when no active row matched.
	fn mark_deleted<'a>(&'a self, id: &'a ConfigId) -> StoreFuture<'a, bool>;
}

/// Error type produced by [`ConfigStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StoreError {
	/// Primary key collision.
	#[error("Row `{id}` already exists.")]
	DuplicateId {
		/// Contested identifier.
		id: ConfigId,
	},
	/// Another active row owns the issuer.
	#[error("Issuer `{issuer}` is already stored under row `{owner}`.")]
	DuplicateIssuer {
		/// Contested issuer.
		issuer: Issuer,
		/// Row currently owning the issuer.
		owner: ConfigId,
	},
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Persisted client config row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientConfigRecord {
	/// Primary key.
	pub id: ConfigId,
	/// Issuer, indexed.
	pub issuer: Issuer,
	/// Encrypted OAuth 2.0 and verifier parameters.
	pub data: EncryptedJson<OidcSpec>,
	/// Store-assigned modification timestamp.
	#[serde(with = "time::serde::rfc3339")]
	pub last_modified: OffsetDateTime,
	/// Soft-delete flag maintained by external sync tooling.
	#[serde(default)]
	pub deleted: bool,
}
impl ClientConfigRecord {
	/// Decrypts and decodes the provider parameters.
	pub fn decrypt_spec(&self, cipher: &CipherService) -> Result<OidcSpec, DecryptionError> {
		self.data.decrypt(cipher)
	}

	/// Decrypts the row into a validated, ready-to-use config.
	pub fn into_client_config(self, cipher: &CipherService) -> Result<ClientConfig> {
		let spec = self.data.decrypt(cipher)?;

		Ok(ClientConfig::from_spec(self.id, self.issuer, spec)?)
	}
}

type Rows = HashMap<ConfigId, ClientConfigRecord>;

fn insert_row(
	rows: &mut Rows,
	id: ConfigId,
	issuer: Issuer,
	data: EncryptedJson<OidcSpec>,
) -> Result<ClientConfigRecord, StoreError> {
	if rows.contains_key(&id) {
		return Err(StoreError::DuplicateId { id });
	}
	if let Some(owner) = rows.values().find(|row| !row.deleted && row.issuer == issuer) {
		return Err(StoreError::DuplicateIssuer { issuer, owner: owner.id.clone() });
	}

	let record = ClientConfigRecord {
		id: id.clone(),
		issuer,
		data,
		last_modified: OffsetDateTime::now_utc(),
		deleted: false,
	};

	rows.insert(id, record.clone());

	Ok(record)
}

fn active_row<'a>(rows: &'a Rows, id: &ConfigId) -> Option<&'a ClientConfigRecord> {
	rows.get(id).filter(|row| !row.deleted)
}

fn list_active_rows(rows: &Rows) -> Vec<ClientConfigRecord> {
	let mut active: Vec<_> = rows.values().filter(|row| !row.deleted).cloned().collect();

	active.sort_by(|a, b| a.id.cmp(&b.id));

	active
}

fn mark_row_deleted(rows: &mut Rows, id: &ConfigId) -> bool {
	match rows.get_mut(id) {
		Some(row) if !row.deleted => {
			row.deleted = true;
			row.last_modified = OffsetDateTime::now_utc();

			true
		},
		_ => false,
	}
}

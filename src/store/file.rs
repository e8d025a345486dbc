//! File-backed [`ConfigStore`] for single-node deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{ConfigId, Issuer},
	cipher::EncryptedJson,
	provider::OidcSpec,
	store::{self, ClientConfigRecord, ConfigStore, Rows, StoreError, StoreFuture},
};

/// Persists rows to a JSON file after each mutation.
///
/// The file only ever contains ciphertext envelopes; snapshots are replaced atomically via a
/// temporary file and rename.
///
/// Writes are blocking and run inline on the polling task while the row lock is held. A
/// [`CallContext`](crate::context::CallContext) deadline cannot interrupt them: the mutation
/// finishes within its first poll, so a timeout only fires before the write starts or after it
/// has landed on disk.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Rows>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing rows.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	fn load_snapshot(path: &Path) -> Result<Rows, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(HashMap::new());
		}

		let rows: Vec<ClientConfigRecord> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		Ok(rows.into_iter().map(|row| (row.id.clone(), row)).collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, rows: &Rows) -> Result<(), StoreError> {
		let mut snapshot: Vec<_> = rows.values().collect();

		snapshot.sort_by(|a, b| a.id.cmp(&b.id));

		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl ConfigStore for FileStore {
	fn insert(
		&self,
		id: ConfigId,
		issuer: Issuer,
		data: EncryptedJson<OidcSpec>,
	) -> StoreFuture<'_, ClientConfigRecord> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let mut staged = guard.clone();
			let record = store::insert_row(&mut staged, id, issuer, data)?;

			self.persist_locked(&staged)?;
			*guard = staged;

			Ok(record)
		})
	}

	fn get_by_id<'a>(&'a self, id: &'a ConfigId) -> StoreFuture<'a, Option<ClientConfigRecord>> {
		Box::pin(async move { Ok(store::active_row(&self.inner.read(), id).cloned()) })
	}

	fn list_active(&self) -> StoreFuture<'_, Vec<ClientConfigRecord>> {
		Box::pin(async move { Ok(store::list_active_rows(&self.inner.read())) })
	}

	fn mark_deleted<'a>(&'a self, id: &'a ConfigId) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let mut staged = guard.clone();

			if !store::mark_row_deleted(&mut staged, id) {
				return Ok(false);
			}

			self.persist_locked(&staged)?;
			*guard = staged;

			Ok(true)
		})
	}
}

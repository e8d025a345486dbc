//! Thread-safe in-memory [`ConfigStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{ConfigId, Issuer},
	cipher::EncryptedJson,
	provider::OidcSpec,
	store::{self, ClientConfigRecord, ConfigStore, Rows, StoreFuture},
};

type StoreMap = Arc<RwLock<Rows>>;

/// Storage backend that keeps rows in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl ConfigStore for MemoryStore {
	fn insert(
		&self,
		id: ConfigId,
		issuer: Issuer,
		data: EncryptedJson<OidcSpec>,
	) -> StoreFuture<'_, ClientConfigRecord> {
		let map = self.0.clone();

		Box::pin(async move { store::insert_row(&mut map.write(), id, issuer, data) })
	}

	fn get_by_id<'a>(&'a self, id: &'a ConfigId) -> StoreFuture<'a, Option<ClientConfigRecord>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(store::active_row(&map.read(), id).cloned()) })
	}

	fn list_active(&self) -> StoreFuture<'_, Vec<ClientConfigRecord>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(store::list_active_rows(&map.read())) })
	}

	fn mark_deleted<'a>(&'a self, id: &'a ConfigId) -> StoreFuture<'a, bool> {
		let map = self.0.clone();

		Box::pin(async move { Ok(store::mark_row_deleted(&mut map.write(), id)) })
	}
}

//! Read-mostly index of ready-to-use client configs.
//!
//! The registry holds an immutable [`RegistrySnapshot`] behind an `Arc`. Readers clone the `Arc`
//! and look up without further locking; writers build the next snapshot off to the side and swap
//! it in, so a lookup never waits on another lookup or on store I/O.

// std
use std::convert::Infallible;
// self
use crate::{
	_prelude::*,
	auth::{ConfigId, Issuer},
	context::CallContext,
	error::{ConflictError, NotFoundError, ValidationError},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::ClientConfig,
	store::EncryptedConfigStore,
};

/// Immutable view of the registry at one point in time.
#[derive(Clone, Debug, Default)]
pub struct RegistrySnapshot {
	by_id: HashMap<ConfigId, Arc<ClientConfig>>,
	by_issuer: HashMap<Issuer, Arc<ClientConfig>>,
}
impl RegistrySnapshot {
	/// Exact-match lookup by issuer.
	pub fn get_by_issuer(&self, issuer: &str) -> Option<&Arc<ClientConfig>> {
		self.by_issuer.get(issuer)
	}

	/// Exact-match lookup by identifier.
	pub fn get_by_id(&self, id: &str) -> Option<&Arc<ClientConfig>> {
		self.by_id.get(id)
	}

	/// Number of registered configs.
	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	/// Returns `true` when nothing is registered.
	pub fn is_empty(&self) -> bool {
		self.by_id.is_empty()
	}

	/// Iterates over the registered configs in no particular order.
	pub fn iter(&self) -> impl Iterator<Item = &Arc<ClientConfig>> {
		self.by_id.values()
	}

	fn insert(&mut self, config: Arc<ClientConfig>) -> Result<(), ConflictError> {
		if let Some(owner) =
			self.by_issuer.get(&config.issuer).filter(|owner| owner.id != config.id)
		{
			return Err(ConflictError::IssuerTaken {
				issuer: config.issuer.to_string(),
				owner: owner.id.clone(),
			});
		}
		if let Some(previous) = self.by_id.insert(config.id.clone(), config.clone()) {
			self.by_issuer.remove(&previous.issuer);
		}

		self.by_issuer.insert(config.issuer.clone(), config);

		Ok(())
	}

	fn remove(&mut self, id: &str) -> Option<Arc<ClientConfig>> {
		let removed = self.by_id.remove(id)?;

		self.by_issuer.remove(&removed.issuer);

		Some(removed)
	}
}

/// Concurrent registry of client configs keyed by identifier and by issuer.
#[derive(Debug, Default)]
pub struct ClientConfigRegistry {
	current: RwLock<Arc<RegistrySnapshot>>,
	writer: Mutex<()>,
}
impl ClientConfigRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the current snapshot.
	pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
		self.current.read().clone()
	}

	/// Registers or replaces a config.
	///
	/// Replacing keeps the identifier and may move the config to a new issuer. Another config
	/// already owning the issuer yields [`ConflictError::IssuerTaken`].
	pub fn add_client_config(&self, config: ClientConfig) -> Result<Arc<ClientConfig>> {
		config.validate().map_err(ValidationError::from)?;

		let config = Arc::new(config);

		self.update(|next| next.insert(config.clone()))?;

		Ok(config)
	}

	/// Exact-match lookup by issuer.
	pub fn get_by_issuer(&self, issuer: &str) -> Result<Arc<ClientConfig>> {
		self.snapshot()
			.get_by_issuer(issuer)
			.cloned()
			.ok_or_else(|| NotFoundError::Issuer { issuer: issuer.to_owned() }.into())
	}

	/// Exact-match lookup by identifier.
	pub fn get_by_id(&self, id: &str) -> Result<Arc<ClientConfig>> {
		self.snapshot()
			.get_by_id(id)
			.cloned()
			.ok_or_else(|| NotFoundError::ConfigId { id: id.to_owned() }.into())
	}

	/// Removes a config; returns it when it was registered.
	pub fn remove(&self, id: &str) -> Option<Arc<ClientConfig>> {
		let Ok(removed) = self.update(|next| Ok::<_, Infallible>(next.remove(id)));

		removed
	}

	/// Number of registered configs.
	pub fn len(&self) -> usize {
		self.snapshot().len()
	}

	/// Returns `true` when nothing is registered.
	pub fn is_empty(&self) -> bool {
		self.snapshot().is_empty()
	}

	/// Rebuilds the registry from the active rows of `store`.
	///
	/// Rows that fail to decrypt, validate, or index are logged and skipped. The previous
	/// snapshot stays in place if listing the store fails. Returns the number of loaded configs.
	pub async fn load_from_store(
		&self,
		ctx: &CallContext,
		store: &EncryptedConfigStore,
	) -> Result<usize> {
		let span = FlowSpan::new(FlowKind::RegistryLoad, "load_from_store", "");

		obs::record_flow_outcome(FlowKind::RegistryLoad, FlowOutcome::Attempt);

		let rows = match span.instrument(store.list_active(ctx)).await {
			Ok(rows) => rows,
			Err(e) => {
				obs::log_failure(FlowKind::RegistryLoad, &e);
				obs::record_flow_outcome(FlowKind::RegistryLoad, FlowOutcome::Failure);

				return Err(e);
			},
		};
		let _guard = span.entered();
		let mut next = RegistrySnapshot::default();

		for row in rows {
			let id = row.id.clone();
			let loaded = row
				.into_client_config(store.cipher())
				.and_then(|config| Ok(next.insert(Arc::new(config))?));

			if let Err(e) = loaded {
				obs::log_skipped_config(&id, &e);
			}
		}

		let loaded = next.len();
		let _writer = self.writer.lock();

		*self.current.write() = Arc::new(next);

		obs::record_flow_outcome(FlowKind::RegistryLoad, FlowOutcome::Success);

		Ok(loaded)
	}

	/// Applies `apply` to a copy of the current snapshot and publishes it; a failed `apply` leaves
	/// the registry untouched.
	fn update<F, T, E>(&self, apply: F) -> Result<T, E>
	where
		F: FnOnce(&mut RegistrySnapshot) -> Result<T, E>,
	{
		let _writer = self.writer.lock();
		let mut next = RegistrySnapshot::clone(&self.current.read());
		let output = apply(&mut next)?;

		*self.current.write() = Arc::new(next);

		Ok(output)
	}
}

//! Encrypt-on-write facade over a [`ConfigStore`].

// self
use crate::{
	_prelude::*,
	auth::{ConfigId, Issuer},
	cipher::{CipherService, EncryptedJson},
	context::CallContext,
	error::{ConflictError, NotFoundError},
	provider::{ClientConfig, OidcSpec},
	store::{ClientConfigRecord, ConfigStore, StoreError},
};

/// Bridges validated client configs and the row store.
///
/// The configured [`CipherService`] is used to encrypt every write; reads return raw records and
/// leave decryption to the caller.
#[derive(Clone)]
pub struct EncryptedConfigStore {
	store: Arc<dyn ConfigStore>,
	cipher: CipherService,
}
impl EncryptedConfigStore {
	/// Wraps a row store with the cipher used for new rows.
	pub fn new(store: Arc<dyn ConfigStore>, cipher: CipherService) -> Self {
		Self { store, cipher }
	}

	/// Cipher used for writes, also able to decrypt rows written under retired keys.
	pub fn cipher(&self) -> &CipherService {
		&self.cipher
	}

	/// Validates, encrypts, and writes a new config row.
	pub async fn create(
		&self,
		ctx: &CallContext,
		id: ConfigId,
		issuer: Issuer,
		spec: OidcSpec,
	) -> Result<ClientConfigRecord> {
		let config = ClientConfig::from_spec(id, issuer, spec)?;

		self.create_from_config(ctx, &config).await
	}

	/// Encrypts and writes an already validated config.
	pub async fn create_from_config(
		&self,
		ctx: &CallContext,
		config: &ClientConfig,
	) -> Result<ClientConfigRecord> {
		let data = EncryptedJson::encrypt(&config.spec(), &self.cipher)?;

		ctx.bound("config store", async {
			self.store
				.insert(config.id.clone(), config.issuer.clone(), data)
				.await
				.map_err(map_store_error)
		})
		.await
	}

	/// Fetches the active row with the provided id.
	pub async fn get_by_id(&self, ctx: &CallContext, id: &ConfigId) -> Result<ClientConfigRecord> {
		let row = ctx
			.bound("config store", async { Ok(self.store.get_by_id(id).await?) })
			.await?;

		row.ok_or_else(|| NotFoundError::ConfigId { id: id.to_string() }.into())
	}

	/// Lists active rows without decrypting them.
	pub async fn list_active(&self, ctx: &CallContext) -> Result<Vec<ClientConfigRecord>> {
		ctx.bound("config store", async { Ok(self.store.list_active().await?) }).await
	}

	/// Fetches and decrypts the active config with the provided id.
	pub async fn load_config(&self, ctx: &CallContext, id: &ConfigId) -> Result<ClientConfig> {
		self.get_by_id(ctx, id).await?.into_client_config(&self.cipher)
	}
}
impl Debug for EncryptedConfigStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EncryptedConfigStore").field("cipher", &self.cipher).finish_non_exhaustive()
	}
}

fn map_store_error(e: StoreError) -> Error {
	match e {
		StoreError::DuplicateId { id } => ConflictError::DuplicateId { id: id.to_string() }.into(),
		StoreError::DuplicateIssuer { issuer, owner } =>
			ConflictError::IssuerTaken { issuer: issuer.to_string(), owner }.into(),
		e => e.into(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{TEST_KEY_MATERIAL, config_id, issuer, test_cipher},
		cipher::{CipherKey, CipherKeySet},
		error::ErrorKind,
		provider::{OAuth2Params, VerifierParams},
		store::MemoryStore,
	};

	fn spec(client_id: &str) -> OidcSpec {
		let url = |value: &str| Url::parse(value).expect("URL fixture should parse.");

		OidcSpec {
			oauth2: OAuth2Params {
				client_id: client_id.into(),
				client_secret: "top-secret".into(),
				authorization_endpoint: url("https://accounts.google.com/o/oauth2/v2/auth"),
				token_endpoint: url("https://oauth2.googleapis.com/token"),
				redirect_uri: url("https://app.example.com/iam/oidc/callback"),
				scopes: Default::default(),
				client_auth_method: Default::default(),
				scope_delimiter: ' ',
			},
			verifier: VerifierParams::default(),
		}
	}

	fn store() -> (EncryptedConfigStore, Arc<MemoryStore>) {
		let rows = Arc::new(MemoryStore::default());

		(EncryptedConfigStore::new(rows.clone(), test_cipher()), rows)
	}

	#[tokio::test]
	async fn create_assigns_timestamp_and_encrypts_payload() {
		let (store, _) = store();
		let ctx = CallContext::new();
		let before = OffsetDateTime::now_utc();
		let record = store
			.create(&ctx, config_id("google-1"), issuer("https://accounts.google.com"), spec("abc"))
			.await
			.expect("Create should succeed.");

		assert!(record.last_modified >= before);
		assert!(!record.deleted);
		assert!(!record.data.envelope().to_json().contains("top-secret"));

		let fetched = store.get_by_id(&ctx, &record.id).await.expect("Row should be found.");

		assert_eq!(fetched, record);
		assert_eq!(
			fetched.decrypt_spec(store.cipher()).expect("Row should decrypt."),
			spec("abc")
		);
	}

	#[tokio::test]
	async fn invalid_spec_is_rejected_before_writing() {
		let (store, rows) = store();
		let mut invalid = spec("abc");

		invalid.oauth2.client_id.clear();

		let err = store
			.create(&CallContext::new(), config_id("bad"), issuer("https://bad.example"), invalid)
			.await
			.expect_err("Empty client id must be rejected.");

		assert_eq!(err.kind(), ErrorKind::Validation);
		assert!(rows.list_active().await.expect("Listing should succeed.").is_empty());
	}

	#[tokio::test]
	async fn soft_deleted_rows_are_invisible() {
		let (store, rows) = store();
		let ctx = CallContext::new();
		let id = config_id("google-1");

		store
			.create(&ctx, id.clone(), issuer("https://accounts.google.com"), spec("abc"))
			.await
			.expect("Create should succeed.");

		assert!(rows.mark_deleted(&id).await.expect("Soft delete should succeed."));

		let err = store.get_by_id(&ctx, &id).await.expect_err("Deleted row must be hidden.");

		assert!(matches!(err, Error::NotFound(NotFoundError::ConfigId { .. })));
		assert!(store.list_active(&ctx).await.expect("Listing should succeed.").is_empty());

		// The issuer becomes available again once its owner is deleted.
		store
			.create(&ctx, config_id("google-2"), issuer("https://accounts.google.com"), spec("xyz"))
			.await
			.expect("Issuer of a deleted row should be reusable.");
	}

	#[tokio::test]
	async fn uniqueness_violations_are_conflicts() {
		let (store, _) = store();
		let ctx = CallContext::new();

		store
			.create(&ctx, config_id("google-1"), issuer("https://accounts.google.com"), spec("abc"))
			.await
			.expect("Create should succeed.");

		let err = store
			.create(&ctx, config_id("google-1"), issuer("https://other.example"), spec("abc"))
			.await
			.expect_err("Duplicate id must be rejected.");

		assert!(matches!(err, Error::Conflict(ConflictError::DuplicateId { .. })));

		let err = store
			.create(&ctx, config_id("google-2"), issuer("https://accounts.google.com"), spec("abc"))
			.await
			.expect_err("Duplicate issuer must be rejected.");

		assert!(matches!(
			err,
			Error::Conflict(ConflictError::IssuerTaken { ref owner, .. }) if owner.as_str() == "google-1"
		));
	}

	#[tokio::test]
	async fn rows_written_before_rotation_stay_readable() {
		let (store, rows) = store();
		let ctx = CallContext::new();

		store
			.create(&ctx, config_id("google-1"), issuer("https://accounts.google.com"), spec("abc"))
			.await
			.expect("Create should succeed.");

		let v1 = CipherKey::new("default", 1, *TEST_KEY_MATERIAL)
			.expect("Key fixture should be valid.");
		let v2 = CipherKey::new("default", 2, [7; 32]).expect("Key fixture should be valid.");
		let rotated = CipherKeySet::new([v1, v2], ("default", 2)).expect("Key set should build.");
		let rotated = EncryptedConfigStore::new(rows, CipherService::new(rotated));
		let config = rotated
			.load_config(&ctx, &config_id("google-1"))
			.await
			.expect("Old row should decrypt after rotation.");

		assert_eq!(config.oauth2.client_id, "abc");

		let record = rotated
			.create(&ctx, config_id("okta-1"), issuer("https://okta.example"), spec("def"))
			.await
			.expect("Create should succeed.");

		assert_eq!(record.data.envelope().key_metadata.version, 2);
	}
}

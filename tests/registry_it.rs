#![cfg(feature = "reqwest")]

// self
use oidc_federation_broker::{
	_preludet::*,
	auth::{ConfigId, ScopeSet, Secret},
	cipher::{CipherKey, CipherKeySet, CipherService},
	context::CallContext,
	error::{ConflictError, NotFoundError, ValidationError},
	provider::{ClientAuthMethod, ClientConfig, OAuth2Params, OidcSpec, VerifierParams},
	registry::ClientConfigRegistry,
	store::{EncryptedConfigStore, FileStore, MemoryStore},
};

fn url(value: &str) -> Url {
	Url::parse(value).expect("URL fixture should parse.")
}

fn google_spec() -> OidcSpec {
	OidcSpec {
		oauth2: OAuth2Params {
			client_id: "client-id-123".into(),
			client_secret: Secret::new("client-secret-123"),
			authorization_endpoint: url("https://accounts.google.com/o/oauth2/v2/auth"),
			token_endpoint: url("https://oauth2.googleapis.com/token"),
			redirect_uri: url("https://app.example.com/iam/oidc/callback"),
			scopes: ScopeSet::new(["email", "profile"]).expect("Scope fixture should be valid."),
			client_auth_method: ClientAuthMethod::ClientSecretBasic,
			scope_delimiter: ' ',
		},
		verifier: VerifierParams::default(),
	}
}

fn google_config() -> ClientConfig {
	ClientConfig::from_spec(
		config_id("google-1"),
		issuer("https://accounts.google.com"),
		google_spec(),
	)
	.expect("Google config fixture should validate.")
}

#[tokio::test]
async fn resolution_follows_the_issuer_parameter() {
	let (broker, registry) = build_reqwest_test_broker();

	registry.add_client_config(google_config()).expect("Registration should succeed.");

	let err = broker
		.client_config_from_request("/start?word=abc")
		.expect_err("Requests without an issuer must fail.");

	assert!(matches!(
		err,
		Error::Validation(ValidationError::MissingParameter { name: "issuer" })
	));
	assert!(err.is_client_fault());

	let config = broker
		.client_config_from_request("/start?issuer=https%3A%2F%2Faccounts.google.com")
		.expect("Registered issuer should resolve.");

	assert_eq!(config.id.as_str(), "google-1");

	let err = broker
		.client_config_from_request("/start?issuer=https%3A%2F%2Funknown.example")
		.expect_err("Unregistered issuers must fail.");

	assert!(matches!(err, Error::NotFound(_)));
	assert!(err.is_client_fault());

	let err = broker
		.client_config_from_request("/start?issuer=UNKNOWN")
		.expect_err("Unknown issuers must fail.");

	assert!(matches!(
		err,
		Error::NotFound(NotFoundError::Issuer { issuer: ref requested }) if requested == "UNKNOWN"
	));
}

#[tokio::test]
async fn start_leg_produces_fresh_flow_state() {
	let (broker, registry) = build_reqwest_test_broker();
	let config = registry.add_client_config(google_config()).expect("Registration should succeed.");
	let first = broker.start_params(&config);
	let second = broker.start_params(&config);

	assert_ne!(first.state, second.state);
	assert_ne!(first.nonce, second.nonce);
	assert_eq!(first.flow.issuer, config.issuer);
	assert_eq!(first.flow.state, first.state);
	assert_eq!(first.flow.nonce, first.nonce);

	let query: HashMap<_, _> = first.authorization_url.query_pairs().into_owned().collect();

	assert_eq!(query.get("scope").map(String::as_str), Some("email openid profile"));
	assert_eq!(query.get("state"), Some(&first.state));
	assert_eq!(query.get("nonce"), Some(&first.nonce));
}

#[tokio::test]
async fn registry_reloads_from_the_encrypted_store() {
	let ctx = CallContext::new();
	let store = EncryptedConfigStore::new(Arc::new(MemoryStore::default()), test_cipher());
	let (broker, registry) = build_reqwest_test_broker();
	let created = store
		.create(&ctx, config_id("google-1"), issuer("https://accounts.google.com"), google_spec())
		.await
		.expect("Create should succeed.");

	assert!(!created.deleted);

	let err = store
		.create(&ctx, config_id("google-2"), issuer("https://accounts.google.com"), google_spec())
		.await
		.expect_err("Issuer collisions must fail.");

	assert!(matches!(err, Error::Conflict(ConflictError::IssuerTaken { .. })));

	let loaded =
		registry.load_from_store(&ctx, &store).await.expect("Registry load should succeed.");

	assert_eq!(loaded, 1);

	let config = broker
		.client_config_from_request("/start?issuer=https%3A%2F%2Faccounts.google.com")
		.expect("Loaded issuer should resolve.");

	assert_eq!(config.oauth2.client_secret.expose(), "client-secret-123");
	assert_eq!(*config, google_config());
}

#[tokio::test]
async fn rotated_cipher_reads_rows_written_before_rotation() {
	let ctx = CallContext::new();
	let v1 = CipherKey::new("default", 1, *TEST_KEY_MATERIAL).expect("Key v1 should be valid.");
	let v2 = CipherKey::new("default", 2, *b"0123456789abcdef0123456789abcdef")
		.expect("Key v2 should be valid.");
	let keys = CipherKeySet::new([v1, v2], ("default", 1)).expect("Key set should be valid.");
	let backend = Arc::new(MemoryStore::default());
	let before = EncryptedConfigStore::new(backend.clone(), CipherService::new(keys));

	before
		.create(&ctx, config_id("google-1"), issuer("https://accounts.google.com"), google_spec())
		.await
		.expect("Create under v1 should succeed.");

	let after = EncryptedConfigStore::new(
		backend,
		before.cipher().rotate_primary("default", 2).expect("Rotation should succeed."),
	);
	let row = after
		.create(&ctx, config_id("okta-1"), issuer("https://login.okta.example"), google_spec())
		.await
		.expect("Create under v2 should succeed.");

	assert_eq!(row.data.envelope().key_metadata.version, 2);

	let registry = ClientConfigRegistry::new();

	assert_eq!(
		registry.load_from_store(&ctx, &after).await.expect("Registry load should succeed."),
		2
	);
	assert!(registry.get_by_issuer("https://accounts.google.com").is_ok());
	assert!(registry.get_by_issuer("https://login.okta.example").is_ok());
}

#[tokio::test]
async fn file_store_survives_reopen_without_plaintext_secrets() {
	let ctx = CallContext::new();
	let path = std::env::temp_dir()
		.join(format!("oidc-broker-it-{}", ConfigId::random()))
		.join("configs.json");
	let store = EncryptedConfigStore::new(
		Arc::new(FileStore::open(&path).expect("File store should open.")),
		test_cipher(),
	);

	store
		.create(&ctx, config_id("google-1"), issuer("https://accounts.google.com"), google_spec())
		.await
		.expect("Create should succeed.");

	let raw = std::fs::read_to_string(&path).expect("Store file should exist.");

	assert!(!raw.contains("client-secret-123"));

	let reopened = EncryptedConfigStore::new(
		Arc::new(FileStore::open(&path).expect("File store should reopen.")),
		test_cipher(),
	);
	let config = reopened
		.load_config(&ctx, &config_id("google-1"))
		.await
		.expect("Reopened store should decrypt the row.");

	assert_eq!(config, google_config());

	let _ = std::fs::remove_dir_all(path.parent().expect("Store file has a parent."));
}

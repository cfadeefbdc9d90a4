//! Common test utilities for ledger integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{EncodingKey, Header};
use tempfile::TempDir;

use atelier_ledger_core::UserId;
use atelier_ledger_service::auth::UserClaims;
use atelier_ledger_service::{create_router, AppState, ServiceConfig};
use atelier_ledger_store::RocksStore;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
    /// JWT signing secret matching the server's config.
    auth_secret: String,
    /// JWT audience matching the server's config.
    auth_audience: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");

        let service_api_key = "test-service-key".to_string();
        let auth_secret = "test-secret".to_string();
        let auth_audience = "atelier-ledger".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            auth_secret: auth_secret.clone(),
            auth_audience: auth_audience.clone(),
            service_api_key: Some(service_api_key.clone()),
            frontend_url: "http://localhost:3000".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            settlement_sweep_seconds: 60,
            settlement_stale_seconds: 600,
        };

        let state = AppState::new(Arc::new(store), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");
        let test_user_id = UserId::generate();

        Self {
            server,
            _temp_dir: temp_dir,
            test_user_id,
            service_api_key,
            auth_secret,
            auth_audience,
        }
    }

    /// Mint a valid bearer token for the given user.
    pub fn token_for(&self, user_id: &UserId) -> String {
        let claims = UserClaims {
            sub: user_id.to_string(),
            aud: self.auth_audience.clone(),
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.auth_secret.as_bytes()),
        )
        .expect("Failed to mint test token")
    }

    /// Get the authorization header for the default test user.
    pub fn user_auth_header(&self) -> String {
        format!("Bearer {}", self.token_for(&self.test_user_id))
    }

    /// Get a different user's auth header (for testing isolation).
    pub fn other_user_auth_header(&self) -> String {
        let other_user = UserId::generate();
        format!("Bearer {}", self.token_for(&other_user))
    }

    /// Grant credits to a user through the service API.
    pub async fn grant(&self, user_id: &UserId, amount: i64) {
        self.server
            .post("/v1/credits/grant")
            .add_header("x-api-key", self.service_api_key.clone())
            .json(&serde_json::json!({
                "user_id": user_id.to_string(),
                "amount": amount,
                "source": "test"
            }))
            .await
            .assert_status_ok();
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

//! Service configuration.

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to the `RocksDB` data directory (default: "/data/atelier-ledger").
    pub data_dir: String,

    /// HS256 secret for validating user JWTs.
    pub auth_secret: String,

    /// Expected JWT audience (default: "atelier-ledger").
    pub auth_audience: String,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Frontend URL, used to build the top-up link in payment-required
    /// responses.
    pub frontend_url: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// How often the settlement sweeper scans for stale records, in seconds.
    pub settlement_sweep_seconds: u64,

    /// Age after which an open settlement counts as stale, in seconds.
    pub settlement_stale_seconds: i64,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/atelier-ledger".into()),
            auth_secret: std::env::var("AUTH_SECRET").unwrap_or_else(|_| {
                tracing::warn!("AUTH_SECRET not set - using insecure development secret");
                "dev-secret".into()
            }),
            auth_audience: std::env::var("AUTH_AUDIENCE")
                .unwrap_or_else(|_| "atelier-ledger".into()),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            settlement_sweep_seconds: std::env::var("SETTLEMENT_SWEEP_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            settlement_stale_seconds: std::env::var("SETTLEMENT_STALE_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(600),
        }
    }

    /// The URL users are pointed at to top up their balance.
    #[must_use]
    pub fn top_up_url(&self) -> String {
        format!("{}/top-up", self.frontend_url.trim_end_matches('/'))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/atelier-ledger".into(),
            auth_secret: "dev-secret".into(),
            auth_audience: "atelier-ledger".into(),
            service_api_key: None,
            frontend_url: "http://localhost:3000".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            settlement_sweep_seconds: 60,
            settlement_stale_seconds: 600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_up_url_strips_trailing_slash() {
        let config = ServiceConfig {
            frontend_url: "https://atelier.example/".into(),
            ..ServiceConfig::default()
        };
        assert_eq!(config.top_up_url(), "https://atelier.example/top-up");
    }
}

//! Ledger HTTP client implementation.

use reqwest::Client;
use std::time::Duration;

use atelier_ledger_core::Operation;

use crate::error::ClientError;
use crate::types::{
    ApiErrorResponse, CheckRequest, CheckResponse, DeductRequest, DeductResponse, GrantRequest,
    GrantResponse, RefundRequest, RefundResponse,
};

/// Atelier ledger API client.
///
/// Drives the check / deduct / refund protocol against the ledger service
/// on behalf of a generation backend.
#[derive(Debug, Clone)]
pub struct LedgerClient {
    client: Client,
    base_url: String,
    api_key: String,
    service_name: String,
}

/// Options for constructing a [`LedgerClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 10).
    pub timeout_seconds: u64,
    /// Value sent as `X-Service-Name` (default: "unknown").
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            service_name: "unknown".into(),
        }
    }
}

impl LedgerClient {
    /// Create a new ledger client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the ledger service (e.g., `"http://atelier-ledger:8080"`)
    /// * `api_key` - Service API key for authentication
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new ledger client with custom options.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with
    /// default settings).
    #[must_use]
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            service_name: options.service_name,
        }
    }

    /// Advisory credit check before starting paid work.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn check_credits(
        &self,
        user_id: impl Into<String>,
        operation: Operation,
    ) -> Result<CheckResponse, ClientError> {
        let url = format!("{}/v1/credits/check", self.base_url);
        let request = CheckRequest {
            user_id: user_id.into(),
            operation,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Deduct the operation's cost after the paid work succeeded.
    ///
    /// A [`ClientError::InsufficientCredits`] here means the debit lost the
    /// race to concurrent spending; nothing was charged.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn deduct_credits(
        &self,
        request: DeductRequest,
    ) -> Result<DeductResponse, ClientError> {
        let url = format!("{}/v1/credits/deduct", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Refund the operation's cost after a failed delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn refund_credits(
        &self,
        request: RefundRequest,
    ) -> Result<RefundResponse, ClientError> {
        let url = format!("{}/v1/credits/refund", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Add credits to a user's balance (top-up or promotional grant).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn grant_credits(
        &self,
        request: GrantRequest,
    ) -> Result<GrantResponse, ClientError> {
        let url = format!("{}/v1/credits/grant", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse the structured error body
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => {
                let code = api_error.error.code.as_str();
                let message = api_error.error.message.clone();
                let details = api_error.error.details.as_ref();

                match code {
                    "insufficient_credits" => {
                        let field = |name: &str| {
                            details
                                .and_then(|d| d.get(name))
                                .and_then(serde_json::Value::as_i64)
                                .unwrap_or(0)
                        };
                        Err(ClientError::InsufficientCredits {
                            current: field("current"),
                            required: field("required"),
                            deficit: field("deficit"),
                            top_up_url: details
                                .and_then(|d| d.get("top_up_url"))
                                .and_then(serde_json::Value::as_str)
                                .map(ToString::to_string),
                        })
                    }
                    "duplicate_attempt" => Err(ClientError::DuplicateAttempt {
                        attempt_id: message,
                    }),
                    _ => Err(ClientError::Api {
                        code: code.to_string(),
                        message,
                        status: status.as_u16(),
                    }),
                }
            }
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

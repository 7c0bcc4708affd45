//! HTTP client for the remote password service.
//!
//! The service issues a session token on registration, hands out encrypted
//! passwords one request at a time and accepts decrypted results for
//! validation. [`RemoteService`] is the seam the pipeline depends on;
//! [`HttpApiClient`] is the JSON-over-HTTP implementation used by the binary.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::{PasswordRequest, PasswordResponse, Register, RegisterResponse, Validate};
use crate::error::ApiError;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Operations the pipeline needs from the remote service.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Register an identity and obtain a session token.
    async fn register(&self, request: Register) -> Result<RegisterResponse, ApiError>;

    /// Fetch the next encrypted password for the session.
    async fn request_password(&self, request: PasswordRequest)
        -> Result<PasswordResponse, ApiError>;

    /// Submit a decrypted password. Any success status is an acknowledgement.
    async fn validate(&self, request: Validate) -> Result<(), ApiError>;
}

/// Client for the password service's JSON API.
pub struct HttpApiClient {
    /// Base URL for the API, without a trailing slash.
    api_base: String,
    /// HTTP client for making API requests.
    http_client: Client,
}

impl HttpApiClient {
    /// Create a client for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ClientBuild` if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::ClientBuild(e.to_string()))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response, ApiError> {
        let url = self.endpoint(path);

        let http_response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;

        let status = http_response.status();
        if status.is_success() {
            return Ok(http_response);
        }

        let error_text = http_response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());

        Err(status_error(status.as_u16(), &error_text))
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        self.post(path, body)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::ParseError(e.to_string()))
    }
}

/// Error response from the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Map a non-success reply to an [`ApiError`], preferring the structured
/// message when the body carries one.
fn status_error(code: u16, body: &str) -> ApiError {
    let message = match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.to_string(),
    };
    ApiError::Status { code, message }
}

#[async_trait]
impl RemoteService for HttpApiClient {
    async fn register(&self, request: Register) -> Result<RegisterResponse, ApiError> {
        self.post_json("register", &request).await
    }

    async fn request_password(
        &self,
        request: PasswordRequest,
    ) -> Result<PasswordResponse, ApiError> {
        self.post_json("password", &request).await
    }

    async fn validate(&self, request: Validate) -> Result<(), ApiError> {
        self.post("validate", &request).await.map(|_| ())
    }
}

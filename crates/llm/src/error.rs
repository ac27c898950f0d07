//! Provider-level failures and their retry classification

use thiserror::Error;

/// Failure categories surfaced by every provider adapter
///
/// The gateway retries transient failures and fails over on everything else;
/// these never reach callers except as the diagnostic text of
/// `StudyMintError::ProviderUnavailable`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Rate limit exceeded (429)
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Connection, DNS or timeout failure
    #[error("Network error: {0}")]
    Network(String),

    /// Transient server error (5xx, 408)
    #[error("Server error: {0}")]
    ServerError(String),

    /// Credential rejected (401/403)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Request rejected as malformed (400/404/422)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Response body could not be used
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Provider name is not one of the supported kinds
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Required setting (usually the credential) is missing
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// Anything else
    #[error("Unexpected provider error: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Whether another attempt on the same provider may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited(_) | ProviderError::Network(_) | ProviderError::ServerError(_)
        )
    }

    /// Create from HTTP status code and body
    pub fn from_http_status(status: u16, body: &str) -> Self {
        let body = body.trim().to_string();
        match status {
            401 | 403 => ProviderError::Authentication(body),
            429 => ProviderError::RateLimited(body),
            408 | 500..=599 => ProviderError::ServerError(format!("HTTP {}: {}", status, body)),
            400 | 404 | 422 => ProviderError::InvalidRequest(format!("HTTP {}: {}", status, body)),
            _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            ProviderError::Network(err.to_string())
        } else if err.is_decode() || err.is_body() {
            ProviderError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::from_http_status(status.as_u16(), &err.to_string())
        } else {
            ProviderError::Unknown(err.to_string())
        }
    }
}

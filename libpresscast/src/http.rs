//! Shared HTTP plumbing for the platform clients
//!
//! One `reqwest` client configuration, and one mapping from HTTP status to
//! [`PlatformError`] that every client falls back to after its own
//! platform-specific checks.

use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{PlatformError, Result};

pub const USER_AGENT: &str = concat!("presscast/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest upstream error body kept in a message
const MAX_BODY_CHARS: usize = 300;

pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)).into())
}

/// Map a transport-level failure (no HTTP response) to a platform error
pub fn transport_error(platform: &str, err: reqwest::Error) -> PlatformError {
    if err.is_timeout() {
        PlatformError::Network(format!("{}: request timed out", platform))
    } else if err.is_connect() {
        PlatformError::Network(format!("{}: connection failed: {}", platform, err))
    } else if err.is_decode() {
        PlatformError::Posting(format!("{}: unreadable response: {}", platform, err))
    } else {
        PlatformError::Network(format!("{}: {}", platform, err))
    }
}

/// A non-success HTTP response, read into memory
#[derive(Debug, Clone)]
pub struct HttpFailure {
    pub status: u16,
    pub retry_after: Option<u64>,
    pub body: String,
}

impl HttpFailure {
    pub async fn read(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        Self {
            status,
            retry_after,
            body,
        }
    }

    /// The body parsed as JSON, if it is JSON
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }

    /// A short human-readable description of the failure
    pub fn summary(&self) -> String {
        let detail = self
            .json()
            .and_then(|value| extract_message(&value))
            .unwrap_or_else(|| self.body.trim().to_string());

        let detail: String = detail.chars().take(MAX_BODY_CHARS).collect();
        if detail.is_empty() {
            format!("HTTP {}", self.status)
        } else {
            format!("HTTP {}: {}", self.status, detail)
        }
    }

    /// Generic status mapping shared by every platform
    pub fn into_error(self, platform: &str) -> PlatformError {
        let message = format!("{}: {}", platform, self.summary());
        match self.status {
            401 | 403 => PlatformError::Authentication(message),
            429 => match self.retry_after {
                Some(secs) => PlatformError::RateLimit(format!("{} (retry after {}s)", message, secs)),
                None => PlatformError::RateLimit(message),
            },
            400 | 413 | 422 => PlatformError::Validation(message),
            500..=599 => PlatformError::Network(message),
            _ => PlatformError::Posting(message),
        }
    }
}

/// Pull the most useful message out of the error shapes the networks return
fn extract_message(value: &serde_json::Value) -> Option<String> {
    let candidates = [
        value.pointer("/error/message"),
        value.pointer("/errors/0/message"),
        value.pointer("/detail"),
        value.pointer("/message"),
        value.pointer("/error_description"),
        value.pointer("/title"),
        value.pointer("/error"),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string))
}

/// Return the response when it succeeded, or the generic mapping of its failure
pub async fn check(platform: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(HttpFailure::read(response).await.into_error(platform).into())
    }
}

/// Decode a successful response body as JSON
pub async fn read_json<T: DeserializeOwned>(platform: &str, response: reqwest::Response) -> Result<T> {
    response.json::<T>().await.map_err(|e| {
        PlatformError::Posting(format!("{}: unexpected response body: {}", platform, e)).into()
    })
}

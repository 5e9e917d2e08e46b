//! Error classification and recovery planning
//!
//! Every failed share is sorted into an [`ErrorCategory`] and handed to a
//! [`RecoveryPolicy`], which decides whether a one-shot retry job is worth
//! scheduling. Retries are best-effort: a failed retry is classified again
//! with a higher attempt number until the policy gives up.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CredentialError, PlatformError, PresscastError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Auth,
    RateLimit,
    Network,
    Content,
    Generic,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Auth => "auth",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Network => "network",
            ErrorCategory::Content => "content",
            ErrorCategory::Generic => "generic",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do about a failed share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry { delay_secs: u64 },
    /// Credentials must be renewed by a human; retrying would fail the same way
    Reauthenticate,
    Abandon { reason: String },
}

impl RecoveryAction {
    pub fn delay(&self) -> Option<Duration> {
        match self {
            RecoveryAction::Retry { delay_secs } => Some(Duration::from_secs(*delay_secs)),
            _ => None,
        }
    }
}

/// Classify a typed error, falling back to its message
pub fn classify(error: &PresscastError) -> ErrorCategory {
    match error {
        PresscastError::Platform(platform) => match platform {
            PlatformError::Authentication(_) => ErrorCategory::Auth,
            PlatformError::RateLimit(_) => ErrorCategory::RateLimit,
            PlatformError::Network(_) => ErrorCategory::Network,
            PlatformError::Validation(_) => ErrorCategory::Content,
            PlatformError::Posting(msg) | PlatformError::NotImplemented(msg) => {
                classify_message(msg)
            }
        },
        PresscastError::Credential(CredentialError::NotFound(_))
        | PresscastError::Credential(CredentialError::StateMismatch) => ErrorCategory::Auth,
        PresscastError::InvalidInput(_) => ErrorCategory::Content,
        other => classify_message(&other.to_string()),
    }
}

const RATE_LIMIT_PATTERNS: &[&str] = &["429", "rate limit", "too many requests", "quota"];

const AUTH_PATTERNS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "invalid token",
    "expired",
    "authentication",
    "credentials",
];

const NETWORK_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "dns",
    "network",
    "502",
    "503",
    "504",
    "unreachable",
];

const CONTENT_PATTERNS: &[&str] = &[
    "duplicate",
    "too long",
    "character limit",
    "invalid record",
    "content",
    "validation",
];

/// Classify a free-form upstream error message
///
/// Rate limits are checked first: X reports some of them as a 403.
pub fn classify_message(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if matches(RATE_LIMIT_PATTERNS) {
        ErrorCategory::RateLimit
    } else if matches(AUTH_PATTERNS) {
        ErrorCategory::Auth
    } else if matches(NETWORK_PATTERNS) {
        ErrorCategory::Network
    } else if matches(CONTENT_PATTERNS) {
        ErrorCategory::Content
    } else {
        ErrorCategory::Generic
    }
}

static RETRY_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(retry after (\d+)s\)").expect("static regex"));

/// Extract the `(retry after Ns)` hint the HTTP layer embeds in messages
pub fn retry_after(message: &str) -> Option<Duration> {
    RETRY_AFTER
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Retry strategy per error category
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryPolicy {
    pub max_attempts: u32,
    pub network_base_delay: Duration,
    pub rate_limit_delay: Duration,
    pub generic_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            network_base_delay: Duration::from_secs(5 * 60),
            rate_limit_delay: Duration::from_secs(15 * 60),
            generic_delay: Duration::from_secs(30 * 60),
            max_delay: Duration::from_secs(6 * 60 * 60),
        }
    }
}

impl RecoveryPolicy {
    /// Decide what to do after `attempt` (1-based) failed with `category`
    pub fn plan(
        &self,
        category: ErrorCategory,
        attempt: u32,
        retry_after: Option<Duration>,
    ) -> RecoveryAction {
        match category {
            ErrorCategory::Auth => return RecoveryAction::Reauthenticate,
            ErrorCategory::Content => {
                return RecoveryAction::Abandon {
                    reason: "content was rejected; editing the post is required".to_string(),
                }
            }
            _ => {}
        }

        if attempt >= self.max_attempts {
            return RecoveryAction::Abandon {
                reason: format!("gave up after {} attempts", attempt),
            };
        }

        let delay = match category {
            ErrorCategory::RateLimit => retry_after.unwrap_or(self.rate_limit_delay),
            ErrorCategory::Network => {
                let exponent = attempt.saturating_sub(1).min(16);
                self.network_base_delay.saturating_mul(1u32 << exponent)
            }
            ErrorCategory::Generic if attempt <= 1 => self.generic_delay,
            _ => {
                return RecoveryAction::Abandon {
                    reason: format!("{} error is not retried again", category),
                }
            }
        };

        RecoveryAction::Retry {
            delay_secs: delay.min(self.max_delay).as_secs(),
        }
    }

    /// Classify `error` and plan its recovery in one step
    pub fn plan_for(&self, error: &PresscastError, attempt: u32) -> (ErrorCategory, RecoveryAction) {
        let category = classify(error);
        let action = self.plan(category, attempt, retry_after(&error.to_string()));
        (category, action)
    }
}

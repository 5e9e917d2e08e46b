//! Presscast - share blog posts to social networks
//!
//! This library holds everything the `press-*` tools share: the credential
//! store, OAuth flows, per-network formatting, the platform clients, failure
//! classification with one-shot delayed retries, the publish orchestrators
//! and the share log with its engagement metrics.

pub mod analytics;
pub mod config;
pub mod credentials;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod formatter;
pub mod http;
pub mod logging;
pub mod oauth;
pub mod platforms;
pub mod rate_limiter;
pub mod recovery;
pub mod scheduling;
pub mod service;
pub mod types;
pub mod wordpress;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{CredentialConfig, CredentialManager, StorageBackend};
pub use db::Database;
pub use error::{PresscastError, Result};
pub use recovery::{ErrorCategory, RecoveryAction};
pub use types::{Job, JobKind, JobStatus, PlatformKind, ShareOutcome, ShareRecord, SourcePost};

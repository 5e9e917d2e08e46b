//! Platform abstraction and implementations
//!
//! This module provides a unified trait for publishing to the supported social
//! networks. Each implementation handles its own authentication scheme and
//! request shape, and normalizes results into [`PublishedPost`] or a typed
//! [`PlatformError`].
//!
//! # Examples
//!
//! ```no_run
//! use libpresscast::platforms::{Platform, bluesky::BlueskyClient};
//! use libpresscast::credentials::BlueskyCredentials;
//! use libpresscast::formatter::Formatter;
//! use libpresscast::types::{PlatformKind, SourcePost};
//!
//! # async fn example(creds: BlueskyCredentials) -> libpresscast::error::Result<()> {
//! let mut platform = BlueskyClient::new(creds, None)?;
//! platform.authenticate().await?;
//!
//! let post = SourcePost::new(1, "Hello", "https://blog.example/hello");
//! let formatted = Formatter::new().format(&post, PlatformKind::Bluesky)?;
//! platform.validate_content(&formatted)?;
//! let published = platform.publish(&formatted).await?;
//! println!("Posted: {:?}", published.url);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::config::Config;
use crate::credentials::{
    BlueskyCredentials, CredentialManager, FacebookCredentials, LinkedInCredentials, XCredentials,
};
use crate::error::{PlatformError, PresscastError, Result};
use crate::formatter;
use crate::types::{FormattedPost, PlatformKind, PublishedPost};

pub mod bluesky;
pub mod facebook;
pub mod linkedin;
pub mod x;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Platform trait for unified social network interactions
///
/// Implementations are created unauthenticated; [`Platform::authenticate`]
/// must succeed before [`Platform::publish`] is called.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Authenticate with the platform
    ///
    /// Establishes a session or verifies the stored token, and discovers any
    /// account details publishing needs (X username, LinkedIn author URN,
    /// Bluesky DID).
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` when the credentials are
    /// rejected, or `PlatformError::Network` when the API cannot be reached.
    async fn authenticate(&mut self) -> Result<()>;

    /// Publish formatted content and return the remote identifier
    ///
    /// # Errors
    ///
    /// - `PlatformError::Authentication` if not authenticated or the token was revoked
    /// - `PlatformError::Validation` if the network rejected the content
    /// - `PlatformError::RateLimit` if the network throttled the request
    /// - `PlatformError::Network` for timeouts and 5xx responses
    /// - `PlatformError::Posting` for anything else
    async fn publish(&self, post: &FormattedPost) -> Result<PublishedPost>;

    /// Validate content before publishing
    ///
    /// The default implementation rejects empty text and text longer than
    /// [`Platform::character_limit`], measured the way the network counts.
    fn validate_content(&self, post: &FormattedPost) -> Result<()> {
        if post.text.trim().is_empty() {
            return Err(PlatformError::Validation("Content cannot be empty".to_string()).into());
        }

        if let Some(limit) = self.character_limit() {
            let length = formatter::measure(self.kind(), &post.text);
            if length > limit {
                return Err(PlatformError::Validation(format!(
                    "{} content exceeds {} character limit (got {} characters)",
                    self.name(),
                    limit,
                    length
                ))
                .into());
            }
        }

        Ok(())
    }

    fn kind(&self) -> PlatformKind;

    /// Human-facing platform name, e.g. "LinkedIn"
    fn name(&self) -> &str;

    /// Maximum post length, or `None` when the network has no practical limit
    fn character_limit(&self) -> Option<usize> {
        Some(formatter::character_limit(self.kind()))
    }

    /// Whether the client has everything it needs to authenticate
    fn is_configured(&self) -> bool;
}

/// Clients ready to publish, plus the platforms that could not be prepared
#[derive(Default)]
pub struct PlatformSet {
    pub ready: Vec<Box<dyn Platform>>,
    pub unavailable: Vec<(PlatformKind, PresscastError)>,
}

impl PlatformSet {
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.unavailable.is_empty()
    }
}

/// Build an unauthenticated client for one platform from stored credentials
pub fn build_platform(
    kind: PlatformKind,
    config: &Config,
    credentials: &CredentialManager,
) -> Result<Box<dyn Platform>> {
    let settings = config.platform(kind).cloned().unwrap_or_default();

    let platform: Box<dyn Platform> = match kind {
        PlatformKind::X => Box::new(x::XClient::new(
            XCredentials::load(credentials)?,
            settings.api_base,
        )?),
        PlatformKind::LinkedIn => Box::new(linkedin::LinkedInClient::new(
            LinkedInCredentials::load(credentials)?,
            settings.api_base,
        )?),
        PlatformKind::Bluesky => Box::new(bluesky::BlueskyClient::new(
            BlueskyCredentials::load(credentials)?,
            settings.api_base,
        )?),
        PlatformKind::Facebook => Box::new(facebook::FacebookClient::new(
            FacebookCredentials::load_for_page(credentials, settings.page_id.as_deref())?,
            settings.api_base,
        )?),
    };

    Ok(platform)
}

/// Create and authenticate clients for the requested platforms
///
/// Platforms that are disabled in configuration are left out entirely. A
/// platform whose credentials are missing or whose authentication fails is
/// reported in [`PlatformSet::unavailable`] without affecting the others.
pub async fn create_platforms(
    config: &Config,
    credentials: &CredentialManager,
    targets: &[PlatformKind],
) -> PlatformSet {
    let mut set = PlatformSet::default();

    for kind in targets {
        if !config.is_enabled(*kind) {
            tracing::debug!("Skipping {}: not enabled in configuration", kind);
            continue;
        }

        tracing::info!("Creating {} platform client", kind.display_name());
        let mut platform = match build_platform(*kind, config, credentials) {
            Ok(platform) => platform,
            Err(e) => {
                tracing::warn!("{} is unavailable: {}", kind.display_name(), e);
                set.unavailable.push((*kind, e));
                continue;
            }
        };

        match platform.authenticate().await {
            Ok(()) => set.ready.push(platform),
            Err(e) => {
                tracing::warn!("{} authentication failed: {}", kind.display_name(), e);
                set.unavailable.push((*kind, e));
            }
        }
    }

    set
}

/// Source of connected platform clients
///
/// The dispatcher asks for clients on every run so that refreshed tokens are
/// picked up; tests substitute mock platforms here.
#[async_trait]
pub trait PlatformSource: Send + Sync {
    async fn connect(&self, targets: &[PlatformKind]) -> PlatformSet;
}

/// Real clients built from configuration and the credential store
pub struct LivePlatforms {
    config: Config,
    credentials: std::sync::Arc<CredentialManager>,
}

impl LivePlatforms {
    pub fn new(config: Config, credentials: std::sync::Arc<CredentialManager>) -> Self {
        Self {
            config,
            credentials,
        }
    }
}

#[async_trait]
impl PlatformSource for LivePlatforms {
    async fn connect(&self, targets: &[PlatformKind]) -> PlatformSet {
        create_platforms(&self.config, &self.credentials, targets).await
    }
}

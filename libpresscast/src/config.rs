//! Configuration management for Presscast
//!
//! Configuration lives in a single TOML file, by default
//! `~/.config/presscast/config.toml`. Every section is optional; a missing
//! file yields the defaults.
//!
//! ```toml
//! [database]
//! path = "~/.local/share/presscast/presscast.db"
//!
//! [publishing]
//! auto_share = true
//! post_types = ["post"]
//! delay = "5m"
//!
//! [x]
//! template = "{title} {url} {hashtags}"
//! posts_per_hour = 50
//!
//! [bluesky]
//! api_base = "https://bsky.social"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::credentials::CredentialConfig;
use crate::error::{ConfigError, Result};
use crate::recovery::RecoveryPolicy;
use crate::types::PlatformKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
    #[serde(default)]
    pub wordpress: Option<WordPressConfig>,
    #[serde(default)]
    pub publishing: PublishingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub x: Option<PlatformConfig>,
    #[serde(default)]
    pub linkedin: Option<PlatformConfig>,
    #[serde(default)]
    pub bluesky: Option<PlatformConfig>,
    #[serde(default)]
    pub facebook: Option<PlatformConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/presscast/presscast.db".to_string(),
        }
    }
}

/// Where to fetch posts from when only an id is given
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordPressConfig {
    pub site_url: String,
    /// Username for application-password auth; the password itself lives in
    /// the credential store under `presscast.wordpress/app_password`
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingConfig {
    /// Share automatically when a post transitions to `publish`
    #[serde(default = "default_true")]
    pub auto_share: bool,
    #[serde(default = "default_post_types")]
    pub post_types: Vec<String>,
    /// Default targets; empty means every enabled platform
    #[serde(default)]
    pub platforms: Vec<String>,
    /// Delay between the publish event and the share (humantime, e.g. "10m")
    #[serde(default = "default_zero")]
    pub delay: String,
    /// Spacing between posts in a bulk run
    #[serde(default = "default_zero")]
    pub bulk_stagger: String,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            auto_share: true,
            post_types: default_post_types(),
            platforms: Vec::new(),
            delay: default_zero(),
            bulk_stagger: default_zero(),
        }
    }
}

impl PublishingConfig {
    pub fn delay(&self) -> Result<Duration> {
        parse_config_duration("publishing.delay", &self.delay)
    }

    pub fn bulk_stagger(&self) -> Result<Duration> {
        parse_config_duration("publishing.bulk_stagger", &self.bulk_stagger)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_network_delay")]
    pub network_base_delay: String,
    #[serde(default = "default_rate_limit_delay")]
    pub rate_limit_delay: String,
    #[serde(default = "default_generic_delay")]
    pub generic_delay: String,
    #[serde(default = "default_max_delay")]
    pub max_delay: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            network_base_delay: default_network_delay(),
            rate_limit_delay: default_rate_limit_delay(),
            generic_delay: default_generic_delay(),
            max_delay: default_max_delay(),
        }
    }
}

impl RetryConfig {
    /// Build the recovery policy these settings describe
    pub fn policy(&self) -> Result<RecoveryPolicy> {
        Ok(RecoveryPolicy {
            max_attempts: self.max_attempts,
            network_base_delay: parse_config_duration(
                "retry.network_base_delay",
                &self.network_base_delay,
            )?,
            rate_limit_delay: parse_config_duration("retry.rate_limit_delay", &self.rate_limit_delay)?,
            generic_delay: parse_config_duration("retry.generic_delay", &self.generic_delay)?,
            max_delay: parse_config_duration("retry.max_delay", &self.max_delay)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How often the daemon refreshes engagement metrics
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    /// Records whose metrics are older than this are refreshed
    #[serde(default = "default_stale_after")]
    pub stale_after: String,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: default_poll_interval(),
            stale_after: default_stale_after(),
        }
    }
}

impl AnalyticsConfig {
    pub fn poll_interval(&self) -> Result<Duration> {
        parse_config_duration("analytics.poll_interval", &self.poll_interval)
    }

    pub fn stale_after(&self) -> Result<Duration> {
        parse_config_duration("analytics.stale_after", &self.stale_after)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between job queue polls
    #[serde(default = "default_daemon_poll")]
    pub poll_interval: u64,
    /// Maximum jobs claimed per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_daemon_poll(),
            batch_size: default_batch_size(),
        }
    }
}

/// Per-platform settings, shared by all four networks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Text template with `{title}`, `{excerpt}`, `{url}`, `{hashtags}`,
    /// `{author}` and `{categories}` placeholders
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub max_hashtags: Option<usize>,
    /// Override for the REST API base URL (PDS for Bluesky, Graph for Facebook)
    #[serde(default)]
    pub api_base: Option<String>,
    /// Override for the OAuth endpoints base URL
    #[serde(default)]
    pub auth_base: Option<String>,
    /// Local posts-per-hour cap
    #[serde(default)]
    pub posts_per_hour: Option<u32>,
    /// OAuth client id (the secret lives in the credential store)
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Facebook page to publish to
    #[serde(default)]
    pub page_id: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            template: None,
            max_hashtags: None,
            api_base: None,
            auth_base: None,
            posts_per_hour: None,
            client_id: None,
            redirect_uri: None,
            scopes: Vec::new(),
            page_id: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_post_types() -> Vec<String> {
    vec!["post".to_string()]
}

fn default_zero() -> String {
    "0s".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_network_delay() -> String {
    "5m".to_string()
}

fn default_rate_limit_delay() -> String {
    "15m".to_string()
}

fn default_generic_delay() -> String {
    "30m".to_string()
}

fn default_max_delay() -> String {
    "6h".to_string()
}

fn default_poll_interval() -> String {
    "1h".to_string()
}

fn default_stale_after() -> String {
    "6h".to_string()
}

fn default_daemon_poll() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    20
}

/// Parse a humantime duration from a config field, naming the field on error
pub fn parse_config_duration(field: &str, value: &str) -> Result<Duration> {
    let trimmed = value.trim();
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(trimmed).map_err(|e| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("'{}' is not a duration ({})", value, e),
        }
        .into()
    })
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file is not an error: defaults are returned.
    /// `PRESSCAST_DB_PATH` overrides the database path.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        if let Ok(db_path) = std::env::var("PRESSCAST_DB_PATH") {
            if !db_path.is_empty() {
                config.database.path = db_path;
            }
        }

        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Settings for one platform, if its section is present
    pub fn platform(&self, kind: PlatformKind) -> Option<&PlatformConfig> {
        match kind {
            PlatformKind::X => self.x.as_ref(),
            PlatformKind::LinkedIn => self.linkedin.as_ref(),
            PlatformKind::Bluesky => self.bluesky.as_ref(),
            PlatformKind::Facebook => self.facebook.as_ref(),
        }
    }

    pub fn is_enabled(&self, kind: PlatformKind) -> bool {
        self.platform(kind).map(|p| p.enabled).unwrap_or(false)
    }

    /// Platforms with a section present and `enabled = true`
    pub fn enabled_platforms(&self) -> Vec<PlatformKind> {
        PlatformKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }

    /// Targets used when a caller does not name any platform
    pub fn default_targets(&self) -> Vec<PlatformKind> {
        let enabled = self.enabled_platforms();
        if self.publishing.platforms.is_empty() {
            return enabled;
        }

        self.publishing
            .platforms
            .iter()
            .filter_map(|name| name.parse::<PlatformKind>().ok())
            .filter(|kind| enabled.contains(kind))
            .collect()
    }

    /// Check cross-field rules that serde cannot express
    pub fn validate(&self) -> Result<()> {
        for name in &self.publishing.platforms {
            name.parse::<PlatformKind>().map_err(|_| ConfigError::InvalidValue {
                field: "publishing.platforms".to_string(),
                reason: format!("unknown platform '{}'", name),
            })?;
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }

        self.publishing.delay()?;
        self.publishing.bulk_stagger()?;
        self.retry.policy()?;
        self.analytics.poll_interval()?;
        self.analytics.stale_after()?;

        // Facebook sends the URL as a separate link field, so its template may omit it
        for kind in [PlatformKind::X, PlatformKind::LinkedIn, PlatformKind::Bluesky] {
            if let Some(template) = self.platform(kind).and_then(|p| p.template.as_ref()) {
                if !template.contains("{url}") {
                    return Err(ConfigError::InvalidValue {
                        field: format!("{}.template", kind),
                        reason: "must contain {url}".to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("PRESSCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("presscast").join("config.toml"))
}

//! Mock platform implementation for testing
//!
//! This module provides a configurable mock platform that can simulate various
//! behaviors including successes, typed failures, transient failures and
//! delays. It's designed for use in integration tests to verify dispatch,
//! recovery and orchestration logic without requiring actual platform
//! credentials or network access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::formatter;
use crate::platforms::{Platform, PlatformSet, PlatformSource};
use crate::types::{FormattedPost, PlatformKind, PublishedPost};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Configuration for mock platform behavior
///
/// Counters and the published list are shared between clones, so a
/// [`MockPlatforms`] source that builds a fresh client per run still reports
/// totals across runs.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Which network this mock stands in for
    pub kind: PlatformKind,

    /// Whether authentication should succeed
    pub auth_succeeds: bool,

    /// Error to return on authentication failure
    pub auth_error: Option<String>,

    /// Error to return from publish; `None` means publishing succeeds
    pub post_error: Option<PlatformError>,

    /// Only the first N publishes fail with `post_error`; `None` means all do
    pub fail_times: Option<usize>,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Character limit override; defaults to the network's real limit
    pub character_limit: Option<usize>,

    /// Whether the platform is configured
    pub is_configured: bool,

    /// Number of times authenticate has been called
    pub auth_call_count: Arc<Mutex<usize>>,

    /// Number of times publish has been called
    pub post_call_count: Arc<Mutex<usize>>,

    /// Posts that have been published (for verification)
    pub published: Arc<Mutex<Vec<FormattedPost>>>,
}

impl MockConfig {
    pub fn new(kind: PlatformKind) -> Self {
        Self {
            kind,
            auth_succeeds: true,
            auth_error: None,
            post_error: None,
            fail_times: None,
            delay: Duration::from_millis(0),
            character_limit: None,
            is_configured: true,
            auth_call_count: Arc::new(Mutex::new(0)),
            post_call_count: Arc::new(Mutex::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn auth_calls(&self) -> usize {
        *lock(&self.auth_call_count)
    }

    pub fn post_calls(&self) -> usize {
        *lock(&self.post_call_count)
    }

    pub fn published(&self) -> Vec<FormattedPost> {
        lock(&self.published).clone()
    }
}

/// Mock platform for testing
pub struct MockPlatform {
    config: MockConfig,
    authenticated: bool,
}

impl MockPlatform {
    /// Create a new mock platform with the given configuration
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            authenticated: false,
        }
    }

    /// Create a mock platform that always succeeds
    pub fn success(kind: PlatformKind) -> Self {
        Self::new(MockConfig::new(kind))
    }

    /// Create a mock platform that fails authentication
    pub fn auth_failure(kind: PlatformKind, error: &str) -> Self {
        Self::new(MockConfig {
            auth_succeeds: false,
            auth_error: Some(error.to_string()),
            ..MockConfig::new(kind)
        })
    }

    /// Create a mock platform whose publishes always fail with `error`
    pub fn post_failure(kind: PlatformKind, error: PlatformError) -> Self {
        Self::new(MockConfig {
            post_error: Some(error),
            ..MockConfig::new(kind)
        })
    }

    /// Create a mock platform that fails `times` publishes, then succeeds
    pub fn flaky(kind: PlatformKind, error: PlatformError, times: usize) -> Self {
        Self::new(MockConfig {
            post_error: Some(error),
            fail_times: Some(times),
            ..MockConfig::new(kind)
        })
    }

    /// Create a mock platform with a delay
    pub fn with_delay(kind: PlatformKind, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(kind)
        })
    }

    /// Create a mock platform with a character limit
    pub fn with_limit(kind: PlatformKind, limit: usize) -> Self {
        Self::new(MockConfig {
            character_limit: Some(limit),
            ..MockConfig::new(kind)
        })
    }

    /// Create a mock platform that is not configured
    pub fn not_configured(kind: PlatformKind) -> Self {
        Self::new(MockConfig {
            is_configured: false,
            ..MockConfig::new(kind)
        })
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    /// Get the number of times authenticate was called
    pub fn auth_call_count(&self) -> usize {
        self.config.auth_calls()
    }

    /// Get the number of times publish was called
    pub fn post_call_count(&self) -> usize {
        self.config.post_calls()
    }

    /// Get all posts that were published
    pub fn published(&self) -> Vec<FormattedPost> {
        self.config.published()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn authenticate(&mut self) -> Result<()> {
        *lock(&self.config.auth_call_count) += 1;

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if self.config.auth_succeeds {
            self.authenticated = true;
            Ok(())
        } else {
            let error_msg = self
                .config
                .auth_error
                .clone()
                .unwrap_or_else(|| "Mock authentication failed".to_string());
            Err(PlatformError::Authentication(error_msg).into())
        }
    }

    async fn publish(&self, post: &FormattedPost) -> Result<PublishedPost> {
        let call = {
            let mut count = lock(&self.config.post_call_count);
            *count += 1;
            *count
        };

        if !self.authenticated {
            return Err(PlatformError::Authentication("Not authenticated".to_string()).into());
        }

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if let Some(error) = &self.config.post_error {
            let failing = self.config.fail_times.map_or(true, |times| call <= times);
            if failing {
                return Err(error.clone().into());
            }
        }

        lock(&self.config.published).push(post.clone());

        let remote_id = format!("{}-mock-{}", self.config.kind, uuid::Uuid::new_v4());
        Ok(PublishedPost {
            url: Some(format!("https://mock.invalid/{}", remote_id)),
            remote_id,
        })
    }

    fn kind(&self) -> PlatformKind {
        self.config.kind
    }

    fn name(&self) -> &str {
        self.config.kind.display_name()
    }

    fn character_limit(&self) -> Option<usize> {
        self.config
            .character_limit
            .or_else(|| Some(formatter::character_limit(self.config.kind)))
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured
    }
}

/// Platform source handing out mock clients
///
/// Each `connect` builds fresh clients from the stored configs and
/// authenticates them, the way live clients are prepared.
#[derive(Debug, Clone, Default)]
pub struct MockPlatforms {
    configs: Vec<MockConfig>,
    connect_calls: Arc<Mutex<usize>>,
}

impl MockPlatforms {
    pub fn new(configs: Vec<MockConfig>) -> Self {
        Self {
            configs,
            connect_calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Every network succeeding
    pub fn all_succeeding() -> Self {
        Self::new(PlatformKind::ALL.iter().map(|k| MockConfig::new(*k)).collect())
    }

    pub fn config(&self, kind: PlatformKind) -> Option<&MockConfig> {
        self.configs.iter().find(|c| c.kind == kind)
    }

    pub fn connect_calls(&self) -> usize {
        *lock(&self.connect_calls)
    }
}

#[async_trait]
impl PlatformSource for MockPlatforms {
    async fn connect(&self, targets: &[PlatformKind]) -> PlatformSet {
        *lock(&self.connect_calls) += 1;

        let mut set = PlatformSet::default();
        for kind in targets {
            let Some(config) = self.config(*kind) else {
                set.unavailable.push((
                    *kind,
                    PlatformError::Authentication(format!("{} is not configured", kind)).into(),
                ));
                continue;
            };

            let mut platform = MockPlatform::new(config.clone());
            match platform.authenticate().await {
                Ok(()) => set.ready.push(Box::new(platform)),
                Err(e) => set.unavailable.push((*kind, e)),
            }
        }
        set
    }
}

//! Multi-platform share dispatch
//!
//! This module sends one post to several networks concurrently. Each
//! outcome is recorded in the share log, classified, and given a recovery
//! plan. Retries never happen inline: a retryable failure becomes a one-shot
//! retry job for that single platform.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

use crate::analytics::Analytics;
use crate::config::Config;
use crate::db::Database;
use crate::error::{PresscastError, Result};
use crate::formatter::Formatter;
use crate::platforms::{Platform, PlatformSource};
use crate::rate_limiter::RateLimiter;
use crate::recovery::{RecoveryAction, RecoveryPolicy};
use crate::scheduling::Scheduler;
use crate::service::events::{Event, EventBus};
use crate::types::{PlatformKind, PublishedPost, ShareOutcome, SourcePost};

/// Sends posts to platforms and applies the recovery plan to failures
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<Config>,
    db: Database,
    platforms: Arc<dyn PlatformSource>,
    formatter: Formatter,
    limiter: RateLimiter,
    policy: RecoveryPolicy,
    analytics: Analytics,
    scheduler: Scheduler,
    events: EventBus,
}

impl Dispatcher {
    /// Create a dispatcher from configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the `[retry]` durations are invalid.
    pub fn new(
        config: Arc<Config>,
        db: Database,
        platforms: Arc<dyn PlatformSource>,
        events: EventBus,
    ) -> Result<Self> {
        Ok(Self {
            formatter: Formatter::from_config(&config),
            limiter: RateLimiter::from_config(&config),
            policy: config.retry.policy()?,
            analytics: Analytics::new(db.clone()),
            scheduler: Scheduler::new(db.clone()),
            config,
            db,
            platforms,
            events,
        })
    }

    pub fn formatter(&self) -> &Formatter {
        &self.formatter
    }

    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }

    /// Share `post` to `targets` as attempt number `attempt`
    ///
    /// Returns one outcome per enabled target, in target order. Targets that
    /// are disabled in configuration are skipped with a warning.
    pub async fn dispatch(
        &self,
        post: &SourcePost,
        targets: &[PlatformKind],
        attempt: u32,
    ) -> Vec<ShareOutcome> {
        self.dispatch_with(post, targets, attempt, false).await
    }

    /// Like [`Dispatcher::dispatch`], for a share that ignores earlier successes
    ///
    /// With `force` set, retries scheduled for failed targets are forced too.
    pub async fn dispatch_with(
        &self,
        post: &SourcePost,
        targets: &[PlatformKind],
        attempt: u32,
        force: bool,
    ) -> Vec<ShareOutcome> {
        let mut enabled = Vec::new();
        for kind in targets {
            if self.config.is_enabled(*kind) {
                if !enabled.contains(kind) {
                    enabled.push(*kind);
                }
            } else {
                warn!("Skipping {}: not enabled in configuration", kind.display_name());
            }
        }

        if enabled.is_empty() {
            return Vec::new();
        }

        info!(
            "Sharing post {} ({}) to {} (attempt {})",
            post.id,
            post.title,
            enabled.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", "),
            attempt
        );
        self.events.emit(Event::ShareStarted {
            post_id: post.id,
            platforms: enabled.iter().map(|k| k.as_str().to_string()).collect(),
            attempt,
        });

        let set = self.platforms.connect(&enabled).await;

        let mut results: Vec<(PlatformKind, Result<PublishedPost>)> = set
            .unavailable
            .into_iter()
            .map(|(kind, err)| (kind, Err(err)))
            .collect();

        let shares = set
            .ready
            .iter()
            .map(|platform| async move {
                let result = self.share_one(platform.as_ref(), post).await;
                (platform.kind(), result)
            });
        results.extend(join_all(shares).await);

        let mut outcomes = Vec::with_capacity(results.len());
        for kind in &enabled {
            if let Some(index) = results.iter().position(|(k, _)| k == kind) {
                let (kind, result) = results.swap_remove(index);
                outcomes.push(self.settle(post, kind, result, attempt, force).await);
            }
        }
        outcomes
    }

    /// Rate limit, format, validate and publish to one ready platform
    async fn share_one(&self, platform: &dyn Platform, post: &SourcePost) -> Result<PublishedPost> {
        let now = chrono::Utc::now().timestamp();
        self.limiter.acquire(&self.db, platform.kind(), now).await?;

        let formatted = self.formatter.format(post, platform.kind())?;
        platform.validate_content(&formatted)?;
        platform.publish(&formatted).await
    }

    /// Record an outcome and act on its recovery plan
    async fn settle(
        &self,
        post: &SourcePost,
        kind: PlatformKind,
        result: Result<PublishedPost>,
        attempt: u32,
        force: bool,
    ) -> ShareOutcome {
        let now = chrono::Utc::now().timestamp();

        let outcome = match result {
            Ok(published) => {
                info!(
                    "Shared post {} to {}: {}",
                    post.id,
                    kind.display_name(),
                    published.url.as_deref().unwrap_or(&published.remote_id)
                );
                self.events.emit(Event::ShareSucceeded {
                    post_id: post.id,
                    platform: kind.as_str().to_string(),
                    remote_id: published.remote_id.clone(),
                    url: published.url.clone(),
                });
                ShareOutcome::succeeded(kind, published, attempt)
            }
            Err(err) => self.fail(post, kind, &err, attempt, force, now).await,
        };

        if let Err(e) = self.analytics.record(post, &outcome, now).await {
            warn!("Failed to record {} share of post {}: {}", kind, post.id, e);
        }

        outcome
    }

    async fn fail(
        &self,
        post: &SourcePost,
        kind: PlatformKind,
        err: &PresscastError,
        attempt: u32,
        force: bool,
        now: i64,
    ) -> ShareOutcome {
        let (category, action) = self.policy.plan_for(err, attempt);
        warn!(
            "Sharing post {} to {} failed ({}): {}",
            post.id,
            kind.display_name(),
            category,
            err
        );
        self.events.emit(Event::ShareFailed {
            post_id: post.id,
            platform: kind.as_str().to_string(),
            category: category.as_str().to_string(),
            error: err.to_string(),
        });

        match &action {
            RecoveryAction::Retry { delay_secs } => {
                let run_at = now + *delay_secs as i64;
                match self
                    .scheduler
                    .schedule_retry(post, kind, run_at, attempt + 1, force)
                    .await
                {
                    Ok(Some(_)) => self.events.emit(Event::RetryScheduled {
                        post_id: post.id,
                        platform: kind.as_str().to_string(),
                        attempt: attempt + 1,
                        run_at,
                    }),
                    Ok(None) => {}
                    Err(e) => warn!("Failed to schedule retry for {}: {}", kind, e),
                }
            }
            RecoveryAction::Reauthenticate => {
                warn!(
                    "{} credentials need attention. Run: press-creds test {}",
                    kind.display_name(),
                    kind
                );
                self.events.emit(Event::ReauthRequired {
                    post_id: post.id,
                    platform: kind.as_str().to_string(),
                });
            }
            RecoveryAction::Abandon { reason } => {
                info!("Giving up on post {} for {}: {}", post.id, kind, reason);
            }
        }

        let mut outcome = ShareOutcome::failed(kind, err, attempt);
        outcome.category = Some(category);
        outcome.recovery = Some(action);
        outcome
    }
}

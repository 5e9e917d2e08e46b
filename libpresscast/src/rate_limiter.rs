//! Local rate limiting for outgoing shares
//!
//! Prevents over-posting to a network by tracking shares per hour window,
//! independently of the limits the network itself enforces.

use crate::error::{DbError, PlatformError, Result};
use crate::types::PlatformKind;
use crate::{Config, Database};
use std::collections::HashMap;

const WINDOW_SECS: i64 = 3600;

/// Rate limiter for platform posting
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    /// Platform-specific limits (posts per hour)
    limits: HashMap<PlatformKind, u32>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given limits
    pub fn new(limits: HashMap<PlatformKind, u32>) -> Self {
        Self { limits }
    }

    /// Limits from each platform's `posts_per_hour` setting
    pub fn from_config(config: &Config) -> Self {
        let limits = PlatformKind::ALL
            .into_iter()
            .filter_map(|kind| {
                config
                    .platform(kind)
                    .and_then(|p| p.posts_per_hour)
                    .map(|limit| (kind, limit))
            })
            .collect();
        Self::new(limits)
    }

    pub fn limit(&self, platform: PlatformKind) -> Option<u32> {
        self.limits.get(&platform).copied()
    }

    /// Reserve a slot for one share, or fail with a rate limit error
    ///
    /// The error carries the wait until the next window opens, so recovery
    /// schedules the retry for that moment.
    pub async fn acquire(&self, db: &Database, platform: PlatformKind, now: i64) -> Result<()> {
        if self.check_and_record(db, platform, now).await? {
            return Ok(());
        }

        let wait = next_window_start(now) - now;
        tracing::info!(
            "Local {} limit of {}/hour reached",
            platform.display_name(),
            self.limit(platform).unwrap_or_default()
        );
        Err(PlatformError::RateLimit(format!(
            "{}: local limit of {} posts per hour reached (retry after {}s)",
            platform.display_name(),
            self.limit(platform).unwrap_or_default(),
            wait
        ))
        .into())
    }

    /// Check if posting is allowed and record the post
    ///
    /// Returns Ok(true) if posting is allowed, Ok(false) if rate limited.
    /// The check and the increment are one statement, so concurrent callers
    /// never overshoot the limit.
    pub async fn check_and_record(
        &self,
        db: &Database,
        platform: PlatformKind,
        now: i64,
    ) -> Result<bool> {
        match self.limit(platform) {
            None => Ok(true),
            Some(0) => Ok(false),
            Some(limit) => reserve_slot(db, platform, window_start(now), limit).await,
        }
    }

    /// Check if posting is allowed (without recording)
    pub async fn check(&self, db: &Database, platform: PlatformKind, now: i64) -> Result<bool> {
        let limit = match self.limits.get(&platform) {
            Some(l) => *l,
            None => return Ok(true), // No limit configured, allow
        };

        let count = get_window_count(db, platform, window_start(now)).await?;
        Ok(count < limit)
    }

    /// Record a post for rate limiting
    pub async fn record(&self, db: &Database, platform: PlatformKind, now: i64) -> Result<()> {
        increment_window_count(db, platform, window_start(now)).await
    }

    /// Clean up old rate limit windows
    pub async fn cleanup_old_windows(&self, db: &Database, cutoff: i64) -> Result<u64> {
        delete_old_windows(db, window_start(cutoff)).await
    }
}

/// Floor a timestamp to its hour window
pub fn window_start(timestamp: i64) -> i64 {
    (timestamp / WINDOW_SECS) * WINDOW_SECS
}

pub fn next_window_start(timestamp: i64) -> i64 {
    window_start(timestamp) + WINDOW_SECS
}

async fn get_window_count(db: &Database, platform: PlatformKind, window_start: i64) -> Result<u32> {
    let row = sqlx::query_as::<_, (Option<i64>,)>(
        r#"
        SELECT post_count FROM rate_limits
        WHERE platform = ? AND window_start = ?
        "#,
    )
    .bind(platform.as_str())
    .bind(window_start)
    .fetch_optional(db.pool())
    .await
    .map_err(DbError::SqlxError)?;

    Ok(row.and_then(|r| r.0).unwrap_or(0) as u32)
}

async fn increment_window_count(
    db: &Database,
    platform: PlatformKind,
    window_start: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO rate_limits (platform, window_start, post_count)
        VALUES (?, ?, 1)
        ON CONFLICT(platform, window_start)
        DO UPDATE SET post_count = post_count + 1
        "#,
    )
    .bind(platform.as_str())
    .bind(window_start)
    .execute(db.pool())
    .await
    .map_err(DbError::SqlxError)?;

    Ok(())
}

/// Count one post in the window unless it already holds `limit`
async fn reserve_slot(
    db: &Database,
    platform: PlatformKind,
    window_start: i64,
    limit: u32,
) -> Result<bool> {
    let row = sqlx::query(
        r#"
        INSERT INTO rate_limits (platform, window_start, post_count)
        VALUES (?, ?, 1)
        ON CONFLICT(platform, window_start)
        DO UPDATE SET post_count = post_count + 1 WHERE post_count < ?
        RETURNING post_count
        "#,
    )
    .bind(platform.as_str())
    .bind(window_start)
    .bind(limit as i64)
    .fetch_optional(db.pool())
    .await
    .map_err(DbError::SqlxError)?;

    Ok(row.is_some())
}

async fn delete_old_windows(db: &Database, cutoff_window: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM rate_limits WHERE window_start < ?")
        .bind(cutoff_window)
        .execute(db.pool())
        .await
        .map_err(DbError::SqlxError)?;

    Ok(result.rows_affected())
}

//! Scheduling and time parsing utilities
//!
//! This module provides parsing of human-readable time formats, and the
//! [`Scheduler`] that stores one-shot delayed share and retry jobs.

use crate::db::{Database, DueJob};
use crate::types::{Job, JobKind, JobStatus, PlatformKind, SourcePost};
use crate::{PresscastError, Result};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;

const MIN_RANDOM_SECONDS: i64 = 30;
const MAX_RANDOM_SECONDS: i64 = 30 * 24 * 3600; // 30 days

/// Parse a schedule string into a DateTime
///
/// Supports multiple formats:
/// - Relative durations: "1h", "30m", "2d"
/// - Natural language: "tomorrow", "tomorrow 9am", "next monday 10am"
/// - Absolute times: "2025-11-20 15:00"
/// - Random intervals: "random:10m-20m", "random:1h-2h"
///
/// `last_scheduled` anchors random intervals, so that a series of random
/// schedules spreads out after the previous one.
///
/// # Errors
///
/// Returns an error if the time format is invalid or cannot be parsed.
pub fn parse_schedule(input: &str, last_scheduled: Option<i64>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PresscastError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    // Try random format first
    if input.starts_with("random:") {
        return parse_random_schedule(input, last_scheduled);
    }

    if let Ok(duration) = parse_duration(input) {
        return Ok(Utc::now() + duration);
    }

    if let Ok(dt) = parse_natural_language(input) {
        return Ok(dt);
    }

    Err(PresscastError::InvalidInput(format!(
        "Could not parse schedule string: {}",
        input
    )))
}

/// Parse a delay such as "10m" or "0" into a std Duration
pub fn parse_delay(input: &str) -> Result<std::time::Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "0" {
        return Ok(std::time::Duration::ZERO);
    }
    humantime::parse_duration(trimmed)
        .map_err(|e| PresscastError::InvalidInput(format!("Invalid delay '{}': {}", input, e)))
}

/// Parse a duration string into a chrono::Duration
fn parse_duration(input: &str) -> Result<Duration> {
    if let Ok(std_duration) = humantime::parse_duration(input) {
        let seconds = std_duration.as_secs() as i64;
        return Duration::try_seconds(seconds)
            .ok_or_else(|| PresscastError::InvalidInput("Duration out of range".to_string()));
    }

    Err(PresscastError::InvalidInput(format!(
        "Could not parse duration: {}",
        input
    )))
}

/// Parse natural language time expression
fn parse_natural_language(input: &str) -> Result<DateTime<Utc>> {
    chrono_english::parse_date_string(input, Utc::now(), chrono_english::Dialect::Us)
        .map_err(|e| PresscastError::InvalidInput(format!("Could not parse time: {}", e)))
}

/// Parse random schedule format: "random:MIN-MAX"
fn parse_random_schedule(input: &str, last_scheduled: Option<i64>) -> Result<DateTime<Utc>> {
    let range_part = input
        .strip_prefix("random:")
        .ok_or_else(|| PresscastError::InvalidInput("Invalid random format".to_string()))?;

    let (min_str, max_str) = range_part
        .split_once('-')
        .ok_or_else(|| PresscastError::InvalidInput("Random format must be MIN-MAX".to_string()))?;
    let min_duration = parse_duration(min_str)?;
    let max_duration = parse_duration(max_str)?;

    validate_random_range(min_duration, max_duration)?;

    let base_time = match last_scheduled {
        Some(timestamp) => DateTime::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now),
        None => Utc::now(),
    };
    let random_secs =
        rand::thread_rng().gen_range(min_duration.num_seconds()..=max_duration.num_seconds());

    Ok(base_time + Duration::try_seconds(random_secs).unwrap_or(min_duration))
}

fn validate_random_range(min: Duration, max: Duration) -> Result<()> {
    let min_secs = min.num_seconds();
    let max_secs = max.num_seconds();

    if min_secs < MIN_RANDOM_SECONDS {
        return Err(PresscastError::InvalidInput(format!(
            "Minimum random interval must be at least {} seconds",
            MIN_RANDOM_SECONDS
        )));
    }

    if max_secs > MAX_RANDOM_SECONDS {
        return Err(PresscastError::InvalidInput(format!(
            "Maximum random interval must be less than {} days",
            MAX_RANDOM_SECONDS / (24 * 3600)
        )));
    }

    if min_secs >= max_secs {
        return Err(PresscastError::InvalidInput(
            "Minimum must be less than maximum".to_string(),
        ));
    }

    Ok(())
}

/// Job queue of one-shot delayed callbacks
///
/// Jobs carry a snapshot of the post, so they run even if the source is no
/// longer reachable. Claiming is atomic, so two daemons never run the same
/// job.
#[derive(Clone)]
pub struct Scheduler {
    db: Database,
}

impl Scheduler {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Schedule a share of `post` to `platforms` at `run_at`
    ///
    /// Platforms already covered by a pending share job for the same post
    /// are left out; a forced share is only covered by another forced one.
    /// Returns `None` when nothing new had to be scheduled.
    pub async fn schedule_share(
        &self,
        post: &SourcePost,
        platforms: &[PlatformKind],
        run_at: i64,
        force: bool,
    ) -> Result<Option<Job>> {
        let covered: Vec<PlatformKind> = self
            .db
            .pending_jobs_for_post(post.id)
            .await?
            .into_iter()
            .filter(|job| job.kind == JobKind::Share && (job.force || !force))
            .flat_map(|job| job.platforms)
            .collect();

        let remaining: Vec<PlatformKind> = platforms
            .iter()
            .copied()
            .filter(|p| !covered.contains(p))
            .collect();

        if remaining.is_empty() {
            tracing::debug!(
                "Post {} already has a pending share for {:?}",
                post.id,
                platforms
            );
            return Ok(None);
        }

        let job = Job::new(JobKind::Share, post.clone(), remaining, run_at, 1).with_force(force);
        self.db.insert_job(&job).await?;
        tracing::info!(
            "Scheduled share of post {} to {} at {}",
            post.id,
            join_kinds(&job.platforms),
            format_timestamp(run_at)
        );
        Ok(Some(job))
    }

    /// Schedule a single-platform retry as attempt number `attempt`
    ///
    /// Returns `None` when a retry for that post and platform is already pending.
    /// A retry of a forced share is forced too.
    pub async fn schedule_retry(
        &self,
        post: &SourcePost,
        platform: PlatformKind,
        run_at: i64,
        attempt: u32,
        force: bool,
    ) -> Result<Option<Job>> {
        let pending = self.db.pending_jobs_for_post(post.id).await?;
        if pending
            .iter()
            .any(|job| job.kind == JobKind::Retry && job.platforms.contains(&platform))
        {
            tracing::debug!("Retry for post {} on {} already pending", post.id, platform);
            return Ok(None);
        }

        let job = Job::new(JobKind::Retry, post.clone(), vec![platform], run_at, attempt)
            .with_force(force);
        self.db.insert_job(&job).await?;
        tracing::info!(
            "Scheduled retry {} of post {} on {} at {}",
            attempt,
            post.id,
            platform,
            format_timestamp(run_at)
        );
        Ok(Some(job))
    }

    /// Hand running jobs claimed before `claimed_before` back to the queue
    pub async fn requeue_stale(&self, claimed_before: i64) -> Result<u64> {
        let requeued = self.db.requeue_stale_jobs(claimed_before).await?;
        if requeued > 0 {
            tracing::warn!("Requeued {} job(s) left running by an earlier worker", requeued);
        }
        Ok(requeued)
    }

    /// Pending jobs whose time has come, oldest first
    pub async fn due(&self, now: i64, limit: u32) -> Result<Vec<DueJob>> {
        self.db.due_jobs(now, limit).await
    }

    /// Move a job from pending to running; false if someone else got it
    pub async fn claim(&self, id: &str) -> Result<bool> {
        self.db.claim_job(id).await
    }

    pub async fn complete(&self, id: &str) -> Result<bool> {
        self.db.set_job_status(id, JobStatus::Done, None).await
    }

    pub async fn fail(&self, id: &str, error: &str) -> Result<bool> {
        self.db
            .set_job_status(id, JobStatus::Failed, Some(error))
            .await
    }

    /// Cancel a pending job; false if it is not pending
    pub async fn cancel(&self, id: &str) -> Result<bool> {
        self.db.cancel_job(id).await
    }

    /// Move a pending job to a new time; false if it is not pending
    pub async fn reschedule(&self, id: &str, run_at: i64) -> Result<bool> {
        self.db.reschedule_job(id, run_at).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Job>> {
        self.db.get_job(id).await
    }

    pub async fn list(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>> {
        self.db.list_jobs(status, limit).await
    }

    pub async fn pending_for_post(&self, post_id: i64) -> Result<Vec<Job>> {
        self.db.pending_jobs_for_post(post_id).await
    }
}

fn join_kinds(kinds: &[PlatformKind]) -> String {
    kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// RFC 3339 rendering of a Unix timestamp, for log lines and CLI output
pub fn format_timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // DURATION PARSING TESTS

    #[test]
    fn test_parse_duration_minutes() {
        let scheduled_time = parse_schedule("30m", None).unwrap();
        let diff = (scheduled_time - Utc::now()).num_minutes();

        // Should be approximately 30 minutes from now (allow 1 minute tolerance)
        assert!(
            (29..=31).contains(&diff),
            "Expected ~30 minutes, got {}",
            diff
        );
    }

    #[test]
    fn test_parse_duration_hours() {
        let scheduled_time = parse_schedule("2h", None).unwrap();
        let diff = (scheduled_time - Utc::now()).num_minutes();
        assert!(
            (119..=121).contains(&diff),
            "Expected ~120 minutes, got {}",
            diff
        );
    }

    #[test]
    fn test_parse_duration_with_space() {
        let scheduled_time = parse_schedule("1 hour", None).unwrap();
        let diff = (scheduled_time - Utc::now()).num_minutes();
        assert!((59..=61).contains(&diff), "Expected ~60 minutes, got {}", diff);
    }

    #[test]
    fn test_parse_tomorrow() {
        let scheduled_time = parse_schedule("tomorrow", None).unwrap();
        let diff = (scheduled_time - Utc::now()).num_hours();

        // Should be approximately 24 hours from now (20-28 hours tolerance)
        assert!((20..=28).contains(&diff), "Expected ~24 hours, got {}", diff);
    }

    #[test]
    fn test_parse_empty_and_garbage() {
        assert!(parse_schedule("", None).is_err());
        assert!(parse_schedule("   ", None).is_err());
        assert!(parse_schedule("whenever you feel like it", None).is_err());
    }

    #[test]
    fn test_parse_delay() {
        assert_eq!(parse_delay("0").unwrap(), std::time::Duration::ZERO);
        assert_eq!(parse_delay("").unwrap(), std::time::Duration::ZERO);
        assert_eq!(
            parse_delay("10m").unwrap(),
            std::time::Duration::from_secs(600)
        );
        assert!(parse_delay("soon").is_err());
    }

    // RANDOM SCHEDULING TESTS

    #[test]
    fn test_parse_random_with_last_scheduled() {
        let last = Utc::now().timestamp() + 3600;

        let scheduled_time = parse_schedule("random:10m-20m", Some(last)).unwrap();
        let diff = (scheduled_time.timestamp() - last) / 60;

        // Should be 10-20 minutes after last_scheduled
        assert!(
            (10..=20).contains(&diff),
            "Expected 10-20 minutes after last, got {}",
            diff
        );
    }

    #[test]
    fn test_random_range_validation() {
        assert!(parse_schedule("random:10s-1m", None).is_err());
        assert!(parse_schedule("random:20m-10m", None).is_err());
        assert!(parse_schedule("random:1h-60d", None).is_err());
        assert!(parse_schedule("random:10m", None).is_err());
    }

    // SCHEDULER TESTS

    async fn scheduler() -> Scheduler {
        Scheduler::new(Database::in_memory().await.unwrap())
    }

    fn post() -> SourcePost {
        SourcePost::new(7, "Scheduled", "https://blog.example/scheduled")
    }

    #[tokio::test]
    async fn test_schedule_share_dedupes_pending_platforms() {
        let scheduler = scheduler().await;
        let now = Utc::now().timestamp();

        let first = scheduler
            .schedule_share(&post(), &[PlatformKind::X, PlatformKind::Bluesky], now + 60, false)
            .await
            .unwrap();
        assert!(first.is_some());

        let again = scheduler
            .schedule_share(&post(), &[PlatformKind::Bluesky, PlatformKind::X], now + 120, false)
            .await
            .unwrap();
        assert!(again.is_none());

        // Only the uncovered platform gets a new job
        let extra = scheduler
            .schedule_share(&post(), &[PlatformKind::X, PlatformKind::Facebook], now + 120, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(extra.platforms, vec![PlatformKind::Facebook]);

        assert_eq!(scheduler.pending_for_post(7).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_is_not_duplicated() {
        let scheduler = scheduler().await;
        let now = Utc::now().timestamp();

        let retry = scheduler
            .schedule_retry(&post(), PlatformKind::LinkedIn, now + 300, 2, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retry.kind, JobKind::Retry);
        assert_eq!(retry.attempt, 2);

        assert!(scheduler
            .schedule_retry(&post(), PlatformKind::LinkedIn, now + 600, 2, false)
            .await
            .unwrap()
            .is_none());
        assert!(scheduler
            .schedule_retry(&post(), PlatformKind::X, now + 600, 2, false)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_and_lifecycle() {
        let scheduler = scheduler().await;
        let now = Utc::now().timestamp();

        let job = scheduler
            .schedule_share(&post(), &[PlatformKind::X], now - 1, false)
            .await
            .unwrap()
            .unwrap();

        let due = scheduler.due(now, 10).await.unwrap();
        assert_eq!(due.len(), 1);

        assert!(scheduler.claim(&job.id).await.unwrap());
        assert!(!scheduler.claim(&job.id).await.unwrap());
        assert!(scheduler.due(now, 10).await.unwrap().is_empty());

        assert!(scheduler.complete(&job.id).await.unwrap());
        let stored = scheduler.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Done);

        // Finished jobs cannot be cancelled or moved
        assert!(!scheduler.cancel(&job.id).await.unwrap());
        assert!(!scheduler.reschedule(&job.id, now + 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_reschedule_and_fail() {
        let scheduler = scheduler().await;
        let now = Utc::now().timestamp();

        let later = scheduler
            .schedule_share(&post(), &[PlatformKind::X], now + 3600, false)
            .await
            .unwrap()
            .unwrap();
        assert!(scheduler.due(now, 10).await.unwrap().is_empty());

        assert!(scheduler.reschedule(&later.id, now - 5).await.unwrap());
        assert_eq!(scheduler.due(now, 10).await.unwrap().len(), 1);

        assert!(scheduler.cancel(&later.id).await.unwrap());
        assert_eq!(
            scheduler.list(Some(JobStatus::Cancelled), 10).await.unwrap().len(),
            1
        );

        let other = scheduler
            .schedule_retry(&post(), PlatformKind::X, now - 1, 2, false)
            .await
            .unwrap()
            .unwrap();
        assert!(scheduler.claim(&other.id).await.unwrap());
        assert!(scheduler.fail(&other.id, "snapshot unreadable").await.unwrap());
        let stored = scheduler.get(&other.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("snapshot unreadable"));
    }

    #[tokio::test]
    async fn test_forced_share_is_not_covered_by_plain_share() {
        let scheduler = scheduler().await;
        let now = Utc::now().timestamp();

        scheduler
            .schedule_share(&post(), &[PlatformKind::X], now + 60, false)
            .await
            .unwrap()
            .unwrap();

        let forced = scheduler
            .schedule_share(&post(), &[PlatformKind::X], now + 60, true)
            .await
            .unwrap()
            .unwrap();
        assert!(forced.force);

        // A second forced share is covered by the first
        assert!(scheduler
            .schedule_share(&post(), &[PlatformKind::X], now + 90, true)
            .await
            .unwrap()
            .is_none());

        let retry = scheduler
            .schedule_retry(&post(), PlatformKind::X, now + 300, 2, true)
            .await
            .unwrap()
            .unwrap();
        assert!(scheduler.get(&retry.id).await.unwrap().unwrap().force);
    }
}

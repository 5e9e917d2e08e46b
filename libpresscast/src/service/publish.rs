//! Publishing orchestrators
//!
//! Decides *whether* and *when* a post is shared, then hands the actual
//! sending to the [`Dispatcher`]:
//!
//! - [`PublishService::handle_transition`] reacts to a post status change
//! - [`PublishService::share_now`] is the manual single share
//! - [`PublishService::bulk_publish`] shares many posts, optionally staggered
//! - [`PublishService::run_due_jobs`] executes scheduled shares and retries

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::analytics::Analytics;
use crate::config::Config;
use crate::db::DueJob;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::scheduling::Scheduler;
use crate::service::events::{Event, EventBus};
use crate::types::{Job, PlatformKind, ShareOutcome, SourcePost};

/// Status that triggers sharing
pub const PUBLISH_STATUS: &str = "publish";

/// A post moving from one status to another
#[derive(Debug, Clone)]
pub struct PostTransition {
    pub post: SourcePost,
    pub old_status: String,
    pub new_status: String,
}

/// What `handle_transition` did with a transition
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TransitionDecision {
    Ignored {
        reason: String,
    },
    Scheduled {
        job_id: String,
        run_at: i64,
        platforms: Vec<PlatformKind>,
    },
    Published {
        outcomes: Vec<ShareOutcome>,
    },
}

impl TransitionDecision {
    fn ignored(reason: impl Into<String>) -> Self {
        TransitionDecision::Ignored {
            reason: reason.into(),
        }
    }
}

/// Result of a manual share
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShareReport {
    pub outcomes: Vec<ShareOutcome>,
    /// Targets left out because the post is already shared there
    pub skipped: Vec<PlatformKind>,
}

impl ShareReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }
}

#[derive(Debug, Clone)]
pub struct BulkRequest {
    pub posts: Vec<SourcePost>,
    /// Empty means the configured default targets
    pub platforms: Vec<PlatformKind>,
    pub stagger: Duration,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkStatus {
    Published,
    Scheduled,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkItem {
    pub post_id: i64,
    pub title: String,
    pub status: BulkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub outcomes: Vec<ShareOutcome>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub published: usize,
    pub scheduled: usize,
    pub skipped: usize,
    pub failed: usize,
    pub items: Vec<BulkItem>,
}

/// Result of one pass over the job queue
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobRunReport {
    pub claimed: usize,
    pub completed: usize,
    /// Jobs marked failed: unreadable snapshot or an error while running
    pub failed: usize,
    pub outcomes: Vec<ShareOutcome>,
}

/// Orchestrates shares on top of the dispatcher
#[derive(Clone)]
pub struct PublishService {
    config: Arc<Config>,
    dispatcher: Dispatcher,
    scheduler: Scheduler,
    analytics: Analytics,
    events: EventBus,
}

impl PublishService {
    pub fn new(
        config: Arc<Config>,
        dispatcher: Dispatcher,
        scheduler: Scheduler,
        analytics: Analytics,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            dispatcher,
            scheduler,
            analytics,
            events,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Requested platforms, or the configured defaults when none are given
    pub fn resolve_targets(&self, platforms: &[PlatformKind]) -> Vec<PlatformKind> {
        if platforms.is_empty() {
            self.config.default_targets()
        } else {
            platforms.to_vec()
        }
    }

    /// Split targets into those still to share and those already shared
    async fn unshared(
        &self,
        post_id: i64,
        targets: &[PlatformKind],
    ) -> Result<(Vec<PlatformKind>, Vec<PlatformKind>)> {
        let mut pending = Vec::new();
        let mut done = Vec::new();
        for kind in targets {
            if self.analytics.already_shared(post_id, *kind).await? {
                done.push(*kind);
            } else {
                pending.push(*kind);
            }
        }
        Ok((pending, done))
    }

    /// React to a post status change
    ///
    /// Only a first transition into `publish` shares anything. With a
    /// configured `publishing.delay` the share is queued as a job; otherwise
    /// it is dispatched immediately.
    pub async fn handle_transition(&self, transition: &PostTransition) -> Result<TransitionDecision> {
        let post = &transition.post;
        let publishing = &self.config.publishing;

        if transition.new_status != PUBLISH_STATUS {
            return Ok(TransitionDecision::ignored(format!(
                "status '{}' is not '{}'",
                transition.new_status, PUBLISH_STATUS
            )));
        }
        if transition.old_status == PUBLISH_STATUS {
            return Ok(TransitionDecision::ignored("post was already published"));
        }
        if !publishing.auto_share {
            return Ok(TransitionDecision::ignored("auto_share is disabled"));
        }
        if !publishing.post_types.iter().any(|t| t == &post.post_type) {
            return Ok(TransitionDecision::ignored(format!(
                "post type '{}' is not shared",
                post.post_type
            )));
        }
        if post.skip_share {
            return Ok(TransitionDecision::ignored("post opted out of sharing"));
        }
        if post.password_protected {
            return Ok(TransitionDecision::ignored("post is password protected"));
        }

        let targets = self.config.default_targets();
        if targets.is_empty() {
            return Ok(TransitionDecision::ignored("no platforms are enabled"));
        }
        let (targets, _) = self.unshared(post.id, &targets).await?;
        if targets.is_empty() {
            return Ok(TransitionDecision::ignored("already shared to every platform"));
        }

        let delay = publishing.delay()?;
        if !delay.is_zero() {
            let run_at = chrono::Utc::now().timestamp() + delay.as_secs() as i64;
            return Ok(match self.scheduler.schedule_share(post, &targets, run_at, false).await? {
                Some(job) => TransitionDecision::Scheduled {
                    job_id: job.id,
                    run_at: job.run_at,
                    platforms: job.platforms,
                },
                None => TransitionDecision::ignored("a share is already scheduled"),
            });
        }

        let outcomes = self.dispatcher.dispatch(post, &targets, 1).await;
        Ok(TransitionDecision::Published { outcomes })
    }

    /// Share one post right now
    ///
    /// Platforms where the post was already shared are skipped unless `force`.
    pub async fn share_now(
        &self,
        post: &SourcePost,
        platforms: &[PlatformKind],
        force: bool,
    ) -> Result<ShareReport> {
        let targets = self.resolve_targets(platforms);
        let (targets, skipped) = if force {
            (targets, Vec::new())
        } else {
            self.unshared(post.id, &targets).await?
        };

        for kind in &skipped {
            info!("Post {} already shared to {}, skipping", post.id, kind);
        }

        let outcomes = if targets.is_empty() {
            Vec::new()
        } else {
            self.dispatcher.dispatch_with(post, &targets, 1, force).await
        };
        Ok(ShareReport { outcomes, skipped })
    }

    /// Queue a share of one post for later
    ///
    /// A forced job shares even to platforms the post is already on by the
    /// time it runs.
    pub async fn schedule(
        &self,
        post: &SourcePost,
        platforms: &[PlatformKind],
        run_at: i64,
        force: bool,
    ) -> Result<Option<Job>> {
        let targets = self.resolve_targets(platforms);
        self.scheduler.schedule_share(post, &targets, run_at, force).await
    }

    /// Share many posts
    ///
    /// Without stagger the posts are dispatched one after another. With
    /// stagger the first post to share goes out now and the n-th one is
    /// queued at `now + n * stagger`; posts skipped as already shared do not
    /// take a slot.
    pub async fn bulk_publish(&self, request: BulkRequest) -> Result<BulkReport> {
        let targets = self.resolve_targets(&request.platforms);
        let now = chrono::Utc::now().timestamp();
        let mut report = BulkReport::default();
        let mut slot: i64 = 0;

        info!(
            "Bulk sharing {} posts (stagger {})",
            request.posts.len(),
            humantime::format_duration(request.stagger)
        );

        for post in &request.posts {
            let mut item = BulkItem {
                post_id: post.id,
                title: post.title.clone(),
                status: BulkStatus::Skipped,
                job_id: None,
                run_at: None,
                reason: None,
                outcomes: Vec::new(),
            };

            let post_targets = if request.force {
                targets.clone()
            } else {
                self.unshared(post.id, &targets).await?.0
            };

            if post_targets.is_empty() {
                item.reason = Some("already shared to every target".to_string());
                report.skipped += 1;
                report.items.push(item);
                continue;
            }

            if request.stagger.is_zero() || slot == 0 {
                item.outcomes = self
                    .dispatcher
                    .dispatch_with(post, &post_targets, 1, request.force)
                    .await;
                if item.outcomes.iter().any(|o| o.success) {
                    item.status = BulkStatus::Published;
                    report.published += 1;
                } else {
                    item.status = BulkStatus::Failed;
                    item.reason = item.outcomes.iter().find_map(|o| o.error.clone());
                    report.failed += 1;
                }
            } else {
                let run_at = now + slot * request.stagger.as_secs() as i64;
                match self
                    .scheduler
                    .schedule_share(post, &post_targets, run_at, request.force)
                    .await?
                {
                    Some(job) => {
                        item.status = BulkStatus::Scheduled;
                        item.job_id = Some(job.id);
                        item.run_at = Some(run_at);
                        report.scheduled += 1;
                    }
                    None => {
                        item.reason = Some("a share is already scheduled".to_string());
                        report.skipped += 1;
                        report.items.push(item);
                        continue;
                    }
                }
            }

            slot += 1;
            report.items.push(item);
        }

        info!(
            "Bulk share finished: {} published, {} scheduled, {} skipped, {} failed",
            report.published, report.scheduled, report.skipped, report.failed
        );
        Ok(report)
    }

    /// Run every job due at `now`
    ///
    /// Jobs are claimed one by one, so a job another worker already claimed
    /// is skipped. A job whose post snapshot cannot be read, or whose run
    /// hits an error, is marked failed and the rest of the batch still runs.
    pub async fn run_due_jobs(&self, now: i64) -> Result<JobRunReport> {
        let due = self
            .scheduler
            .due(now, self.config.daemon.batch_size)
            .await?;
        let mut report = JobRunReport::default();

        for entry in due {
            let job = match entry {
                DueJob::Corrupt { id, reason } => {
                    if self.try_claim(&id).await {
                        report.claimed += 1;
                        warn!("Job {} is unreadable: {}", id, reason);
                        self.mark_failed(&id, &reason).await;
                        report.failed += 1;
                    }
                    continue;
                }
                DueJob::Ready(job) => job,
            };

            if !self.try_claim(&job.id).await {
                continue;
            }
            report.claimed += 1;
            match self.execute(&job).await {
                Ok(outcomes) => {
                    report.completed += 1;
                    report.outcomes.extend(outcomes);
                }
                Err(e) => {
                    warn!("Job {} for post {} failed: {}", job.id, job.post.id, e);
                    self.mark_failed(&job.id, &e.to_string()).await;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run one job immediately, regardless of its scheduled time
    ///
    /// Returns `None` when the job is not pending.
    pub async fn run_job(&self, id: &str) -> Result<Option<Vec<ShareOutcome>>> {
        let Some(job) = self.scheduler.get(id).await? else {
            return Ok(None);
        };
        if !self.scheduler.claim(id).await? {
            return Ok(None);
        }
        match self.execute(&job).await {
            Ok(outcomes) => Ok(Some(outcomes)),
            Err(e) => {
                self.mark_failed(id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Claim a job, treating a database error as "not claimed"
    async fn try_claim(&self, id: &str) -> bool {
        match self.scheduler.claim(id).await {
            Ok(true) => true,
            Ok(false) => {
                debug!("Job {} was claimed elsewhere", id);
                false
            }
            Err(e) => {
                warn!("Could not claim job {}: {}", id, e);
                false
            }
        }
    }

    /// Move a claimed job to failed; if even that fails it stays running
    /// until [`Scheduler::requeue_stale`] picks it up
    async fn mark_failed(&self, id: &str, reason: &str) {
        if let Err(e) = self.scheduler.fail(id, reason).await {
            warn!("Could not mark job {} failed: {}", id, e);
        }
    }

    /// Dispatch a claimed job and mark it done
    async fn execute(&self, job: &Job) -> Result<Vec<ShareOutcome>> {
        let targets = if job.force {
            job.platforms.clone()
        } else {
            let (targets, done) = self.unshared(job.post.id, &job.platforms).await?;
            for kind in &done {
                debug!("Job {}: post {} already on {}", job.id, job.post.id, kind);
            }
            targets
        };

        let outcomes = if targets.is_empty() {
            Vec::new()
        } else {
            self.dispatcher
                .dispatch_with(&job.post, &targets, job.attempt, job.force)
                .await
        };

        self.scheduler.complete(&job.id).await?;
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        self.events.emit(Event::JobCompleted {
            job_id: job.id.clone(),
            post_id: job.post.id,
            succeeded,
            failed: outcomes.len() - succeeded,
        });
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::PlatformError;
    use crate::platforms::mock::{MockConfig, MockPlatforms};
    use crate::types::{JobKind, JobStatus};

    const CONFIG: &str = r#"
[publishing]
platforms = ["x", "bluesky"]

[x]
[bluesky]
[linkedin]
"#;

    struct Harness {
        service: PublishService,
        source: MockPlatforms,
        scheduler: Scheduler,
        analytics: Analytics,
        db: Database,
    }

    async fn harness_with(source: MockPlatforms, toml: &str) -> Harness {
        let config = Arc::new(Config::from_toml(toml).unwrap());
        let db = Database::in_memory().await.unwrap();
        let events = EventBus::new(64);
        let dispatcher = Dispatcher::new(
            config.clone(),
            db.clone(),
            Arc::new(source.clone()),
            events.clone(),
        )
        .unwrap();
        let scheduler = Scheduler::new(db.clone());
        let analytics = Analytics::new(db.clone());
        Harness {
            service: PublishService::new(
                config,
                dispatcher,
                scheduler.clone(),
                analytics.clone(),
                events,
            ),
            source,
            scheduler,
            analytics,
            db,
        }
    }

    async fn harness(toml: &str) -> Harness {
        harness_with(MockPlatforms::all_succeeding(), toml).await
    }

    fn post(id: i64) -> SourcePost {
        SourcePost::new(id, format!("Post {}", id), format!("https://blog.example/{}", id))
    }

    fn transition(post: SourcePost, old: &str, new: &str) -> PostTransition {
        PostTransition {
            post,
            old_status: old.to_string(),
            new_status: new.to_string(),
        }
    }

    fn ignored_reason(decision: &TransitionDecision) -> Option<&str> {
        match decision {
            TransitionDecision::Ignored { reason } => Some(reason),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_transition_to_publish_shares_to_defaults() {
        let h = harness(CONFIG).await;

        let decision = h
            .service
            .handle_transition(&transition(post(1), "draft", "publish"))
            .await
            .unwrap();

        match decision {
            TransitionDecision::Published { outcomes } => {
                let kinds: Vec<_> = outcomes.iter().map(|o| o.platform).collect();
                assert_eq!(kinds, vec![PlatformKind::X, PlatformKind::Bluesky]);
                assert!(outcomes.iter().all(|o| o.success));
            }
            other => panic!("expected Published, got {:?}", other),
        }
        assert_eq!(h.source.config(PlatformKind::LinkedIn).unwrap().post_calls(), 0);
    }

    #[tokio::test]
    async fn test_transition_guards() {
        let h = harness(CONFIG).await;

        let d = h
            .service
            .handle_transition(&transition(post(1), "publish", "publish"))
            .await
            .unwrap();
        assert_eq!(ignored_reason(&d), Some("post was already published"));

        let d = h
            .service
            .handle_transition(&transition(post(1), "draft", "pending"))
            .await
            .unwrap();
        assert!(ignored_reason(&d).is_some());

        let mut page = post(2);
        page.post_type = "page".to_string();
        let d = h
            .service
            .handle_transition(&transition(page, "draft", "publish"))
            .await
            .unwrap();
        assert!(ignored_reason(&d).unwrap().contains("page"));

        let mut opted_out = post(3);
        opted_out.skip_share = true;
        let d = h
            .service
            .handle_transition(&transition(opted_out, "draft", "publish"))
            .await
            .unwrap();
        assert_eq!(ignored_reason(&d), Some("post opted out of sharing"));

        let mut protected = post(4);
        protected.password_protected = true;
        let d = h
            .service
            .handle_transition(&transition(protected, "future", "publish"))
            .await
            .unwrap();
        assert_eq!(ignored_reason(&d), Some("post is password protected"));

        assert_eq!(h.source.connect_calls(), 0);
    }

    #[tokio::test]
    async fn test_transition_respects_auto_share_off() {
        let h = harness("[publishing]\nauto_share = false\n[x]\n").await;
        let d = h
            .service
            .handle_transition(&transition(post(1), "draft", "publish"))
            .await
            .unwrap();
        assert_eq!(ignored_reason(&d), Some("auto_share is disabled"));
    }

    #[tokio::test]
    async fn test_transition_with_delay_schedules_job() {
        let h = harness("[publishing]\ndelay = \"10m\"\n[x]\n[bluesky]\n").await;
        let before = chrono::Utc::now().timestamp();

        let decision = h
            .service
            .handle_transition(&transition(post(5), "draft", "publish"))
            .await
            .unwrap();

        let TransitionDecision::Scheduled {
            job_id,
            run_at,
            platforms,
        } = decision
        else {
            panic!("expected Scheduled");
        };
        assert!(run_at >= before + 600);
        assert_eq!(platforms, vec![PlatformKind::X, PlatformKind::Bluesky]);
        assert_eq!(h.source.connect_calls(), 0);

        // A second publish event does not queue a duplicate
        let again = h
            .service
            .handle_transition(&transition(post(5), "draft", "publish"))
            .await
            .unwrap();
        assert_eq!(ignored_reason(&again), Some("a share is already scheduled"));

        let job = h.scheduler.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.kind, JobKind::Share);
    }

    #[tokio::test]
    async fn test_transition_skips_already_shared_platforms() {
        let h = harness(CONFIG).await;
        h.service
            .share_now(&post(6), &[PlatformKind::X], false)
            .await
            .unwrap();

        let decision = h
            .service
            .handle_transition(&transition(post(6), "draft", "publish"))
            .await
            .unwrap();
        let TransitionDecision::Published { outcomes } = decision else {
            panic!("expected Published");
        };
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].platform, PlatformKind::Bluesky);
    }

    #[tokio::test]
    async fn test_share_now_dedupes_unless_forced() {
        let h = harness(CONFIG).await;

        let first = h.service.share_now(&post(7), &[], false).await.unwrap();
        assert_eq!(first.outcomes.len(), 2);
        assert!(first.all_succeeded());

        let second = h.service.share_now(&post(7), &[], false).await.unwrap();
        assert!(second.outcomes.is_empty());
        assert_eq!(second.skipped, vec![PlatformKind::X, PlatformKind::Bluesky]);

        let forced = h
            .service
            .share_now(&post(7), &[PlatformKind::X], true)
            .await
            .unwrap();
        assert_eq!(forced.outcomes.len(), 1);
        assert_eq!(h.source.config(PlatformKind::X).unwrap().post_calls(), 2);
    }

    #[tokio::test]
    async fn test_bulk_without_stagger_dispatches_everything() {
        let h = harness(CONFIG).await;
        h.service.share_now(&post(2), &[], false).await.unwrap();

        let report = h
            .service
            .bulk_publish(BulkRequest {
                posts: vec![post(1), post(2), post(3)],
                platforms: vec![],
                stagger: Duration::ZERO,
                force: false,
            })
            .await
            .unwrap();

        assert_eq!(report.published, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.scheduled, 0);
        assert_eq!(report.items[1].status, BulkStatus::Skipped);
    }

    #[tokio::test]
    async fn test_bulk_with_stagger_spaces_posts() {
        let h = harness(CONFIG).await;
        let before = chrono::Utc::now().timestamp();

        let report = h
            .service
            .bulk_publish(BulkRequest {
                posts: vec![post(1), post(2), post(3)],
                platforms: vec![PlatformKind::Bluesky],
                stagger: Duration::from_secs(600),
                force: false,
            })
            .await
            .unwrap();

        assert_eq!(report.published, 1);
        assert_eq!(report.scheduled, 2);
        assert_eq!(report.items[0].status, BulkStatus::Published);

        let second = report.items[1].run_at.unwrap();
        let third = report.items[2].run_at.unwrap();
        assert!(second >= before + 600 && second <= before + 602);
        assert_eq!(third - second, 600);

        let pending = h.scheduler.list(Some(JobStatus::Pending), 0).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|j| j.platforms == vec![PlatformKind::Bluesky]));
    }

    #[tokio::test]
    async fn test_bulk_failure_is_counted() {
        let mut x = MockConfig::new(PlatformKind::X);
        x.post_error = Some(PlatformError::Validation("duplicate".to_string()));
        let h = harness_with(MockPlatforms::new(vec![x]), "[x]\n").await;

        let report = h
            .service
            .bulk_publish(BulkRequest {
                posts: vec![post(1)],
                platforms: vec![],
                stagger: Duration::ZERO,
                force: false,
            })
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.items[0].status, BulkStatus::Failed);
        assert!(report.items[0].reason.as_deref().unwrap().contains("duplicate"));
    }

    #[tokio::test]
    async fn test_run_due_jobs_executes_retry_chain() {
        let mut bluesky = MockConfig::new(PlatformKind::Bluesky);
        bluesky.post_error = Some(PlatformError::Network("timeout".to_string()));
        bluesky.fail_times = Some(1);
        let h = harness_with(
            MockPlatforms::new(vec![MockConfig::new(PlatformKind::X), bluesky]),
            CONFIG,
        )
        .await;

        let report = h.service.share_now(&post(9), &[], false).await.unwrap();
        assert!(!report.all_succeeded());

        let pending = h.scheduler.pending_for_post(9).await.unwrap();
        assert_eq!(pending.len(), 1);
        let retry_at = pending[0].run_at;

        // Nothing is due yet
        let early = h.service.run_due_jobs(retry_at - 1).await.unwrap();
        assert_eq!(early.claimed, 0);

        let run = h.service.run_due_jobs(retry_at).await.unwrap();
        assert_eq!((run.claimed, run.completed), (1, 1));
        assert_eq!(run.outcomes.len(), 1);
        assert!(run.outcomes[0].success);
        assert_eq!(run.outcomes[0].attempt, 2);

        assert!(h.analytics.already_shared(9, PlatformKind::Bluesky).await.unwrap());
        assert!(h.scheduler.pending_for_post(9).await.unwrap().is_empty());
        // X was never re-sent by the retry
        assert_eq!(h.source.config(PlatformKind::X).unwrap().post_calls(), 1);
    }

    #[tokio::test]
    async fn test_run_job_now_and_stale_job_dedupe() {
        let h = harness(CONFIG).await;
        let far = chrono::Utc::now().timestamp() + 86_400;
        let job = h
            .service
            .schedule(&post(4), &[], far, false)
            .await
            .unwrap()
            .unwrap();

        // Shared manually before the job runs
        h.service
            .share_now(&post(4), &[PlatformKind::X], false)
            .await
            .unwrap();

        let outcomes = h.service.run_job(&job.id).await.unwrap().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].platform, PlatformKind::Bluesky);

        assert!(h.service.run_job(&job.id).await.unwrap().is_none());
        let stored = h.scheduler.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_forced_staggered_bulk_reshares_through_queue() {
        let h = harness(CONFIG).await;
        h.service.share_now(&post(1), &[], false).await.unwrap();
        h.service.share_now(&post(2), &[], false).await.unwrap();

        let report = h
            .service
            .bulk_publish(BulkRequest {
                posts: vec![post(1), post(2)],
                platforms: vec![],
                stagger: Duration::from_secs(600),
                force: true,
            })
            .await
            .unwrap();
        assert_eq!((report.published, report.scheduled), (1, 1));

        let job_id = report.items[1].job_id.clone().unwrap();
        assert!(h.scheduler.get(&job_id).await.unwrap().unwrap().force);

        let now = chrono::Utc::now().timestamp();
        let run = h.service.run_due_jobs(now + 10_000).await.unwrap();
        assert_eq!((run.claimed, run.completed), (1, 1));
        assert_eq!(run.outcomes.len(), 2);
        assert!(run.outcomes.iter().all(|o| o.success));

        // Two plain shares, the immediate forced one, then the queued forced one
        assert_eq!(h.source.config(PlatformKind::X).unwrap().post_calls(), 4);
    }

    #[tokio::test]
    async fn test_forced_scheduled_share_ignores_earlier_success() {
        let h = harness(CONFIG).await;
        h.service.share_now(&post(4), &[], false).await.unwrap();

        let far = chrono::Utc::now().timestamp() + 86_400;
        let plain = h
            .service
            .schedule(&post(4), &[PlatformKind::X], far, false)
            .await
            .unwrap()
            .unwrap();
        let forced = h
            .service
            .schedule(&post(4), &[PlatformKind::X], far, true)
            .await
            .unwrap()
            .unwrap();

        assert!(h.service.run_job(&plain.id).await.unwrap().unwrap().is_empty());

        let outcomes = h.service.run_job(&forced.id).await.unwrap().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].success);
        assert_eq!(h.source.config(PlatformKind::X).unwrap().post_calls(), 2);
    }

    #[tokio::test]
    async fn test_job_error_fails_that_job_and_batch_continues() {
        let h = harness(CONFIG).await;
        let now = chrono::Utc::now().timestamp();

        let plain = h
            .service
            .schedule(&post(1), &[], now - 10, false)
            .await
            .unwrap()
            .unwrap();
        let forced = h
            .service
            .schedule(&post(2), &[], now - 5, true)
            .await
            .unwrap()
            .unwrap();
        let later = h
            .service
            .schedule(&post(3), &[], now + 86_400, false)
            .await
            .unwrap()
            .unwrap();

        // The already-shared lookup now errors; the forced job never makes it
        sqlx::query("DROP TABLE share_log")
            .execute(h.db.pool())
            .await
            .unwrap();

        let run = h.service.run_due_jobs(now).await.unwrap();
        assert_eq!((run.claimed, run.completed, run.failed), (2, 1, 1));
        assert_eq!(run.outcomes.len(), 2);

        let failed = h.scheduler.get(&plain.id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed.last_error.is_some());
        let done = h.scheduler.get(&forced.id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Done);

        // Running a job by hand fails it the same way and reports the error
        assert!(h.service.run_job(&later.id).await.is_err());
        let stored = h.scheduler.get(&later.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
    }
}

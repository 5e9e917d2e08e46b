//! Share analytics
//!
//! Every share attempt is written to the share log. Successful shares are
//! later enriched with engagement metrics from an [`EngagementProvider`].
//! No network exposes engagement for free-tier API access in a uniform way,
//! so the bundled provider is [`SimulatedEngagement`].

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::db::{Database, NewShare, ShareQuery};
use crate::error::Result;
use crate::types::{PlatformKind, ShareOutcome, ShareRecord, SourcePost};

/// Records refreshed per poll
const POLL_BATCH: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub likes: i64,
    pub shares: i64,
    pub comments: i64,
    pub impressions: i64,
}

/// Aggregates for one platform over the share log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformSummary {
    pub platform: String,
    pub total: i64,
    pub succeeded: i64,
    pub failed: i64,
    /// Fraction of attempts that succeeded, 0.0 to 1.0
    pub success_rate: f64,
    pub likes: i64,
    pub shares: i64,
    pub comments: i64,
    pub impressions: i64,
}

impl PlatformSummary {
    /// Sum per-platform summaries into one row named "all"
    pub fn combine(summaries: &[PlatformSummary]) -> PlatformSummary {
        let mut all = PlatformSummary {
            platform: "all".to_string(),
            total: 0,
            succeeded: 0,
            failed: 0,
            success_rate: 0.0,
            likes: 0,
            shares: 0,
            comments: 0,
            impressions: 0,
        };
        for s in summaries {
            all.total += s.total;
            all.succeeded += s.succeeded;
            all.failed += s.failed;
            all.likes += s.likes;
            all.shares += s.shares;
            all.comments += s.comments;
            all.impressions += s.impressions;
        }
        if all.total > 0 {
            all.success_rate = all.succeeded as f64 / all.total as f64;
        }
        all
    }
}

/// Result of one engagement poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub updated: usize,
    pub failed: usize,
}

/// Source of engagement metrics for a published share
#[async_trait]
pub trait EngagementProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, record: &ShareRecord, now: i64) -> Result<Engagement>;
}

/// Deterministic mock metrics
///
/// Each record gets a fixed audience and interaction rates seeded from its
/// id and platform. Metrics approach those totals as the share ages, so
/// repeated polls never see numbers go down.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedEngagement;

impl SimulatedEngagement {
    pub fn metrics_for(&self, record: &ShareRecord, now: i64) -> Engagement {
        if !record.success {
            return Engagement::default();
        }

        let (salt, reach_scale) = match record.platform.parse::<PlatformKind>() {
            Ok(PlatformKind::X) => (0x9e37_79b9_u64, 1.0),
            Ok(PlatformKind::LinkedIn) => (0x85eb_ca6b, 0.6),
            Ok(PlatformKind::Bluesky) => (0xc2b2_ae35, 0.4),
            Ok(PlatformKind::Facebook) => (0x27d4_eb2f, 0.8),
            Err(_) => (0x1656_67b1, 0.5),
        };
        let mut rng = StdRng::seed_from_u64((record.id as u64).wrapping_mul(31) ^ salt);

        let reach: f64 = rng.gen_range(200.0..2_000.0) * reach_scale;
        let like_rate: f64 = rng.gen_range(0.01..0.08);
        let share_rate: f64 = rng.gen_range(0.1..0.3);
        let comment_rate: f64 = rng.gen_range(0.05..0.2);

        let age_hours = (now - record.shared_at).max(0) as f64 / 3600.0;
        let progress = 1.0 - (-age_hours / 24.0).exp();

        let impressions = (reach * progress).floor();
        let likes = (impressions * like_rate).floor();
        Engagement {
            impressions: impressions as i64,
            likes: likes as i64,
            shares: (likes * share_rate).floor() as i64,
            comments: (likes * comment_rate).floor() as i64,
        }
    }
}

#[async_trait]
impl EngagementProvider for SimulatedEngagement {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn fetch(&self, record: &ShareRecord, now: i64) -> Result<Engagement> {
        Ok(self.metrics_for(record, now))
    }
}

/// Share log access for the orchestrators and `press-stats`
#[derive(Clone)]
pub struct Analytics {
    db: Database,
}

impl Analytics {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append the outcome of one share attempt
    pub async fn record(&self, post: &SourcePost, outcome: &ShareOutcome, now: i64) -> Result<i64> {
        let share = NewShare {
            post_id: post.id,
            post_title: &post.title,
            platform: outcome.platform.as_str(),
            success: outcome.success,
            remote_id: outcome.remote_id.as_deref(),
            remote_url: outcome.remote_url.as_deref(),
            error_category: outcome.category.map(|c| c.as_str()),
            error_message: outcome.error.as_deref(),
            attempt: outcome.attempt,
            shared_at: now,
        };
        self.db.insert_share(&share).await
    }

    pub async fn already_shared(&self, post_id: i64, platform: PlatformKind) -> Result<bool> {
        self.db.has_successful_share(post_id, platform.as_str()).await
    }

    /// Per-platform totals, optionally limited to shares at or after `since`
    pub async fn summary(&self, since: Option<i64>) -> Result<Vec<PlatformSummary>> {
        self.db.summarize_shares(since).await
    }

    /// Most recent share attempts, newest first
    pub async fn recent(&self, platform: Option<PlatformKind>, limit: usize) -> Result<Vec<ShareRecord>> {
        self.query(&ShareQuery {
            platform: platform.map(|p| p.as_str().to_string()),
            limit,
            ..Default::default()
        })
        .await
    }

    pub async fn query(&self, query: &ShareQuery) -> Result<Vec<ShareRecord>> {
        self.db.query_shares(query).await
    }

    /// Refresh metrics of successful shares not updated within `stale_after`
    ///
    /// A provider failure on one record is logged and counted; it does not
    /// stop the poll.
    pub async fn poll_engagement(
        &self,
        provider: &dyn EngagementProvider,
        now: i64,
        stale_after: Duration,
    ) -> Result<PollReport> {
        let stale_before = now - stale_after.as_secs() as i64;
        let records = self.db.shares_needing_metrics(stale_before, POLL_BATCH).await?;

        let mut report = PollReport::default();
        for record in &records {
            match provider.fetch(record, now).await {
                Ok(metrics) => {
                    self.db.update_metrics(record.id, &metrics, now).await?;
                    report.updated += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to fetch {} engagement for share {}: {}",
                        provider.name(),
                        record.id,
                        e
                    );
                    // Wait a full stale period before asking again
                    self.db.touch_metrics(record.id, now).await?;
                    report.failed += 1;
                }
            }
        }

        if report.updated > 0 || report.failed > 0 {
            tracing::info!(
                "Engagement poll ({}): {} updated, {} failed",
                provider.name(),
                report.updated,
                report.failed
            );
        }
        Ok(report)
    }
}

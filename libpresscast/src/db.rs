//! Database operations for Presscast
//!
//! Two tables carry the state of the system: `share_log`, the flat analytics
//! table with one row per share attempt, and `jobs`, the one-shot delayed
//! callbacks used for scheduled shares and retries. The rate limiter owns a
//! third table, `rate_limits`.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::analytics::{Engagement, PlatformSummary};
use crate::error::{DbError, Result};
use crate::types::{Job, JobKind, JobStatus, PlatformKind, ShareRecord, SourcePost};

/// Fields written for a new share log row
#[derive(Debug, Clone)]
pub struct NewShare<'a> {
    pub post_id: i64,
    pub post_title: &'a str,
    pub platform: &'a str,
    pub success: bool,
    pub remote_id: Option<&'a str>,
    pub remote_url: Option<&'a str>,
    pub error_category: Option<&'a str>,
    pub error_message: Option<&'a str>,
    pub attempt: u32,
    pub shared_at: i64,
}

/// Filter for share log queries
#[derive(Debug, Clone, Default)]
pub struct ShareQuery {
    pub platform: Option<String>,
    pub post_id: Option<i64>,
    pub since: Option<i64>,
    pub only_failures: bool,
    pub limit: usize,
}

/// A due job, or the id of a job row whose snapshot could not be read
#[derive(Debug, Clone)]
pub enum DueJob {
    Ready(Job),
    Corrupt { id: String, reason: String },
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at `db_path` and run migrations
    ///
    /// The special path `:memory:` opens a private in-memory database.
    pub async fn new(db_path: &str) -> Result<Self> {
        if db_path == ":memory:" {
            return Self::in_memory().await;
        }

        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }
        }

        // Forward slashes work for SQLite URLs on every platform
        let db_url = format!("sqlite://{}", expanded_path.replace('\\', "/"));
        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(DbError::SqlxError)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Open a throwaway in-memory database
    ///
    /// The pool is pinned to a single connection: every SQLite in-memory
    /// connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(DbError::MigrationError)?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // share_log
    // ------------------------------------------------------------------

    /// Append a row to the share log, returning its id
    pub async fn insert_share(&self, share: &NewShare<'_>) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO share_log (
                post_id, post_title, platform, success, remote_id, remote_url,
                error_category, error_message, attempt, shared_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(share.post_id)
        .bind(share.post_title)
        .bind(share.platform)
        .bind(share.success as i64)
        .bind(share.remote_id)
        .bind(share.remote_url)
        .bind(share.error_category)
        .bind(share.error_message)
        .bind(share.attempt as i64)
        .bind(share.shared_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.last_insert_rowid())
    }

    /// Whether the post already has a successful share on the platform
    pub async fn has_successful_share(&self, post_id: i64, platform: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM share_log
            WHERE post_id = ? AND platform = ? AND success = 1
            "#,
        )
        .bind(post_id)
        .bind(platform)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.get::<i64, _>("n") > 0)
    }

    /// Query the share log, newest first
    pub async fn query_shares(&self, query: &ShareQuery) -> Result<Vec<ShareRecord>> {
        let mut where_clauses = vec!["1=1"];
        if query.platform.is_some() {
            where_clauses.push("platform = ?");
        }
        if query.post_id.is_some() {
            where_clauses.push("post_id = ?");
        }
        if query.since.is_some() {
            where_clauses.push("shared_at >= ?");
        }
        if query.only_failures {
            where_clauses.push("success = 0");
        }

        let sql = format!(
            r#"
            SELECT * FROM share_log
            WHERE {}
            ORDER BY shared_at DESC, id DESC
            LIMIT ?
            "#,
            where_clauses.join(" AND ")
        );

        let mut q = sqlx::query(&sql);
        if let Some(platform) = &query.platform {
            q = q.bind(platform);
        }
        if let Some(post_id) = query.post_id {
            q = q.bind(post_id);
        }
        if let Some(since) = query.since {
            q = q.bind(since);
        }
        let limit = if query.limit == 0 { i64::MAX } else { query.limit as i64 };
        q = q.bind(limit);

        let rows = q.fetch_all(&self.pool).await.map_err(DbError::SqlxError)?;
        Ok(rows.iter().map(share_from_row).collect())
    }

    /// Successful shares whose metrics were never fetched or predate `stale_before`
    ///
    /// Never-fetched rows come first, then the least recently refreshed.
    pub async fn shares_needing_metrics(
        &self,
        stale_before: i64,
        limit: usize,
    ) -> Result<Vec<ShareRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM share_log
            WHERE success = 1
              AND (metrics_updated_at IS NULL OR metrics_updated_at < ?)
            ORDER BY metrics_updated_at IS NOT NULL, metrics_updated_at ASC, shared_at ASC
            LIMIT ?
            "#,
        )
        .bind(stale_before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(share_from_row).collect())
    }

    pub async fn update_metrics(&self, id: i64, metrics: &Engagement, now: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE share_log
            SET likes = ?, shares = ?, comments = ?, impressions = ?, metrics_updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(metrics.likes)
        .bind(metrics.shares)
        .bind(metrics.comments)
        .bind(metrics.impressions)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Mark a metrics fetch as attempted without changing the numbers
    ///
    /// Keeps a row that keeps failing from holding the head of the poll queue.
    pub async fn touch_metrics(&self, id: i64, now: i64) -> Result<()> {
        sqlx::query("UPDATE share_log SET metrics_updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Per-platform aggregates over the share log
    pub async fn summarize_shares(&self, since: Option<i64>) -> Result<Vec<PlatformSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT platform,
                   COUNT(*) AS total,
                   COALESCE(SUM(success), 0) AS succeeded,
                   COALESCE(SUM(likes), 0) AS likes,
                   COALESCE(SUM(shares), 0) AS shares,
                   COALESCE(SUM(comments), 0) AS comments,
                   COALESCE(SUM(impressions), 0) AS impressions
            FROM share_log
            WHERE shared_at >= ?
            GROUP BY platform
            ORDER BY platform
            "#,
        )
        .bind(since.unwrap_or(0))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| {
                let total: i64 = r.get("total");
                let succeeded: i64 = r.get("succeeded");
                PlatformSummary {
                    platform: r.get("platform"),
                    total,
                    succeeded,
                    failed: total - succeeded,
                    success_rate: if total > 0 {
                        succeeded as f64 / total as f64
                    } else {
                        0.0
                    },
                    likes: r.get("likes"),
                    shares: r.get("shares"),
                    comments: r.get("comments"),
                    impressions: r.get("impressions"),
                }
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // jobs
    // ------------------------------------------------------------------

    pub async fn insert_job(&self, job: &Job) -> Result<()> {
        let post_json = serde_json::to_string(&job.post).map_err(|e| DbError::CorruptRow {
            table: "jobs".to_string(),
            reason: format!("cannot serialize post snapshot: {}", e),
        })?;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, kind, post_id, post_json, platforms, run_at, attempt, status, last_error, created_at, forced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(job.kind.as_str())
        .bind(job.post.id)
        .bind(post_json)
        .bind(join_platforms(&job.platforms))
        .bind(job.run_at)
        .bind(job.attempt as i64)
        .bind(job.status.as_str())
        .bind(&job.last_error)
        .bind(job.created_at)
        .bind(job.force)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(job_from_row).transpose()
    }

    /// Pending jobs with `run_at <= now`, oldest first
    ///
    /// A row that cannot be decoded is returned as [`DueJob::Corrupt`] so the
    /// caller can fail it instead of retrying it forever.
    pub async fn due_jobs(&self, now: i64, limit: u32) -> Result<Vec<DueJob>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM jobs
            WHERE status = 'pending' AND run_at <= ?
            ORDER BY run_at ASC, created_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|row| match job_from_row(row) {
                Ok(job) => DueJob::Ready(job),
                Err(e) => DueJob::Corrupt {
                    id: row.get("id"),
                    reason: e.to_string(),
                },
            })
            .collect())
    }

    /// Atomically move a job from pending to running
    ///
    /// Returns false when another worker got there first or the job is gone.
    pub async fn claim_job(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = 'running', claimed_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn set_job_status(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE jobs SET status = ?, last_error = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Put running jobs claimed before `claimed_before` back to pending
    ///
    /// A worker that died between claim and completion leaves its job
    /// running; this hands it to the next poll.
    pub async fn requeue_stale_jobs(&self, claimed_before: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = 'pending', claimed_at = NULL
            WHERE status = 'running' AND (claimed_at IS NULL OR claimed_at < ?)
            "#,
        )
        .bind(claimed_before)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    /// Cancel a job if it has not started yet
    pub async fn cancel_job(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'cancelled' WHERE id = ? AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn reschedule_job(&self, id: &str, run_at: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET run_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(run_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>> {
        let limit = if limit == 0 { i64::MAX } else { limit as i64 };
        let rows = match status {
            Some(status) => {
                sqlx::query("SELECT * FROM jobs WHERE status = ? ORDER BY run_at ASC LIMIT ?")
                    .bind(status.as_str())
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM jobs ORDER BY run_at ASC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(DbError::SqlxError)?;

        rows.iter().map(job_from_row).collect()
    }

    pub async fn pending_jobs_for_post(&self, post_id: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query(
            "SELECT * FROM jobs WHERE post_id = ? AND status = 'pending' ORDER BY run_at ASC",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(job_from_row).collect()
    }
}

fn join_platforms(platforms: &[PlatformKind]) -> String {
    platforms
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn share_from_row(r: &SqliteRow) -> ShareRecord {
    ShareRecord {
        id: r.get("id"),
        post_id: r.get("post_id"),
        post_title: r.get("post_title"),
        platform: r.get("platform"),
        success: r.get::<i64, _>("success") != 0,
        remote_id: r.get("remote_id"),
        remote_url: r.get("remote_url"),
        error_category: r.get("error_category"),
        error_message: r.get("error_message"),
        attempt: r.get::<i64, _>("attempt") as u32,
        shared_at: r.get("shared_at"),
        likes: r.get("likes"),
        shares: r.get("shares"),
        comments: r.get("comments"),
        impressions: r.get("impressions"),
        metrics_updated_at: r.get("metrics_updated_at"),
    }
}

fn job_from_row(r: &SqliteRow) -> Result<Job> {
    let corrupt = |reason: String| DbError::CorruptRow {
        table: "jobs".to_string(),
        reason,
    };

    let post_json: String = r.get("post_json");
    let post: SourcePost = serde_json::from_str(&post_json)
        .map_err(|e| corrupt(format!("bad post snapshot: {}", e)))?;

    let platforms = PlatformKind::parse_list(&r.get::<String, _>("platforms"))
        .map_err(|e| corrupt(e.to_string()))?;
    let kind = JobKind::from_str(&r.get::<String, _>("kind")).map_err(|e| corrupt(e.to_string()))?;
    let status =
        JobStatus::from_str(&r.get::<String, _>("status")).map_err(|e| corrupt(e.to_string()))?;

    Ok(Job {
        id: r.get("id"),
        kind,
        post,
        platforms,
        run_at: r.get("run_at"),
        attempt: r.get::<i64, _>("attempt") as u32,
        status,
        last_error: r.get("last_error"),
        created_at: r.get("created_at"),
        force: r.get::<i64, _>("forced") != 0,
    })
}

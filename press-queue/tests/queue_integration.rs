//! Integration tests for press-queue

use assert_cmd::Command;
use libpresscast::scheduling::Scheduler;
use libpresscast::{Database, Job, JobStatus, PlatformKind, SourcePost};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

/// Test environment: config, database and an empty options file in a temp dir
struct TestEnv {
    _temp_dir: TempDir,
    config_path: String,
    db_path: String,
}

impl TestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let db_path = temp_dir.path().join("presscast.db");
        let options_path = temp_dir.path().join("options.json");

        let config_content = format!(
            r#"
[database]
path = "{}"

[credentials]
storage = "options"
path = "{}"

[bluesky]
[x]
"#,
            escape_path_for_toml(&db_path.to_string_lossy()),
            escape_path_for_toml(&options_path.to_string_lossy())
        );
        fs::write(&config_path, config_content).unwrap();

        Self {
            _temp_dir: temp_dir,
            config_path: config_path.to_string_lossy().to_string(),
            db_path: db_path.to_string_lossy().to_string(),
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("press-queue").unwrap();
        cmd.env("PRESSCAST_CONFIG", &self.config_path)
            .env_remove("PRESSCAST_DB_PATH")
            .env_remove("RUST_LOG");
        cmd
    }

    async fn scheduler(&self) -> Scheduler {
        Scheduler::new(Database::new(&self.db_path).await.unwrap())
    }

    /// Queue a share of post `id` to `platforms`, `offset` seconds from now
    async fn queue(&self, id: i64, title: &str, platforms: &[PlatformKind], offset: i64) -> Job {
        let post = SourcePost::new(id, title, format!("https://blog.example/{}", id));
        let run_at = chrono::Utc::now().timestamp() + offset;
        self.scheduler()
            .await
            .schedule_share(&post, platforms, run_at, false)
            .await
            .unwrap()
            .unwrap()
    }

    async fn job(&self, id: &str) -> Job {
        self.scheduler().await.get(id).await.unwrap().unwrap()
    }
}

// LIST

#[tokio::test]
async fn test_list_empty_queue() {
    let env = TestEnv::new();

    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[tokio::test]
async fn test_list_shows_pending_jobs_in_run_order() {
    let env = TestEnv::new();
    let later = env.queue(2, "Second post", &[PlatformKind::X], 7200).await;
    let sooner = env.queue(1, "First post", &[PlatformKind::Bluesky], 3600).await;

    let output = env.cmd().arg("list").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();

    let first = stdout.find(&sooner.id).unwrap();
    let second = stdout.find(&later.id).unwrap();
    assert!(first < second, "jobs should be ordered by run time:\n{}", stdout);
    assert!(stdout.contains("share | post 1: First post | bluesky | in "));
}

#[tokio::test]
async fn test_list_filters_by_platform() {
    let env = TestEnv::new();
    env.queue(1, "Bluesky only", &[PlatformKind::Bluesky], 3600).await;
    env.queue(2, "X only", &[PlatformKind::X], 3600).await;

    env.cmd()
        .args(["list", "--platform", "x"])
        .assert()
        .success()
        .stdout(predicate::str::contains("X only"))
        .stdout(predicate::str::contains("Bluesky only").not());
}

#[tokio::test]
async fn test_list_json_format() {
    let env = TestEnv::new();
    let job = env.queue(7, "Json post", &[PlatformKind::X, PlatformKind::Bluesky], 600).await;

    let output = env.cmd().args(["list", "--format", "json"]).output().unwrap();
    assert!(output.status.success());

    let jobs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let jobs = jobs.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], job.id.as_str());
    assert_eq!(jobs[0]["post"]["id"], 7);
    assert_eq!(jobs[0]["platforms"], serde_json::json!(["x", "bluesky"]));
}

#[tokio::test]
async fn test_list_invalid_format() {
    let env = TestEnv::new();

    env.cmd()
        .args(["list", "--format", "xml"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Invalid format"));
}

#[tokio::test]
async fn test_list_invalid_status() {
    let env = TestEnv::new();

    env.cmd()
        .args(["list", "--status", "sleeping"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Unknown job status"));
}

// CANCEL

#[tokio::test]
async fn test_cancel_single_job() {
    let env = TestEnv::new();
    let job = env.queue(1, "Post", &[PlatformKind::X], 3600).await;

    env.cmd()
        .args(["cancel", &job.id, "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Cancelled {}", job.id)));

    assert_eq!(env.job(&job.id).await.status, JobStatus::Cancelled);

    // Cancelled jobs are no longer listed as pending
    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(&job.id).not());

    env.cmd()
        .args(["list", "--status", "cancelled"])
        .assert()
        .success()
        .stdout(predicate::str::contains(&job.id));
}

#[tokio::test]
async fn test_cancel_unknown_job() {
    let env = TestEnv::new();

    env.cmd()
        .args(["cancel", "no-such-job", "--force"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Job not found: no-such-job"));
}

#[tokio::test]
async fn test_cancel_twice_fails() {
    let env = TestEnv::new();
    let job = env.queue(1, "Post", &[PlatformKind::X], 3600).await;

    env.cmd().args(["cancel", &job.id, "--force"]).assert().success();
    env.cmd()
        .args(["cancel", &job.id, "--force"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("is cancelled, not pending"));
}

#[tokio::test]
async fn test_cancel_all_with_force() {
    let env = TestEnv::new();
    env.queue(1, "One", &[PlatformKind::X], 3600).await;
    env.queue(2, "Two", &[PlatformKind::X], 7200).await;

    env.cmd()
        .args(["cancel", "--all", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cancelled 2 job(s)"));

    env.cmd()
        .args(["cancel", "--all", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No pending jobs to cancel"));
}

#[tokio::test]
async fn test_cancel_requires_job_id_or_all() {
    let env = TestEnv::new();

    env.cmd()
        .arg("cancel")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Specify a job ID or --all"));
}

#[tokio::test]
async fn test_cancel_without_force_needs_a_tty() {
    let env = TestEnv::new();
    let job = env.queue(1, "Post", &[PlatformKind::X], 3600).await;

    env.cmd()
        .args(["cancel", &job.id])
        .write_stdin("y\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    assert_eq!(env.job(&job.id).await.status, JobStatus::Pending);
}

// RESCHEDULE

#[tokio::test]
async fn test_reschedule_relative_shift() {
    let env = TestEnv::new();
    let job = env.queue(1, "Post", &[PlatformKind::X], 3600).await;

    env.cmd()
        .args(["reschedule", &job.id, "+1h"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rescheduled"));
    assert_eq!(env.job(&job.id).await.run_at, job.run_at + 3600);

    env.cmd()
        .args(["reschedule", &job.id, "-30m"])
        .assert()
        .success();
    assert_eq!(env.job(&job.id).await.run_at, job.run_at + 1800);
}

#[tokio::test]
async fn test_reschedule_with_duration_from_now() {
    let env = TestEnv::new();
    let job = env.queue(1, "Post", &[PlatformKind::X], 60).await;

    env.cmd()
        .args(["reschedule", &job.id, "2h"])
        .assert()
        .success();

    let expected = chrono::Utc::now().timestamp() + 7200;
    let run_at = env.job(&job.id).await.run_at;
    assert!((run_at - expected).abs() <= 10, "run_at {} vs {}", run_at, expected);
}

#[tokio::test]
async fn test_reschedule_to_past_fails() {
    let env = TestEnv::new();
    let job = env.queue(1, "Post", &[PlatformKind::X], 600).await;

    env.cmd()
        .args(["reschedule", &job.id, "-1h"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Cannot reschedule to the past"));

    assert_eq!(env.job(&job.id).await.run_at, job.run_at);
}

#[tokio::test]
async fn test_reschedule_invalid_time() {
    let env = TestEnv::new();
    let job = env.queue(1, "Post", &[PlatformKind::X], 600).await;

    env.cmd()
        .args(["reschedule", &job.id, "whenever"])
        .assert()
        .failure()
        .code(3);
}

// NOW

#[tokio::test]
async fn test_now_runs_job_and_reports_failure() {
    let env = TestEnv::new();
    let job = env.queue(3, "Post", &[PlatformKind::Bluesky], 3600).await;

    env.cmd()
        .args(["now", &job.id])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains(format!("Running {}", job.id)))
        .stdout(predicate::str::contains("bluesky:error:auth:"));

    assert_eq!(env.job(&job.id).await.status, JobStatus::Done);

    // A finished job cannot be run again
    env.cmd()
        .args(["now", &job.id])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("is done, not pending"));
}

#[tokio::test]
async fn test_now_unknown_job() {
    let env = TestEnv::new();

    env.cmd()
        .args(["now", "missing"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Job not found"));
}

// STATS

#[tokio::test]
async fn test_stats_empty_queue() {
    let env = TestEnv::new();

    env.cmd()
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 0"))
        .stdout(predicate::str::contains("Upcoming").not());
}

#[tokio::test]
async fn test_stats_counts_and_buckets() {
    let env = TestEnv::new();
    env.queue(1, "Soon", &[PlatformKind::X, PlatformKind::Bluesky], 600).await;
    env.queue(2, "Today", &[PlatformKind::X], 5 * 3600).await;
    env.queue(3, "Later", &[PlatformKind::Bluesky], 30 * 86_400).await;

    env.cmd()
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 3 (0 retries)"))
        .stdout(predicate::str::contains("  x: 2"))
        .stdout(predicate::str::contains("  bluesky: 2"))
        .stdout(predicate::str::contains("Next hour: 1"))
        .stdout(predicate::str::contains("Today: 1"))
        .stdout(predicate::str::contains("Later: 1"))
        .stdout(predicate::str::contains("Upcoming"));

    let output = env.cmd().args(["stats", "--format", "json"]).output().unwrap();
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["total"], 3);
    assert_eq!(stats["platforms"]["x"], 2);
    assert_eq!(stats["upcoming"].as_array().unwrap().len(), 3);
}

//! CLI integration tests for press-bulk

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "\\\\")
}

fn setup_test_env(platform_sections: &str) -> (TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let config = format!(
        r#"
[database]
path = "{}"

[credentials]
storage = "options"
path = "{}"

{}
"#,
        escape_path_for_toml(&temp_dir.path().join("presscast.db")),
        escape_path_for_toml(&temp_dir.path().join("options.json")),
        platform_sections
    );
    fs::write(&config_path, config).unwrap();

    let config_path = config_path.to_string_lossy().to_string();
    (temp_dir, config_path)
}

fn posts(count: i64) -> String {
    let posts: Vec<serde_json::Value> = (1..=count)
        .map(|id| {
            serde_json::json!({
                "id": id,
                "title": format!("Post {}", id),
                "url": format!("https://blog.example/{}", id),
            })
        })
        .collect();
    serde_json::Value::Array(posts).to_string()
}

fn press_bulk(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("press-bulk").unwrap();
    cmd.env("PRESSCAST_CONFIG", config_path)
        .env_remove("PRESSCAST_DB_PATH");
    cmd
}

#[test]
fn test_help_flag_output() {
    Command::cargo_bin("press-bulk")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--stagger"))
        .stdout(predicate::str::contains("--wp-ids"))
        .stdout(predicate::str::contains("--force"));
}

#[test]
fn test_empty_list_is_invalid_input() {
    let (_temp, config_path) = setup_test_env("[bluesky]\n");

    press_bulk(&config_path)
        .write_stdin("[]")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("No posts to share"));
}

#[test]
fn test_invalid_stagger_is_invalid_input() {
    let (_temp, config_path) = setup_test_env("[bluesky]\n");

    press_bulk(&config_path)
        .args(["--stagger", "soonish"])
        .write_stdin(posts(2))
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Invalid delay"));
}

#[test]
fn test_stagger_shares_first_and_queues_the_rest() {
    let (_temp, config_path) = setup_test_env("[bluesky]\n");

    // No Bluesky credentials: the first post fails, the others are queued
    press_bulk(&config_path)
        .args(["--stagger", "10m"])
        .write_stdin(posts(3))
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("1:failed:"))
        .stdout(predicate::str::contains("2:scheduled:"))
        .stdout(predicate::str::contains("3:scheduled:"))
        .stderr(predicate::str::contains(
            "0 published, 2 scheduled, 0 skipped, 1 failed",
        ));
}

#[test]
fn test_json_report() {
    let (temp, config_path) = setup_test_env("[bluesky]\n");
    let file = temp.path().join("posts.json");
    fs::write(&file, posts(2)).unwrap();

    let output = press_bulk(&config_path)
        .args(["--stagger", "1h", "--format", "json", "--file"])
        .arg(&file)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["failed"], 1);
    assert_eq!(report["scheduled"], 1);
    assert_eq!(report["items"][1]["status"], "scheduled");
    assert!(report["items"][1]["job_id"].is_string());
}

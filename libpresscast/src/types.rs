//! Core types for Presscast

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::PresscastError;
use crate::recovery::{ErrorCategory, RecoveryAction};

/// A post as it exists in the CMS
///
/// This is the input to every pipeline: the publish hook, manual shares, bulk
/// runs and the job snapshots the daemon replays later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourcePost {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub content: String,
    pub url: String,
    #[serde(default = "default_post_type")]
    pub post_type: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub featured_image: Option<String>,
    /// Per-post opt-out flag
    #[serde(default)]
    pub skip_share: bool,
    #[serde(default)]
    pub password_protected: bool,
}

fn default_post_type() -> String {
    "post".to_string()
}

fn default_status() -> String {
    "publish".to_string()
}

impl SourcePost {
    /// Create a minimal published post, mostly useful in tests and demos
    pub fn new(id: i64, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            excerpt: String::new(),
            content: String::new(),
            url: url.into(),
            post_type: default_post_type(),
            status: default_status(),
            author: None,
            categories: Vec::new(),
            tags: Vec::new(),
            featured_image: None,
            skip_share: false,
            password_protected: false,
        }
    }

    /// Parse a post from JSON, accepting either one object or a one-element array
    pub fn from_json(input: &str) -> crate::Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(PresscastError::InvalidInput("Post JSON is empty".to_string()));
        }

        if trimmed.starts_with('[') {
            let mut posts = Self::list_from_json(trimmed)?;
            if posts.len() != 1 {
                return Err(PresscastError::InvalidInput(format!(
                    "Expected a single post, got {}",
                    posts.len()
                )));
            }
            return Ok(posts.remove(0));
        }

        serde_json::from_str(trimmed)
            .map_err(|e| PresscastError::InvalidInput(format!("Invalid post JSON: {}", e)))
    }

    /// Parse a JSON array of posts
    pub fn list_from_json(input: &str) -> crate::Result<Vec<Self>> {
        serde_json::from_str(input.trim())
            .map_err(|e| PresscastError::InvalidInput(format!("Invalid post list JSON: {}", e)))
    }
}

/// The social networks Presscast can share to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    X,
    LinkedIn,
    Bluesky,
    Facebook,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 4] = [
        PlatformKind::X,
        PlatformKind::LinkedIn,
        PlatformKind::Bluesky,
        PlatformKind::Facebook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::X => "x",
            PlatformKind::LinkedIn => "linkedin",
            PlatformKind::Bluesky => "bluesky",
            PlatformKind::Facebook => "facebook",
        }
    }

    /// Human-facing name used in log lines and CLI output
    pub fn display_name(&self) -> &'static str {
        match self {
            PlatformKind::X => "X",
            PlatformKind::LinkedIn => "LinkedIn",
            PlatformKind::Bluesky => "Bluesky",
            PlatformKind::Facebook => "Facebook",
        }
    }

    /// Credential service name, e.g. `presscast.linkedin`
    pub fn service(&self) -> String {
        format!("presscast.{}", self.as_str())
    }

    /// Parse a comma-separated platform list such as `x,bluesky`
    pub fn parse_list(input: &str) -> crate::Result<Vec<PlatformKind>> {
        let mut platforms = Vec::new();
        for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let kind: PlatformKind = part.parse()?;
            if !platforms.contains(&kind) {
                platforms.push(kind);
            }
        }
        Ok(platforms)
    }
}

impl FromStr for PlatformKind {
    type Err = PresscastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "x" | "twitter" => Ok(PlatformKind::X),
            "linkedin" => Ok(PlatformKind::LinkedIn),
            "bluesky" | "bsky" => Ok(PlatformKind::Bluesky),
            "facebook" | "fb" => Ok(PlatformKind::Facebook),
            other => Err(PresscastError::InvalidInput(format!(
                "Unknown platform '{}'. Valid platforms: x, linkedin, bluesky, facebook",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform-ready text produced by the formatter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormattedPost {
    pub platform: PlatformKind,
    pub text: String,
    /// Link sent alongside the text (card/preview URL)
    pub link: Option<String>,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
}

/// Identifier of a successfully created remote post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishedPost {
    pub remote_id: String,
    pub url: Option<String>,
}

/// Result of sharing one post to one platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareOutcome {
    pub platform: PlatformKind,
    pub success: bool,
    pub remote_id: Option<String>,
    pub remote_url: Option<String>,
    pub error: Option<String>,
    pub category: Option<ErrorCategory>,
    pub recovery: Option<RecoveryAction>,
    pub attempt: u32,
}

impl ShareOutcome {
    pub fn succeeded(platform: PlatformKind, published: PublishedPost, attempt: u32) -> Self {
        Self {
            platform,
            success: true,
            remote_id: Some(published.remote_id),
            remote_url: published.url,
            error: None,
            category: None,
            recovery: None,
            attempt,
        }
    }

    pub fn failed(platform: PlatformKind, error: &PresscastError, attempt: u32) -> Self {
        Self {
            platform,
            success: false,
            remote_id: None,
            remote_url: None,
            error: Some(error.to_string()),
            category: Some(crate::recovery::classify(error)),
            recovery: None,
            attempt,
        }
    }
}

/// A row of the share log analytics table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShareRecord {
    pub id: i64,
    pub post_id: i64,
    pub post_title: String,
    pub platform: String,
    pub success: bool,
    pub remote_id: Option<String>,
    pub remote_url: Option<String>,
    pub error_category: Option<String>,
    pub error_message: Option<String>,
    pub attempt: u32,
    pub shared_at: i64,
    pub likes: i64,
    pub shares: i64,
    pub comments: i64,
    pub impressions: i64,
    pub metrics_updated_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Share,
    Retry,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Share => "share",
            JobKind::Retry => "retry",
        }
    }
}

impl FromStr for JobKind {
    type Err = PresscastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "share" => Ok(JobKind::Share),
            "retry" => Ok(JobKind::Retry),
            other => Err(PresscastError::InvalidInput(format!("Unknown job kind '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for JobStatus {
    type Err = PresscastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(PresscastError::InvalidInput(format!(
                "Unknown job status '{}'",
                other
            ))),
        }
    }
}

/// A one-shot delayed callback: share a post snapshot later, or retry one platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub post: SourcePost,
    pub platforms: Vec<PlatformKind>,
    pub run_at: i64,
    pub attempt: u32,
    pub status: JobStatus,
    pub last_error: Option<String>,
    pub created_at: i64,
    /// Share even to platforms the post is already on
    #[serde(default)]
    pub force: bool,
}

impl Job {
    pub fn new(kind: JobKind, post: SourcePost, platforms: Vec<PlatformKind>, run_at: i64, attempt: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            post,
            platforms,
            run_at,
            attempt,
            status: JobStatus::Pending,
            last_error: None,
            created_at: chrono::Utc::now().timestamp(),
            force: false,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

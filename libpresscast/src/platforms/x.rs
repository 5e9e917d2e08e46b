//! X platform implementation
//!
//! Posts through the v2 API with OAuth 1.0a user-context signing. The
//! account username is looked up during authentication so that published
//! posts can be linked.

use async_trait::async_trait;
use serde::Deserialize;

use crate::credentials::XCredentials;
use crate::error::{PlatformError, Result};
use crate::http::{self, HttpFailure};
use crate::oauth::OAuth1Signer;
use crate::platforms::Platform;
use crate::types::{FormattedPost, PlatformKind, PublishedPost};

pub const DEFAULT_API_BASE: &str = "https://api.x.com";

const NAME: &str = "X";

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

pub struct XClient {
    client: reqwest::Client,
    api_base: String,
    signer: OAuth1Signer,
    configured: bool,
    username: Option<String>,
    user_id: Option<String>,
}

impl XClient {
    pub fn new(credentials: XCredentials, api_base: Option<String>) -> Result<Self> {
        let configured = !credentials.api_key.is_empty() && !credentials.access_token.is_empty();
        Ok(Self {
            client: http::build_client(http::DEFAULT_TIMEOUT)?,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            signer: OAuth1Signer::from_credentials(&credentials),
            configured,
            username: None,
            user_id: None,
        })
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Map an X error response, including duplicate-content rejections
    async fn failure(response: reqwest::Response) -> PlatformError {
        let reset = response
            .headers()
            .get("x-rate-limit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok());

        let mut failure = HttpFailure::read(response).await;
        if failure.retry_after.is_none() {
            if let Some(reset) = reset {
                let wait = reset - chrono::Utc::now().timestamp();
                failure.retry_after = Some(wait.max(1) as u64);
            }
        }

        if failure.status == 403 && failure.body.to_lowercase().contains("duplicate") {
            return PlatformError::Validation(format!(
                "X rejected duplicate content: {}",
                failure.summary()
            ));
        }

        failure.into_error(NAME)
    }
}

#[async_trait]
impl Platform for XClient {
    async fn authenticate(&mut self) -> Result<()> {
        let url = format!("{}/2/users/me", self.api_base);
        let auth = self.signer.authorization_header("GET", &url, &[], &[])?;

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|e| http::transport_error(NAME, e))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await.into());
        }

        let me: DataEnvelope<UserData> = http::read_json(NAME, response).await?;
        tracing::debug!("Authenticated with X as @{}", me.data.username);
        self.username = Some(me.data.username);
        self.user_id = Some(me.data.id);
        Ok(())
    }

    async fn publish(&self, post: &FormattedPost) -> Result<PublishedPost> {
        let username = self.username.as_deref().ok_or_else(|| {
            PlatformError::Authentication("X client is not authenticated".to_string())
        })?;

        let url = format!("{}/2/tweets", self.api_base);
        // JSON bodies are not part of the OAuth 1.0a signature
        let auth = self.signer.authorization_header("POST", &url, &[], &[])?;

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .json(&serde_json::json!({ "text": post.text }))
            .send()
            .await
            .map_err(|e| http::transport_error(NAME, e))?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await.into());
        }

        let created: DataEnvelope<TweetData> = http::read_json(NAME, response).await?;
        let id = created.data.id;
        Ok(PublishedPost {
            url: Some(format!("https://x.com/{}/status/{}", username, id)),
            remote_id: id,
        })
    }

    fn kind(&self) -> PlatformKind {
        PlatformKind::X
    }

    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}

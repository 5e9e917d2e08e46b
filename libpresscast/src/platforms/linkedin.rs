//! LinkedIn platform implementation
//!
//! Shares are created through the UGC posts API as article shares. When no
//! author URN is stored, the member URN is discovered from the OpenID
//! `userinfo` endpoint during authentication.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::credentials::LinkedInCredentials;
use crate::error::{PlatformError, Result};
use crate::http::{self, HttpFailure};
use crate::platforms::Platform;
use crate::types::{FormattedPost, PlatformKind, PublishedPost};

pub const DEFAULT_API_BASE: &str = "https://api.linkedin.com";

const NAME: &str = "LinkedIn";

/// LinkedIn caps article descriptions shown in the preview card
const MAX_DESCRIPTION_CHARS: usize = 256;

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
}

#[derive(Debug, Deserialize, Default)]
struct CreatedShare {
    #[serde(default)]
    id: Option<String>,
}

pub struct LinkedInClient {
    client: reqwest::Client,
    api_base: String,
    access_token: SecretString,
    author: Option<String>,
    authenticated: bool,
}

impl LinkedInClient {
    pub fn new(credentials: LinkedInCredentials, api_base: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http::build_client(http::DEFAULT_TIMEOUT)?,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            access_token: credentials.access_token,
            author: credentials.author_urn,
            authenticated: false,
        })
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    fn share_body(&self, author: &str, post: &FormattedPost) -> serde_json::Value {
        let content = match &post.link {
            Some(link) => {
                let description: String = post.description.chars().take(MAX_DESCRIPTION_CHARS).collect();
                serde_json::json!({
                    "shareCommentary": { "text": post.text },
                    "shareMediaCategory": "ARTICLE",
                    "media": [{
                        "status": "READY",
                        "originalUrl": link,
                        "title": { "text": post.title },
                        "description": { "text": description },
                    }],
                })
            }
            None => serde_json::json!({
                "shareCommentary": { "text": post.text },
                "shareMediaCategory": "NONE",
            }),
        };

        serde_json::json!({
            "author": author,
            "lifecycleState": "PUBLISHED",
            "specificContent": { "com.linkedin.ugc.ShareContent": content },
            "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" },
        })
    }
}

#[async_trait]
impl Platform for LinkedInClient {
    async fn authenticate(&mut self) -> Result<()> {
        if self.author.is_some() {
            // Organization tokens usually lack the openid scope; the token
            // is checked on the first share instead
            self.authenticated = true;
            return Ok(());
        }

        let response = self
            .client
            .get(format!("{}/v2/userinfo", self.api_base))
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| http::transport_error(NAME, e))?;
        let response = http::check(NAME, response).await?;
        let info: UserInfo = http::read_json(NAME, response).await?;

        tracing::debug!("Discovered LinkedIn member {}", info.sub);
        self.author = Some(format!("urn:li:person:{}", info.sub));
        self.authenticated = true;
        Ok(())
    }

    async fn publish(&self, post: &FormattedPost) -> Result<PublishedPost> {
        let author = match (&self.author, self.authenticated) {
            (Some(author), true) => author,
            _ => {
                return Err(PlatformError::Authentication(
                    "LinkedIn client is not authenticated".to_string(),
                )
                .into())
            }
        };

        let response = self
            .client
            .post(format!("{}/v2/ugcPosts", self.api_base))
            .bearer_auth(self.access_token.expose_secret())
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&self.share_body(author, post))
            .send()
            .await
            .map_err(|e| http::transport_error(NAME, e))?;

        if !response.status().is_success() {
            return Err(HttpFailure::read(response).await.into_error(NAME).into());
        }

        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        let created: CreatedShare = serde_json::from_str(&body).unwrap_or_default();

        let id = header_id.or(created.id).ok_or_else(|| {
            PlatformError::Posting("LinkedIn accepted the share but returned no id".to_string())
        })?;

        Ok(PublishedPost {
            url: Some(format!("https://www.linkedin.com/feed/update/{}", id)),
            remote_id: id,
        })
    }

    fn kind(&self) -> PlatformKind {
        PlatformKind::LinkedIn
    }

    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self) -> bool {
        !self.access_token.expose_secret().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PresscastError;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials(author: Option<&str>) -> LinkedInCredentials {
        LinkedInCredentials {
            access_token: SecretString::from("li-token".to_string()),
            author_urn: author.map(str::to_string),
        }
    }

    fn post() -> FormattedPost {
        FormattedPost {
            platform: PlatformKind::LinkedIn,
            text: "New on the blog: Rust tips".to_string(),
            link: Some("https://blog.example/rust-tips".to_string()),
            title: "Rust tips".to_string(),
            description: "Practical advice".to_string(),
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_discovers_author_and_publishes_article() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/userinfo"))
            .and(header("authorization", "Bearer li-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"sub": "abc123"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/ugcPosts"))
            .and(header("x-restli-protocol-version", "2.0.0"))
            .and(body_partial_json(serde_json::json!({
                "author": "urn:li:person:abc123",
                "specificContent": {"com.linkedin.ugc.ShareContent": {
                    "shareMediaCategory": "ARTICLE"
                }}
            })))
            .respond_with(
                ResponseTemplate::new(201).insert_header("x-restli-id", "urn:li:share:777"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut client = LinkedInClient::new(credentials(None), Some(server.uri())).unwrap();
        client.authenticate().await.unwrap();
        assert_eq!(client.author(), Some("urn:li:person:abc123"));

        let published = client.publish(&post()).await.unwrap();
        assert_eq!(published.remote_id, "urn:li:share:777");
        assert_eq!(
            published.url.as_deref(),
            Some("https://www.linkedin.com/feed/update/urn:li:share:777")
        );
    }

    #[tokio::test]
    async fn test_stored_author_skips_discovery_and_reads_body_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/ugcPosts"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"id": "urn:li:ugcPost:9"})),
            )
            .mount(&server)
            .await;

        let mut client = LinkedInClient::new(
            credentials(Some("urn:li:organization:5")),
            Some(server.uri()),
        )
        .unwrap();
        client.authenticate().await.unwrap();
        let published = client.publish(&post()).await.unwrap();
        assert_eq!(published.remote_id, "urn:li:ugcPost:9");
    }

    #[tokio::test]
    async fn test_expired_token_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/userinfo"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "serviceErrorCode": 65601,
                "message": "The token used in the request has been revoked by the user",
                "status": 401
            })))
            .mount(&server)
            .await;

        let mut client = LinkedInClient::new(credentials(None), Some(server.uri())).unwrap();
        let err = client.authenticate().await.unwrap_err();
        assert!(matches!(
            err,
            PresscastError::Platform(PlatformError::Authentication(_))
        ));
        assert!(err.to_string().contains("revoked"));
    }

    #[test]
    fn test_share_without_link_has_no_media() {
        let client = LinkedInClient::new(credentials(Some("urn:li:person:1")), None).unwrap();
        let mut plain = post();
        plain.link = None;
        let body = client.share_body("urn:li:person:1", &plain);
        let content = &body["specificContent"]["com.linkedin.ugc.ShareContent"];
        assert_eq!(content["shareMediaCategory"], "NONE");
        assert!(content.get("media").is_none());
    }
}

//! Bluesky platform implementation
//!
//! Talks XRPC directly to the account's PDS: an app-password session from
//! `com.atproto.server.createSession`, then `com.atproto.repo.createRecord`
//! for each post. Links and hashtags in the text become rich-text facets and
//! the article link is attached as an external embed card.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::credentials::BlueskyCredentials;
use crate::error::{PlatformError, Result};
use crate::http::{self, HttpFailure};
use crate::platforms::Platform;
use crate::types::{FormattedPost, PlatformKind, PublishedPost};

pub const DEFAULT_API_BASE: &str = "https://bsky.social";

const NAME: &str = "Bluesky";

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s]+[^\s.,;:!?)\]]").expect("static regex"));

static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)(#[\p{L}\p{N}_]+)").expect("static regex"));

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    access_jwt: String,
    did: String,
    handle: String,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    uri: String,
}

struct Session {
    access_jwt: SecretString,
    did: String,
}

/// Map Bluesky/AT Protocol errors to PlatformError
///
/// XRPC errors carry an error name (`AuthenticationRequired`,
/// `InvalidRequest`, ...) alongside the HTTP status. Names are checked
/// first, then the generic status mapping applies.
fn map_bluesky_error(failure: HttpFailure, context: &str) -> PlatformError {
    let (name, message) = failure
        .json()
        .map(|value| {
            (
                value["error"].as_str().unwrap_or_default().to_string(),
                value["message"].as_str().unwrap_or_default().to_string(),
            )
        })
        .unwrap_or_default();
    let detail = if message.is_empty() { name.clone() } else { message };

    // Authentication errors
    if failure.status == 401
        || matches!(
            name.as_str(),
            "AuthenticationRequired" | "InvalidToken" | "ExpiredToken" | "AccountTakedown"
        )
    {
        return PlatformError::Authentication(format!(
            "Bluesky authentication failed during {}: {}. Please check your handle and app password.",
            context, detail
        ));
    }

    // Rate limiting
    if failure.status == 429 || name == "RateLimitExceeded" {
        let suffix = failure
            .retry_after
            .map(|secs| format!(" (retry after {}s)", secs))
            .unwrap_or_default();
        return PlatformError::RateLimit(format!(
            "Bluesky rate limit exceeded during {}: {}{}",
            context, detail, suffix
        ));
    }

    // Validation errors
    if matches!(name.as_str(), "InvalidRequest" | "InvalidRecord" | "BlobTooLarge") {
        return PlatformError::Validation(format!(
            "Bluesky rejected the post during {}: {}",
            context, detail
        ));
    }

    failure.into_error(NAME)
}

/// Rich-text facets for links and hashtags, indexed by UTF-8 byte offsets
pub fn build_facets(text: &str) -> Vec<serde_json::Value> {
    let mut facets = Vec::new();

    for m in URL_PATTERN.find_iter(text) {
        facets.push(serde_json::json!({
            "index": { "byteStart": m.start(), "byteEnd": m.end() },
            "features": [{ "$type": "app.bsky.richtext.facet#link", "uri": m.as_str() }],
        }));
    }

    for caps in TAG_PATTERN.captures_iter(text) {
        if let Some(tag) = caps.get(1) {
            facets.push(serde_json::json!({
                "index": { "byteStart": tag.start(), "byteEnd": tag.end() },
                "features": [{ "$type": "app.bsky.richtext.facet#tag", "tag": &tag.as_str()[1..] }],
            }));
        }
    }

    facets
}

/// The record key is the last path segment of an `at://` URI
fn record_key(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

pub struct BlueskyClient {
    client: reqwest::Client,
    api_base: String,
    handle: String,
    app_password: SecretString,
    session: Option<Session>,
}

impl BlueskyClient {
    pub fn new(credentials: BlueskyCredentials, api_base: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http::build_client(http::DEFAULT_TIMEOUT)?,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            handle: credentials.handle,
            app_password: credentials.app_password,
            session: None,
        })
    }

    pub fn did(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.did.as_str())
    }

    fn record(&self, post: &FormattedPost) -> serde_json::Value {
        let mut record = serde_json::json!({
            "$type": "app.bsky.feed.post",
            "text": post.text,
            "createdAt": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        });

        let facets = build_facets(&post.text);
        if !facets.is_empty() {
            record["facets"] = serde_json::Value::Array(facets);
        }

        if let Some(link) = &post.link {
            record["embed"] = serde_json::json!({
                "$type": "app.bsky.embed.external",
                "external": {
                    "uri": link,
                    "title": post.title,
                    "description": post.description,
                },
            });
        }

        record
    }

    async fn failure(response: reqwest::Response) -> HttpFailure {
        let reset = response
            .headers()
            .get("ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok());

        let mut failure = HttpFailure::read(response).await;
        if failure.retry_after.is_none() {
            if let Some(reset) = reset {
                let wait = reset - chrono::Utc::now().timestamp();
                failure.retry_after = Some(wait.max(1) as u64);
            }
        }
        failure
    }
}

#[async_trait]
impl Platform for BlueskyClient {
    async fn authenticate(&mut self) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/xrpc/com.atproto.server.createSession", self.api_base))
            .json(&serde_json::json!({
                "identifier": self.handle,
                "password": self.app_password.expose_secret(),
            }))
            .send()
            .await
            .map_err(|e| http::transport_error(NAME, e))?;

        if !response.status().is_success() {
            return Err(map_bluesky_error(Self::failure(response).await, "authentication").into());
        }

        let session: SessionResponse = http::read_json(NAME, response).await?;
        tracing::debug!("Authenticated with Bluesky as {} ({})", session.handle, session.did);
        self.session = Some(Session {
            access_jwt: SecretString::from(session.access_jwt),
            did: session.did,
        });
        Ok(())
    }

    async fn publish(&self, post: &FormattedPost) -> Result<PublishedPost> {
        let session = self.session.as_ref().ok_or_else(|| {
            PlatformError::Authentication("Bluesky client is not authenticated".to_string())
        })?;

        let response = self
            .client
            .post(format!("{}/xrpc/com.atproto.repo.createRecord", self.api_base))
            .bearer_auth(session.access_jwt.expose_secret())
            .json(&serde_json::json!({
                "repo": session.did,
                "collection": "app.bsky.feed.post",
                "record": self.record(post),
            }))
            .send()
            .await
            .map_err(|e| http::transport_error(NAME, e))?;

        if !response.status().is_success() {
            return Err(map_bluesky_error(Self::failure(response).await, "posting").into());
        }

        let created: CreateRecordResponse = http::read_json(NAME, response).await?;
        Ok(PublishedPost {
            url: Some(format!(
                "https://bsky.app/profile/{}/post/{}",
                session.did,
                record_key(&created.uri)
            )),
            remote_id: created.uri,
        })
    }

    fn kind(&self) -> PlatformKind {
        PlatformKind::Bluesky
    }

    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self) -> bool {
        !self.handle.is_empty() && !self.app_password.expose_secret().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PresscastError;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> BlueskyCredentials {
        BlueskyCredentials {
            handle: "alice.bsky.social".to_string(),
            app_password: SecretString::from("xxxx-xxxx-xxxx-xxxx".to_string()),
        }
    }

    fn failure(status: u16, body: serde_json::Value) -> HttpFailure {
        HttpFailure {
            status,
            retry_after: None,
            body: body.to_string(),
        }
    }

    async fn server_with_session() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createSession"))
            .and(body_partial_json(serde_json::json!({"identifier": "alice.bsky.social"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessJwt": "jwt-access",
                "refreshJwt": "jwt-refresh",
                "handle": "alice.bsky.social",
                "did": "did:plc:alice"
            })))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_link_facets_use_byte_offsets() {
        let text = "Café post https://blog.example/café";
        let facets = build_facets(text);
        assert_eq!(facets.len(), 1);
        let start = facets[0]["index"]["byteStart"].as_u64().unwrap() as usize;
        let end = facets[0]["index"]["byteEnd"].as_u64().unwrap() as usize;
        // "Café " is 6 bytes, "post " 5 more
        assert_eq!(start, 11);
        assert_eq!(&text[start..end], "https://blog.example/café");
    }

    #[test]
    fn test_trailing_punctuation_is_not_part_of_link() {
        let facets = build_facets("Read it at https://blog.example/post.");
        assert_eq!(facets[0]["features"][0]["uri"], "https://blog.example/post");
    }

    #[test]
    fn test_tag_facets() {
        let facets = build_facets("New post #rust #async_io");
        let tags: Vec<&str> = facets
            .iter()
            .map(|f| f["features"][0]["tag"].as_str().unwrap())
            .collect();
        assert_eq!(tags, vec!["rust", "async_io"]);
        assert_eq!(facets[0]["index"]["byteStart"], 9);
    }

    #[test]
    fn test_error_mapping() {
        let err = map_bluesky_error(
            failure(400, serde_json::json!({"error": "ExpiredToken", "message": "Token has expired"})),
            "posting",
        );
        assert!(matches!(err, PlatformError::Authentication(_)));

        let err = map_bluesky_error(
            failure(400, serde_json::json!({"error": "InvalidRequest", "message": "Record/text must not be longer than 300 graphemes"})),
            "posting",
        );
        assert!(matches!(err, PlatformError::Validation(_)));

        let mut limited = failure(429, serde_json::json!({"error": "RateLimitExceeded", "message": "Rate Limit Exceeded"}));
        limited.retry_after = Some(120);
        let err = map_bluesky_error(limited, "posting");
        assert!(matches!(err, PlatformError::RateLimit(_)));
        assert!(err.to_string().contains("(retry after 120s)"));

        let err = map_bluesky_error(
            failure(502, serde_json::json!({"error": "UpstreamFailure"})),
            "posting",
        );
        assert!(matches!(err, PlatformError::Network(_)));
    }

    #[tokio::test]
    async fn test_authenticate_and_publish_with_embed() {
        let server = server_with_session().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.repo.createRecord"))
            .and(header("authorization", "Bearer jwt-access"))
            .and(body_partial_json(serde_json::json!({
                "repo": "did:plc:alice",
                "collection": "app.bsky.feed.post",
                "record": {
                    "text": "Hello https://blog.example/hello",
                    "embed": {"external": {"uri": "https://blog.example/hello"}}
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "uri": "at://did:plc:alice/app.bsky.feed.post/3kabc",
                "cid": "bafyrei"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = BlueskyClient::new(credentials(), Some(server.uri())).unwrap();
        client.authenticate().await.unwrap();
        assert_eq!(client.did(), Some("did:plc:alice"));

        let post = FormattedPost {
            platform: PlatformKind::Bluesky,
            text: "Hello https://blog.example/hello".to_string(),
            link: Some("https://blog.example/hello".to_string()),
            title: "Hello".to_string(),
            description: "First post".to_string(),
            image_url: None,
        };
        let published = client.publish(&post).await.unwrap();
        assert_eq!(published.remote_id, "at://did:plc:alice/app.bsky.feed.post/3kabc");
        assert_eq!(
            published.url.as_deref(),
            Some("https://bsky.app/profile/did:plc:alice/post/3kabc")
        );
    }

    #[tokio::test]
    async fn test_publish_without_session_fails() {
        let client = BlueskyClient::new(credentials(), Some("http://127.0.0.1:1".to_string())).unwrap();
        let post = FormattedPost {
            platform: PlatformKind::Bluesky,
            text: "hi".to_string(),
            link: None,
            title: String::new(),
            description: String::new(),
            image_url: None,
        };
        let err = client.publish(&post).await.unwrap_err();
        assert!(matches!(
            err,
            PresscastError::Platform(PlatformError::Authentication(_))
        ));
    }
}

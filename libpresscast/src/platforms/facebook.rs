//! Facebook page platform implementation
//!
//! Publishes link posts to a page feed through the Graph API using a page
//! access token.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::credentials::FacebookCredentials;
use crate::error::{PlatformError, Result};
use crate::http::{self, HttpFailure};
use crate::platforms::Platform;
use crate::types::{FormattedPost, PlatformKind, PublishedPost};

pub const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v19.0";

const NAME: &str = "Facebook";

#[derive(Debug, Deserialize)]
struct PageInfo {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: String,
}

/// Map a Graph API error response by its error code
///
/// See <https://developers.facebook.com/docs/graph-api/guides/error-handling>
fn map_graph_error(failure: HttpFailure) -> PlatformError {
    let code = failure
        .json()
        .and_then(|value| value.pointer("/error/code").and_then(|c| c.as_i64()));
    let message = format!("{}: {}", NAME, failure.summary());

    match code {
        Some(190) | Some(102) | Some(10) | Some(200) => PlatformError::Authentication(message),
        Some(4) | Some(17) | Some(32) | Some(613) => match failure.retry_after {
            Some(secs) => PlatformError::RateLimit(format!("{} (retry after {}s)", message, secs)),
            None => PlatformError::RateLimit(message),
        },
        Some(368) | Some(506) | Some(100) => PlatformError::Validation(message),
        Some(1) | Some(2) => PlatformError::Network(message),
        _ => failure.into_error(NAME),
    }
}

pub struct FacebookClient {
    client: reqwest::Client,
    api_base: String,
    page_id: String,
    page_token: SecretString,
    page_name: Option<String>,
    authenticated: bool,
}

impl FacebookClient {
    pub fn new(credentials: FacebookCredentials, api_base: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http::build_client(http::DEFAULT_TIMEOUT)?,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            page_id: credentials.page_id,
            page_token: credentials.page_access_token,
            page_name: None,
            authenticated: false,
        })
    }

    pub fn page_name(&self) -> Option<&str> {
        self.page_name.as_deref()
    }
}

#[async_trait]
impl Platform for FacebookClient {
    async fn authenticate(&mut self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/{}", self.api_base, self.page_id))
            .query(&[
                ("fields", "id,name"),
                ("access_token", self.page_token.expose_secret()),
            ])
            .send()
            .await
            .map_err(|e| http::transport_error(NAME, e))?;

        if !response.status().is_success() {
            return Err(map_graph_error(HttpFailure::read(response).await).into());
        }

        let page: PageInfo = http::read_json(NAME, response).await?;
        tracing::debug!(
            "Authenticated with Facebook page {} ({})",
            page.name.as_deref().unwrap_or("unnamed"),
            page.id
        );
        self.page_name = page.name;
        self.authenticated = true;
        Ok(())
    }

    async fn publish(&self, post: &FormattedPost) -> Result<PublishedPost> {
        if !self.authenticated {
            return Err(PlatformError::Authentication(
                "Facebook client is not authenticated".to_string(),
            )
            .into());
        }

        let mut form = vec![
            ("message", post.text.as_str()),
            ("access_token", self.page_token.expose_secret()),
        ];
        if let Some(link) = &post.link {
            form.push(("link", link.as_str()));
        }

        let response = self
            .client
            .post(format!("{}/{}/feed", self.api_base, self.page_id))
            .form(&form)
            .send()
            .await
            .map_err(|e| http::transport_error(NAME, e))?;

        if !response.status().is_success() {
            return Err(map_graph_error(HttpFailure::read(response).await).into());
        }

        let created: CreatedPost = http::read_json(NAME, response).await?;
        Ok(PublishedPost {
            url: Some(format!("https://www.facebook.com/{}", created.id)),
            remote_id: created.id,
        })
    }

    fn kind(&self) -> PlatformKind {
        PlatformKind::Facebook
    }

    fn name(&self) -> &str {
        NAME
    }

    fn character_limit(&self) -> Option<usize> {
        // 63,206 characters is far beyond anything the formatter produces
        None
    }

    fn is_configured(&self) -> bool {
        !self.page_id.is_empty() && !self.page_token.expose_secret().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PresscastError;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> FacebookCredentials {
        FacebookCredentials {
            page_id: "1001".to_string(),
            page_access_token: SecretString::from("page-token".to_string()),
        }
    }

    fn graph_failure(status: u16, code: i64) -> HttpFailure {
        HttpFailure {
            status,
            retry_after: None,
            body: serde_json::json!({
                "error": {"message": "Something happened", "type": "OAuthException", "code": code}
            })
            .to_string(),
        }
    }

    #[test]
    fn test_graph_error_codes() {
        assert!(matches!(
            map_graph_error(graph_failure(400, 190)),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            map_graph_error(graph_failure(400, 32)),
            PlatformError::RateLimit(_)
        ));
        assert!(matches!(
            map_graph_error(graph_failure(400, 368)),
            PlatformError::Validation(_)
        ));
        assert!(matches!(
            map_graph_error(graph_failure(500, 2)),
            PlatformError::Network(_)
        ));
        // Unknown code falls back to the status mapping
        assert!(matches!(
            map_graph_error(graph_failure(404, 803)),
            PlatformError::Posting(_)
        ));
    }

    #[tokio::test]
    async fn test_authenticate_and_publish_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1001"))
            .and(query_param("fields", "id,name"))
            .and(query_param("access_token", "page-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "1001", "name": "My Blog"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/1001/feed"))
            .and(body_string_contains("link=https%3A%2F%2Fblog.example%2Fhello"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "1001_555"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut client = FacebookClient::new(credentials(), Some(server.uri())).unwrap();
        client.authenticate().await.unwrap();
        assert_eq!(client.page_name(), Some("My Blog"));

        let post = FormattedPost {
            platform: PlatformKind::Facebook,
            text: "Hello readers".to_string(),
            link: Some("https://blog.example/hello".to_string()),
            title: "Hello".to_string(),
            description: String::new(),
            image_url: None,
        };
        let published = client.publish(&post).await.unwrap();
        assert_eq!(published.remote_id, "1001_555");
        assert_eq!(
            published.url.as_deref(),
            Some("https://www.facebook.com/1001_555")
        );
    }

    #[tokio::test]
    async fn test_expired_page_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1001"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {
                    "message": "Error validating access token: Session has expired",
                    "type": "OAuthException",
                    "code": 190,
                    "error_subcode": 463
                }
            })))
            .mount(&server)
            .await;

        let mut client = FacebookClient::new(credentials(), Some(server.uri())).unwrap();
        let err = client.authenticate().await.unwrap_err();
        assert!(matches!(
            err,
            PresscastError::Platform(PlatformError::Authentication(_))
        ));
        assert!(err.to_string().contains("Session has expired"));
    }
}

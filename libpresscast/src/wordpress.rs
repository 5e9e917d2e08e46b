//! WordPress REST API client
//!
//! Fetches posts by id from `/wp-json/wp/v2/posts/{id}?_embed` so shares can
//! be started with nothing more than a post id. Private and draft posts need
//! an application password, stored under `presscast.wordpress/app_password`.

use futures::future::join_all;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::WordPressConfig;
use crate::credentials::CredentialManager;
use crate::error::{CredentialError, PresscastError, Result};
use crate::formatter::decode_entities;
use crate::http;
use crate::types::SourcePost;

const NAME: &str = "WordPress";

pub const CREDENTIAL_SERVICE: &str = "presscast.wordpress";
pub const APP_PASSWORD_KEY: &str = "app_password";

/// Post meta flag that opts a post out of sharing
const SKIP_META_KEY: &str = "_presscast_skip";

#[derive(Debug, Deserialize, Default)]
struct Rendered {
    #[serde(default)]
    rendered: String,
    #[serde(default)]
    protected: bool,
}

#[derive(Debug, Deserialize)]
struct WpPost {
    id: i64,
    #[serde(default)]
    title: Rendered,
    #[serde(default)]
    excerpt: Rendered,
    #[serde(default)]
    content: Rendered,
    link: String,
    #[serde(rename = "type", default = "default_type")]
    post_type: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    meta: Option<serde_json::Value>,
    #[serde(rename = "_embedded", default)]
    embedded: Option<Embedded>,
}

fn default_type() -> String {
    "post".to_string()
}

#[derive(Debug, Deserialize, Default)]
struct Embedded {
    #[serde(default)]
    author: Vec<EmbeddedAuthor>,
    #[serde(rename = "wp:term", default)]
    terms: Vec<Vec<EmbeddedTerm>>,
    #[serde(rename = "wp:featuredmedia", default)]
    featured_media: Vec<EmbeddedMedia>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedAuthor {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedTerm {
    taxonomy: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct WpUser {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddedMedia {
    #[serde(default)]
    source_url: Option<String>,
}

impl WpPost {
    fn into_source_post(self) -> SourcePost {
        let embedded = self.embedded.unwrap_or_default();

        let mut categories = Vec::new();
        let mut tags = Vec::new();
        for term in embedded.terms.into_iter().flatten() {
            let name = decode_entities(&term.name);
            match term.taxonomy.as_str() {
                "category" if name != "Uncategorized" => categories.push(name),
                "post_tag" => tags.push(name),
                _ => {}
            }
        }

        let skip_share = self
            .meta
            .as_ref()
            .and_then(|meta| meta.get(SKIP_META_KEY))
            .map(is_truthy)
            .unwrap_or(false);

        SourcePost {
            id: self.id,
            title: self.title.rendered,
            excerpt: self.excerpt.rendered,
            content: self.content.rendered,
            url: self.link,
            post_type: self.post_type,
            status: self.status,
            author: embedded
                .author
                .into_iter()
                .next()
                .and_then(|a| a.name)
                .map(|n| decode_entities(&n)),
            categories,
            tags,
            featured_image: embedded
                .featured_media
                .into_iter()
                .next()
                .and_then(|m| m.source_url),
            skip_share,
            password_protected: self.content.protected,
        }
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
        serde_json::Value::String(s) => matches!(s.as_str(), "1" | "true" | "yes"),
        _ => false,
    }
}

pub struct WordPressClient {
    client: reqwest::Client,
    site_url: String,
    auth: Option<(String, SecretString)>,
}

impl WordPressClient {
    pub fn new(site_url: &str) -> Result<Self> {
        Ok(Self {
            client: http::build_client(http::DEFAULT_TIMEOUT)?,
            site_url: site_url.trim_end_matches('/').to_string(),
            auth: None,
        })
    }

    /// Authenticate with a WordPress application password
    pub fn with_app_password(mut self, username: &str, password: SecretString) -> Self {
        self.auth = Some((username.to_string(), password));
        self
    }

    /// Build a client from `[wordpress]`, loading the application password
    /// when a username is configured
    pub fn from_config(config: &WordPressConfig, credentials: &CredentialManager) -> Result<Self> {
        let client = Self::new(&config.site_url)?;
        let Some(username) = &config.username else {
            return Ok(client);
        };

        match credentials.retrieve_optional(CREDENTIAL_SERVICE, APP_PASSWORD_KEY)? {
            Some(password) => Ok(client.with_app_password(username, SecretString::from(password))),
            None => {
                tracing::warn!(
                    "WordPress username '{}' configured without an application password. Run: press-creds set wordpress {}",
                    username,
                    APP_PASSWORD_KEY
                );
                Ok(client)
            }
        }
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    /// Fetch one post with its author, terms and featured image
    pub async fn fetch_post(&self, id: i64) -> Result<SourcePost> {
        let url = format!("{}/wp-json/wp/v2/posts/{}", self.site_url, id);
        let mut request = self.client.get(&url).query(&[("_embed", "1")]);
        if let Some((username, password)) = &self.auth {
            request = request
                .basic_auth(username, Some(password.expose_secret()))
                .query(&[("context", "edit")]);
        }

        tracing::debug!("Fetching WordPress post {} from {}", id, self.site_url);
        let response = request
            .send()
            .await
            .map_err(|e| http::transport_error(NAME, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PresscastError::InvalidInput(format!(
                "WordPress post {} not found at {}",
                id, self.site_url
            )));
        }

        let response = http::check(NAME, response).await?;
        let post: WpPost = http::read_json(NAME, response).await?;
        Ok(post.into_source_post())
    }

    /// Verify the application password against `users/me`
    ///
    /// Returns the WordPress display name of the authenticated user.
    pub async fn check_auth(&self) -> Result<String> {
        let Some((username, password)) = &self.auth else {
            return Err(CredentialError::NotFound(format!(
                "{}.{}",
                CREDENTIAL_SERVICE, APP_PASSWORD_KEY
            ))
            .into());
        };

        let url = format!("{}/wp-json/wp/v2/users/me", self.site_url);
        let response = self
            .client
            .get(&url)
            .basic_auth(username, Some(password.expose_secret()))
            .send()
            .await
            .map_err(|e| http::transport_error(NAME, e))?;

        let response = http::check(NAME, response).await?;
        let user: WpUser = http::read_json(NAME, response).await?;
        Ok(user.name)
    }

    /// Fetch several posts, failing on the first post that cannot be fetched
    ///
    /// Posts come back in the order of `ids`.
    pub async fn fetch_posts(&self, ids: &[i64]) -> Result<Vec<SourcePost>> {
        join_all(ids.iter().map(|id| self.fetch_post(*id)))
            .await
            .into_iter()
            .collect()
    }
}

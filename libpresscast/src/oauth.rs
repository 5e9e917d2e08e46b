//! OAuth flows for the networks that need them
//!
//! - X signs every request with OAuth 1.0a (HMAC-SHA1) and obtains user
//!   tokens through the three-legged request-token / verifier dance.
//! - LinkedIn and Facebook use the OAuth 2 authorization-code grant. LinkedIn
//!   tokens are refreshed before they expire; Facebook user tokens are
//!   exchanged for a long-lived token and then for the page token.
//! - Bluesky uses app passwords and has no OAuth step.
//!
//! [`OAuthHandler`] drives the flows and writes the results into the
//! credential store.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, PlatformConfig};
use crate::credentials::{CredentialManager, OAuthToken, XCredentials};
use crate::error::{ConfigError, CredentialError, PlatformError, PresscastError, Result};
use crate::http;
use crate::types::PlatformKind;

type HmacSha1 = Hmac<Sha1>;

pub const X_AUTH_BASE: &str = "https://api.x.com";
pub const LINKEDIN_AUTH_BASE: &str = "https://www.linkedin.com";
pub const FACEBOOK_AUTH_BASE: &str = "https://www.facebook.com/v19.0";

/// Refresh LinkedIn tokens that expire within this many seconds
pub const REFRESH_WINDOW_SECS: i64 = 24 * 60 * 60;

// ----------------------------------------------------------------------
// OAuth 1.0a
// ----------------------------------------------------------------------

/// RFC 3986 percent-encoding (unreserved characters pass through)
pub fn percent_encode(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

/// Build the OAuth 1.0a signature base string
///
/// `params` holds the oauth_* parameters and any form parameters; query
/// parameters are read from `url` itself.
pub fn signature_base_string(method: &str, url: &str, params: &[(String, String)]) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|e| PresscastError::InvalidInput(format!("Invalid URL '{}': {}", url, e)))?;

    let mut all: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (percent_encode(&k), percent_encode(&v)))
        .collect();
    all.extend(
        params
            .iter()
            .map(|(k, v)| (percent_encode(k), percent_encode(v))),
    );
    all.sort();

    let param_string = all
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut base_url = parsed.clone();
    base_url.set_query(None);
    base_url.set_fragment(None);

    Ok(format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(base_url.as_str()),
        percent_encode(&param_string)
    ))
}

/// HMAC-SHA1 of `data`, base64-encoded
pub fn sign_hmac_sha1(key: &str, data: &str) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| PlatformError::Authentication(format!("Invalid signing key: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Signs requests on behalf of an X app, optionally with a user token
#[derive(Debug, Clone)]
pub struct OAuth1Signer {
    consumer_key: String,
    consumer_secret: SecretString,
    token: Option<String>,
    token_secret: Option<SecretString>,
}

impl OAuth1Signer {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: SecretString) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret,
            token: None,
            token_secret: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>, token_secret: SecretString) -> Self {
        self.token = Some(token.into());
        self.token_secret = Some(token_secret);
        self
    }

    pub fn from_credentials(creds: &XCredentials) -> Self {
        Self::new(creds.api_key.clone(), creds.api_secret.clone())
            .with_token(creds.access_token.clone(), creds.access_token_secret.clone())
    }

    /// `Authorization` header value with a fresh nonce and the current time
    pub fn authorization_header(
        &self,
        method: &str,
        url: &str,
        form_params: &[(&str, &str)],
        extra_oauth: &[(&str, &str)],
    ) -> Result<String> {
        self.authorization_header_with(
            method,
            url,
            form_params,
            extra_oauth,
            &generate_nonce(),
            chrono::Utc::now().timestamp(),
        )
    }

    /// `Authorization` header value with an explicit nonce and timestamp
    pub fn authorization_header_with(
        &self,
        method: &str,
        url: &str,
        form_params: &[(&str, &str)],
        extra_oauth: &[(&str, &str)],
        nonce: &str,
        timestamp: i64,
    ) -> Result<String> {
        let mut oauth: Vec<(String, String)> = vec![
            ("oauth_consumer_key".to_string(), self.consumer_key.clone()),
            ("oauth_nonce".to_string(), nonce.to_string()),
            ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
            ("oauth_timestamp".to_string(), timestamp.to_string()),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];
        if let Some(token) = &self.token {
            oauth.push(("oauth_token".to_string(), token.clone()));
        }
        oauth.extend(extra_oauth.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        let mut signed = oauth.clone();
        signed.extend(form_params.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        let base = signature_base_string(method, url, &signed)?;
        let key = format!(
            "{}&{}",
            percent_encode(self.consumer_secret.expose_secret()),
            percent_encode(
                self.token_secret
                    .as_ref()
                    .map(|s| s.expose_secret())
                    .unwrap_or("")
            )
        );
        oauth.push(("oauth_signature".to_string(), sign_hmac_sha1(&key, &base)?));
        oauth.sort();

        let fields = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("OAuth {}", fields))
    }
}

/// Parse an `application/x-www-form-urlencoded` body
pub fn parse_form(body: &str) -> HashMap<String, String> {
    body.trim()
        .split('&')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            let k = urlencoding::decode(&k.replace('+', " ")).ok()?.into_owned();
            let v = urlencoding::decode(&v.replace('+', " ")).ok()?.into_owned();
            Some((k, v))
        })
        .collect()
}

/// Temporary credentials from the first leg of the X flow
#[derive(Debug, Clone)]
pub struct RequestToken {
    pub token: String,
    pub secret: String,
}

/// User credentials from the last leg of the X flow
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub secret: String,
    pub screen_name: Option<String>,
}

pub async fn x_request_token(
    client: &reqwest::Client,
    auth_base: &str,
    signer: &OAuth1Signer,
    callback: &str,
) -> Result<RequestToken> {
    let url = format!("{}/oauth/request_token", auth_base.trim_end_matches('/'));
    let header = signer.authorization_header("POST", &url, &[], &[("oauth_callback", callback)])?;

    let response = client
        .post(&url)
        .header(reqwest::header::AUTHORIZATION, header)
        .send()
        .await
        .map_err(|e| http::transport_error("X", e))?;
    let body = http::check("X", response)
        .await?
        .text()
        .await
        .map_err(|e| http::transport_error("X", e))?;

    let form = parse_form(&body);
    match (form.get("oauth_token"), form.get("oauth_token_secret")) {
        (Some(token), Some(secret)) => Ok(RequestToken {
            token: token.clone(),
            secret: secret.clone(),
        }),
        _ => Err(PlatformError::Authentication(
            "X request_token response is missing oauth_token".to_string(),
        )
        .into()),
    }
}

pub fn x_authorize_url(auth_base: &str, request_token: &str) -> String {
    format!(
        "{}/oauth/authorize?oauth_token={}",
        auth_base.trim_end_matches('/'),
        percent_encode(request_token)
    )
}

pub async fn x_access_token(
    client: &reqwest::Client,
    auth_base: &str,
    signer: &OAuth1Signer,
    verifier: &str,
) -> Result<AccessToken> {
    let url = format!("{}/oauth/access_token", auth_base.trim_end_matches('/'));
    let header = signer.authorization_header("POST", &url, &[], &[("oauth_verifier", verifier)])?;

    let response = client
        .post(&url)
        .header(reqwest::header::AUTHORIZATION, header)
        .send()
        .await
        .map_err(|e| http::transport_error("X", e))?;
    let body = http::check("X", response)
        .await?
        .text()
        .await
        .map_err(|e| http::transport_error("X", e))?;

    let form = parse_form(&body);
    match (form.get("oauth_token"), form.get("oauth_token_secret")) {
        (Some(token), Some(secret)) => Ok(AccessToken {
            token: token.clone(),
            secret: secret.clone(),
            screen_name: form.get("screen_name").cloned(),
        }),
        _ => Err(PlatformError::Authentication(
            "X access_token response is missing oauth_token".to_string(),
        )
        .into()),
    }
}

// ----------------------------------------------------------------------
// OAuth 2
// ----------------------------------------------------------------------

/// Build an authorization-code grant URL
pub fn oauth2_authorize_url(
    authorize_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[String],
    scope_separator: &str,
    state: &str,
) -> String {
    format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
        authorize_endpoint,
        percent_encode(client_id),
        percent_encode(redirect_uri),
        percent_encode(&scopes.join(scope_separator)),
        percent_encode(state)
    )
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_token(self, now: i64) -> OAuthToken {
        OAuthToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_in.map(|secs| now + secs),
            scope: self.scope,
        }
    }
}

async fn token_request(
    platform: &str,
    request: reqwest::RequestBuilder,
    now: i64,
) -> Result<OAuthToken> {
    let response = request
        .send()
        .await
        .map_err(|e| http::transport_error(platform, e))?;
    let response = http::check(platform, response).await?;
    let token: TokenResponse = http::read_json(platform, response).await?;
    Ok(token.into_token(now))
}

/// Exchange an authorization code with a form POST
pub async fn exchange_code(
    client: &reqwest::Client,
    platform: &str,
    token_endpoint: &str,
    client_id: &str,
    client_secret: &str,
    redirect_uri: &str,
    code: &str,
) -> Result<OAuthToken> {
    let request = client.post(token_endpoint).form(&[
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("redirect_uri", redirect_uri),
    ]);
    token_request(platform, request, chrono::Utc::now().timestamp()).await
}

/// Renew a LinkedIn token with its refresh token
pub async fn refresh_token(
    client: &reqwest::Client,
    token_endpoint: &str,
    client_id: &str,
    client_secret: &str,
    refresh: &str,
    now: i64,
) -> Result<OAuthToken> {
    let request = client.post(token_endpoint).form(&[
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh),
        ("client_id", client_id),
        ("client_secret", client_secret),
    ]);
    let mut token = token_request("LinkedIn", request, now).await?;
    if token.refresh_token.is_none() {
        token.refresh_token = Some(refresh.to_string());
    }
    Ok(token)
}

/// Swap a short-lived Facebook user token for a long-lived one
pub async fn facebook_long_lived_token(
    client: &reqwest::Client,
    graph_base: &str,
    app_id: &str,
    app_secret: &str,
    short_token: &str,
) -> Result<OAuthToken> {
    let request = client
        .get(format!("{}/oauth/access_token", graph_base.trim_end_matches('/')))
        .query(&[
            ("grant_type", "fb_exchange_token"),
            ("client_id", app_id),
            ("client_secret", app_secret),
            ("fb_exchange_token", short_token),
        ]);
    token_request("Facebook", request, chrono::Utc::now().timestamp()).await
}

#[derive(Debug, Deserialize)]
struct PageList {
    #[serde(default)]
    data: Vec<PageEntry>,
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    access_token: String,
}

/// Find the page access token for `page_id` among the user's pages
pub async fn facebook_page_token(
    client: &reqwest::Client,
    graph_base: &str,
    user_token: &str,
    page_id: &str,
) -> Result<(String, Option<String>)> {
    let response = client
        .get(format!("{}/me/accounts", graph_base.trim_end_matches('/')))
        .query(&[("access_token", user_token), ("fields", "id,name,access_token")])
        .send()
        .await
        .map_err(|e| http::transport_error("Facebook", e))?;
    let response = http::check("Facebook", response).await?;
    let pages: PageList = http::read_json("Facebook", response).await?;

    pages
        .data
        .into_iter()
        .find(|page| page.id == page_id)
        .map(|page| (page.access_token, page.name))
        .ok_or_else(|| {
            PlatformError::Authentication(format!(
                "Facebook page {} is not managed by the authorizing user",
                page_id
            ))
            .into()
        })
}

/// Pull `code` and `state` out of a pasted redirect URL, or accept a bare code
pub fn parse_callback(input: &str) -> (String, Option<String>) {
    let trimmed = input.trim();
    if let Ok(url) = Url::parse(trimmed) {
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        if let Some(code) = pairs.get("code").or_else(|| pairs.get("oauth_verifier")) {
            let state = pairs
                .get("state")
                .or_else(|| pairs.get("oauth_token"))
                .cloned();
            return (code.clone(), state);
        }
    }
    (trimmed.to_string(), None)
}

// ----------------------------------------------------------------------
// Handler
// ----------------------------------------------------------------------

/// An authorization in progress, handed back to `complete`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub platform: PlatformKind,
    /// Where the user must go to grant access
    pub url: String,
    /// Anti-forgery state (OAuth 2) or the request token (OAuth 1.0a)
    pub state: String,
    /// OAuth 1.0a request token secret
    #[serde(default)]
    pub request_secret: Option<String>,
}

/// What `complete` stored
#[derive(Debug, Clone)]
pub struct CompletedAuthorization {
    pub platform: PlatformKind,
    pub expires_at: Option<i64>,
    pub account: Option<String>,
}

pub struct OAuthHandler {
    config: Config,
    credentials: Arc<CredentialManager>,
    client: reqwest::Client,
}

impl OAuthHandler {
    pub fn new(config: Config, credentials: Arc<CredentialManager>) -> Result<Self> {
        Ok(Self {
            config,
            credentials,
            client: http::build_client(http::DEFAULT_TIMEOUT)?,
        })
    }

    fn platform_config(&self, kind: PlatformKind) -> PlatformConfig {
        self.config.platform(kind).cloned().unwrap_or_default()
    }

    fn require_setting(value: Option<String>, field: String) -> Result<String> {
        value
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingField(field).into())
    }

    fn secret(&self, kind: PlatformKind, key: &str) -> Result<String> {
        self.credentials
            .retrieve_optional(&kind.service(), key)?
            .ok_or_else(|| {
                PlatformError::Authentication(format!(
                    "{} {} is not set. Run: press-creds set {} {}",
                    kind.display_name(),
                    key,
                    kind.as_str(),
                    key
                ))
                .into()
            })
    }

    fn linkedin_endpoints(&self) -> (String, String) {
        let base = self
            .platform_config(PlatformKind::LinkedIn)
            .auth_base
            .unwrap_or_else(|| LINKEDIN_AUTH_BASE.to_string());
        let base = base.trim_end_matches('/');
        (
            format!("{}/oauth/v2/authorization", base),
            format!("{}/oauth/v2/accessToken", base),
        )
    }

    fn facebook_endpoints(&self) -> (String, String) {
        let settings = self.platform_config(PlatformKind::Facebook);
        let auth = settings
            .auth_base
            .unwrap_or_else(|| FACEBOOK_AUTH_BASE.to_string());
        let graph = settings
            .api_base
            .unwrap_or_else(|| crate::platforms::facebook::DEFAULT_API_BASE.to_string());
        (
            format!("{}/dialog/oauth", auth.trim_end_matches('/')),
            graph.trim_end_matches('/').to_string(),
        )
    }

    fn x_auth_base(&self) -> String {
        self.platform_config(PlatformKind::X)
            .auth_base
            .unwrap_or_else(|| X_AUTH_BASE.to_string())
    }

    /// Start an authorization and return the URL the user must visit
    pub async fn begin(&self, kind: PlatformKind) -> Result<AuthorizationRequest> {
        match kind {
            PlatformKind::X => {
                let signer = OAuth1Signer::new(
                    self.secret(kind, "api_key")?,
                    SecretString::from(self.secret(kind, "api_secret")?),
                );
                let callback = self
                    .platform_config(kind)
                    .redirect_uri
                    .unwrap_or_else(|| "oob".to_string());
                let auth_base = self.x_auth_base();
                let request = x_request_token(&self.client, &auth_base, &signer, &callback).await?;

                Ok(AuthorizationRequest {
                    platform: kind,
                    url: x_authorize_url(&auth_base, &request.token),
                    state: request.token,
                    request_secret: Some(request.secret),
                })
            }
            PlatformKind::LinkedIn | PlatformKind::Facebook => {
                let settings = self.platform_config(kind);
                let client_id =
                    Self::require_setting(settings.client_id.clone(), format!("{}.client_id", kind))?;
                let redirect_uri = Self::require_setting(
                    settings.redirect_uri.clone(),
                    format!("{}.redirect_uri", kind),
                )?;
                let (scopes, separator, authorize) = if kind == PlatformKind::LinkedIn {
                    (
                        default_scopes(&settings.scopes, &["openid", "profile", "w_member_social"]),
                        " ",
                        self.linkedin_endpoints().0,
                    )
                } else {
                    (
                        default_scopes(
                            &settings.scopes,
                            &["pages_show_list", "pages_read_engagement", "pages_manage_posts"],
                        ),
                        ",",
                        self.facebook_endpoints().0,
                    )
                };

                let state = generate_nonce();
                Ok(AuthorizationRequest {
                    platform: kind,
                    url: oauth2_authorize_url(
                        &authorize,
                        &client_id,
                        &redirect_uri,
                        &scopes,
                        separator,
                        &state,
                    ),
                    state,
                    request_secret: None,
                })
            }
            PlatformKind::Bluesky => Err(PresscastError::InvalidInput(
                "Bluesky uses app passwords, not OAuth. Run: press-creds set bluesky app_password"
                    .to_string(),
            )),
        }
    }

    /// Finish an authorization and store the resulting tokens
    ///
    /// `returned_state` is the `state` (OAuth 2) or `oauth_token` (OAuth 1.0a)
    /// the provider sent back; it must match the request.
    pub async fn complete(
        &self,
        request: &AuthorizationRequest,
        code_or_verifier: &str,
        returned_state: Option<&str>,
    ) -> Result<CompletedAuthorization> {
        let kind = request.platform;
        match (kind, returned_state) {
            // X's out-of-band PIN flow returns no token to compare
            (PlatformKind::X, None) => {}
            (_, Some(state)) if state == request.state => {}
            _ => return Err(CredentialError::StateMismatch.into()),
        }

        match kind {
            PlatformKind::X => {
                let request_secret = request.request_secret.clone().ok_or_else(|| {
                    PresscastError::InvalidInput("X authorization has no request secret".to_string())
                })?;
                let signer = OAuth1Signer::new(
                    self.secret(kind, "api_key")?,
                    SecretString::from(self.secret(kind, "api_secret")?),
                )
                .with_token(request.state.clone(), SecretString::from(request_secret));

                let access =
                    x_access_token(&self.client, &self.x_auth_base(), &signer, code_or_verifier)
                        .await?;
                let service = kind.service();
                self.credentials.store(&service, "access_token", &access.token)?;
                self.credentials
                    .store(&service, "access_token_secret", &access.secret)?;

                tracing::info!("Stored X access token");
                Ok(CompletedAuthorization {
                    platform: kind,
                    expires_at: None,
                    account: access.screen_name,
                })
            }
            PlatformKind::LinkedIn => {
                let settings = self.platform_config(kind);
                let client_id =
                    Self::require_setting(settings.client_id, "linkedin.client_id".to_string())?;
                let redirect_uri =
                    Self::require_setting(settings.redirect_uri, "linkedin.redirect_uri".to_string())?;
                let client_secret = self.secret(kind, "client_secret")?;

                let token = exchange_code(
                    &self.client,
                    "LinkedIn",
                    &self.linkedin_endpoints().1,
                    &client_id,
                    &client_secret,
                    &redirect_uri,
                    code_or_verifier,
                )
                .await?;
                self.credentials.store_oauth_token(kind, &token)?;

                tracing::info!("Stored LinkedIn OAuth token");
                Ok(CompletedAuthorization {
                    platform: kind,
                    expires_at: token.expires_at,
                    account: None,
                })
            }
            PlatformKind::Facebook => {
                let settings = self.platform_config(kind);
                let client_id =
                    Self::require_setting(settings.client_id, "facebook.client_id".to_string())?;
                let redirect_uri =
                    Self::require_setting(settings.redirect_uri, "facebook.redirect_uri".to_string())?;
                let page_id = match settings.page_id.filter(|id| !id.is_empty()) {
                    Some(id) => id,
                    None => self.secret(kind, "page_id")?,
                };
                let app_secret = self.secret(kind, "app_secret")?;
                let (_, graph) = self.facebook_endpoints();

                let short = exchange_code(
                    &self.client,
                    "Facebook",
                    &format!("{}/oauth/access_token", graph),
                    &client_id,
                    &app_secret,
                    &redirect_uri,
                    code_or_verifier,
                )
                .await?;
                let long = facebook_long_lived_token(
                    &self.client,
                    &graph,
                    &client_id,
                    &app_secret,
                    &short.access_token,
                )
                .await?;
                let (page_token, page_name) =
                    facebook_page_token(&self.client, &graph, &long.access_token, &page_id).await?;

                // Page tokens derived from a long-lived user token do not expire
                let token = OAuthToken {
                    access_token: page_token,
                    refresh_token: None,
                    expires_at: None,
                    scope: long.scope,
                };
                self.credentials.store_oauth_token(kind, &token)?;
                self.credentials.store(&kind.service(), "page_id", &page_id)?;

                tracing::info!("Stored Facebook page token for page {}", page_id);
                Ok(CompletedAuthorization {
                    platform: kind,
                    expires_at: None,
                    account: page_name,
                })
            }
            PlatformKind::Bluesky => Err(PresscastError::InvalidInput(
                "Bluesky uses app passwords, not OAuth".to_string(),
            )),
        }
    }

    /// Refresh a stored LinkedIn token that is about to expire
    ///
    /// Returns true when a new token was stored. Platforms without refreshable
    /// tokens always return false.
    pub async fn ensure_fresh(&self, kind: PlatformKind, now: i64) -> Result<bool> {
        if kind != PlatformKind::LinkedIn {
            return Ok(false);
        }

        let Some(token) = self.credentials.load_oauth_token(kind)? else {
            return Ok(false);
        };
        let Some(refresh) = token.refresh_token.clone() else {
            return Ok(false);
        };
        if !token.expires_within(now, REFRESH_WINDOW_SECS) {
            return Ok(false);
        }

        let client_id = Self::require_setting(
            self.platform_config(kind).client_id,
            "linkedin.client_id".to_string(),
        )?;
        let client_secret = self.secret(kind, "client_secret")?;

        let fresh = refresh_token(
            &self.client,
            &self.linkedin_endpoints().1,
            &client_id,
            &client_secret,
            &refresh,
            now,
        )
        .await?;
        self.credentials.store_oauth_token(kind, &fresh)?;

        tracing::info!("Refreshed LinkedIn access token");
        Ok(true)
    }
}

fn default_scopes(configured: &[String], defaults: &[&str]) -> Vec<String> {
    if configured.is_empty() {
        defaults.iter().map(|s| s.to_string()).collect()
    } else {
        configured.to_vec()
    }
}

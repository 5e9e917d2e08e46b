//! Credential storage for Presscast
//!
//! Platform credentials are key-value blobs grouped by service name
//! (`presscast.x`, `presscast.linkedin`, ...). Two backends exist:
//! - `KeyringStore`: OS-native secure storage (primary)
//! - `OptionsFileStore`: one JSON options document on disk (fallback)
//!
//! `CredentialManager` orders the backends and implements fallback. The typed
//! bundles at the bottom of this module (`XCredentials`, ...) are what the
//! platform clients consume.
//!
//! # Example
//!
//! ```no_run
//! use libpresscast::credentials::{CredentialConfig, CredentialManager};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = CredentialManager::new(CredentialConfig::default())?;
//! manager.store("presscast.bluesky", "handle", "alice.bsky.social")?;
//! let handle = manager.retrieve("presscast.bluesky", "handle")?;
//! # Ok(())
//! # }
//! ```

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{CredentialError, PlatformError, PresscastError, Result};
use crate::types::PlatformKind;

/// Trait for credential storage backends
///
/// - **Service**: `presscast.{platform}` (e.g. "presscast.x")
/// - **Key**: credential name (e.g. "api_key", "oauth_token")
pub trait CredentialStore: Send + Sync {
    fn store(&self, service: &str, key: &str, value: &str) -> Result<()>;

    /// Returns `CredentialError::NotFound` when the key is absent
    fn retrieve(&self, service: &str, key: &str) -> Result<String>;

    /// Deleting a missing credential is not an error
    fn delete(&self, service: &str, key: &str) -> Result<()>;

    fn exists(&self, service: &str, key: &str) -> Result<bool>;

    /// Short backend identifier, e.g. "keyring"
    fn backend_name(&self) -> &str;
}

/// OS keyring storage backend
///
/// Uses macOS Keychain, Windows Credential Manager or the Linux Secret
/// Service. Unavailable on headless machines without D-Bus, in which case
/// `new` returns `CredentialError::KeyringUnavailable`.
pub struct KeyringStore;

impl KeyringStore {
    pub fn new() -> Result<Self> {
        keyring::Entry::new("presscast.test", "availability_check").map_err(|e| {
            CredentialError::KeyringUnavailable(format!("OS keyring not accessible: {}", e))
        })?;
        Ok(Self)
    }

    fn entry(service: &str, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(service, key)
            .map_err(|e| CredentialError::KeyringUnavailable(e.to_string()).into())
    }
}

impl CredentialStore for KeyringStore {
    fn store(&self, service: &str, key: &str, value: &str) -> Result<()> {
        Self::entry(service, key)?
            .set_password(value)
            .map_err(|e| CredentialError::Keyring(e.to_string()))?;

        tracing::debug!("Stored credential for {}.{} in OS keyring", service, key);
        Ok(())
    }

    fn retrieve(&self, service: &str, key: &str) -> Result<String> {
        match Self::entry(service, key)?.get_password() {
            Ok(value) => Ok(value),
            Err(keyring::Error::NoEntry) => {
                Err(CredentialError::NotFound(format!("{}.{}", service, key)).into())
            }
            Err(e) => Err(CredentialError::Keyring(e.to_string()).into()),
        }
    }

    fn delete(&self, service: &str, key: &str) -> Result<()> {
        match Self::entry(service, key)?.delete_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialError::Keyring(e.to_string()).into()),
        }
    }

    fn exists(&self, service: &str, key: &str) -> Result<bool> {
        match Self::entry(service, key)?.get_password() {
            Ok(_) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(CredentialError::Keyring(e.to_string()).into()),
        }
    }

    fn backend_name(&self) -> &str {
        "keyring"
    }
}

/// Validate that a path is not a symlink
///
/// Credential files must be regular files so that a swapped-in link cannot
/// redirect reads or writes elsewhere.
pub fn validate_not_symlink(path: &Path) -> Result<()> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| {
        CredentialError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read metadata for '{}': {}", path.display(), e),
        ))
    })?;

    if metadata.is_symlink() {
        return Err(CredentialError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "Security: Credential file '{}' is a symbolic link. \
                Credential files must be regular files.",
                path.display()
            ),
        ))
        .into());
    }

    Ok(())
}

type OptionsDocument = BTreeMap<String, BTreeMap<String, String>>;

/// JSON options document backend
///
/// The whole file is one object mapping option name to a blob of credential
/// keys, mirroring how the CMS keeps per-platform settings:
///
/// ```json
/// { "presscast.x": { "api_key": "...", "api_secret": "..." } }
/// ```
///
/// The file is rewritten atomically with mode 0600 on Unix.
pub struct OptionsFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OptionsFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<OptionsDocument> {
        if !self.path.exists() && std::fs::symlink_metadata(&self.path).is_err() {
            return Ok(OptionsDocument::new());
        }
        validate_not_symlink(&self.path)?;

        let content = std::fs::read_to_string(&self.path).map_err(CredentialError::Io)?;
        if content.trim().is_empty() {
            return Ok(OptionsDocument::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            CredentialError::Malformed(format!("{}: {}", self.path.display(), e)).into()
        })
    }

    fn write_document(&self, document: &OptionsDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(CredentialError::Io)?;
            }
        }
        if std::fs::symlink_metadata(&self.path).is_ok() {
            validate_not_symlink(&self.path)?;
        }

        let json = serde_json::to_string_pretty(document)
            .map_err(|e| CredentialError::Malformed(e.to_string()))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(CredentialError::Io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
                .map_err(CredentialError::Io)?;
        }

        std::fs::rename(&tmp_path, &self.path).map_err(CredentialError::Io)?;
        Ok(())
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, ()> {
        // A panic while holding the lock leaves the file untouched
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for OptionsFileStore {
    fn store(&self, service: &str, key: &str, value: &str) -> Result<()> {
        let _guard = self.locked();
        let mut document = self.read_document()?;
        document
            .entry(service.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.write_document(&document)?;

        tracing::debug!(
            "Stored credential for {}.{} in {}",
            service,
            key,
            self.path.display()
        );
        Ok(())
    }

    fn retrieve(&self, service: &str, key: &str) -> Result<String> {
        let _guard = self.locked();
        self.read_document()?
            .get(service)
            .and_then(|blob| blob.get(key))
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(format!("{}.{}", service, key)).into())
    }

    fn delete(&self, service: &str, key: &str) -> Result<()> {
        let _guard = self.locked();
        let mut document = self.read_document()?;

        let removed = match document.get_mut(service) {
            Some(blob) => {
                let removed = blob.remove(key).is_some();
                if blob.is_empty() {
                    document.remove(service);
                }
                removed
            }
            None => false,
        };

        if removed {
            self.write_document(&document)?;
        }
        Ok(())
    }

    fn exists(&self, service: &str, key: &str) -> Result<bool> {
        let _guard = self.locked();
        Ok(self
            .read_document()?
            .get(service)
            .map(|blob| blob.contains_key(key))
            .unwrap_or(false))
    }

    fn backend_name(&self) -> &str {
        "options"
    }
}

/// Storage backend type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// OS-native keyring
    #[default]
    Keyring,
    /// JSON options document at `credentials.path`
    Options,
}

/// Credential storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    #[serde(default)]
    pub storage: StorageBackend,

    /// Location of the options document (the keyring ignores it)
    #[serde(default = "default_credential_path")]
    pub path: String,
}

fn default_credential_path() -> String {
    "~/.config/presscast/options.json".to_string()
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::Keyring,
            path: default_credential_path(),
        }
    }
}

impl CredentialConfig {
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(CredentialError::Malformed(
                "Credential path cannot be empty".to_string(),
            )
            .into());
        }
        Ok(())
    }

    pub fn expand_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

/// Credential manager facade
///
/// Holds an ordered list of stores:
///
/// 1. `KeyringStore` when `storage = "keyring"` and the keyring is reachable
/// 2. `OptionsFileStore` at `credentials.path`
///
/// Writes go to the first store. Reads try each store in order and only fall
/// through on `NotFound`, so a keyring failure is reported rather than masked.
pub struct CredentialManager {
    stores: Vec<Box<dyn CredentialStore>>,
    config: CredentialConfig,
}

impl CredentialManager {
    pub fn new(config: CredentialConfig) -> Result<Self> {
        config.validate()?;
        let mut stores: Vec<Box<dyn CredentialStore>> = Vec::new();

        if config.storage == StorageBackend::Keyring {
            match KeyringStore::new() {
                Ok(store) => {
                    tracing::debug!("Using OS keyring for credential storage");
                    stores.push(Box::new(store));
                }
                Err(e) => {
                    tracing::warn!(
                        "OS keyring unavailable: {}. Falling back to the options file.",
                        e
                    );
                }
            }
        }

        stores.push(Box::new(OptionsFileStore::new(config.expand_path())));

        Ok(Self { stores, config })
    }

    /// Build a manager over explicit stores
    pub fn with_stores(stores: Vec<Box<dyn CredentialStore>>, config: CredentialConfig) -> Result<Self> {
        if stores.is_empty() {
            return Err(CredentialError::NoStoreAvailable.into());
        }
        Ok(Self { stores, config })
    }

    pub fn store(&self, service: &str, key: &str, value: &str) -> Result<()> {
        let store = self
            .stores
            .first()
            .ok_or(CredentialError::NoStoreAvailable)?;
        store.store(service, key, value)?;
        tracing::debug!(
            "Stored credential for {}.{} using {} backend",
            service,
            key,
            store.backend_name()
        );
        Ok(())
    }

    pub fn retrieve(&self, service: &str, key: &str) -> Result<String> {
        let mut last_error: Option<PresscastError> = None;

        for store in &self.stores {
            match store.retrieve(service, key) {
                Ok(value) => {
                    tracing::debug!(
                        "Retrieved credential for {}.{} from {} backend",
                        service,
                        key,
                        store.backend_name()
                    );
                    return Ok(value);
                }
                Err(e @ PresscastError::Credential(CredentialError::NotFound(_))) => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| CredentialError::NotFound(format!("{}.{}", service, key)).into()))
    }

    /// Retrieve a credential, mapping `NotFound` to `None`
    pub fn retrieve_optional(&self, service: &str, key: &str) -> Result<Option<String>> {
        match self.retrieve(service, key) {
            Ok(value) => Ok(Some(value)),
            Err(PresscastError::Credential(CredentialError::NotFound(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete a credential from every backend
    pub fn delete(&self, service: &str, key: &str) -> Result<()> {
        for store in &self.stores {
            store.delete(service, key)?;
        }
        tracing::debug!("Deleted credential for {}.{} from all backends", service, key);
        Ok(())
    }

    pub fn exists(&self, service: &str, key: &str) -> Result<bool> {
        for store in &self.stores {
            if store.exists(service, key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn config(&self) -> &CredentialConfig {
        &self.config
    }

    pub fn backends(&self) -> Vec<&str> {
        self.stores.iter().map(|s| s.backend_name()).collect()
    }

    pub fn primary_backend(&self) -> Option<&str> {
        self.stores.first().map(|s| s.backend_name())
    }

    pub fn store_oauth_token(&self, kind: PlatformKind, token: &OAuthToken) -> Result<()> {
        let json = serde_json::to_string(token)
            .map_err(|e| CredentialError::Malformed(e.to_string()))?;
        self.store(&kind.service(), OAUTH_TOKEN_KEY, &json)
    }

    pub fn load_oauth_token(&self, kind: PlatformKind) -> Result<Option<OAuthToken>> {
        match self.retrieve_optional(&kind.service(), OAUTH_TOKEN_KEY)? {
            Some(json) => serde_json::from_str(&json).map(Some).map_err(|e| {
                CredentialError::Malformed(format!("{}.{}: {}", kind.service(), OAUTH_TOKEN_KEY, e))
                    .into()
            }),
            None => Ok(None),
        }
    }

    /// Whether enough credentials exist to attempt authentication
    pub fn has_credentials(&self, kind: PlatformKind) -> Result<bool> {
        let service = kind.service();
        if matches!(kind, PlatformKind::LinkedIn | PlatformKind::Facebook)
            && self.exists(&service, OAUTH_TOKEN_KEY)?
        {
            return Ok(true);
        }

        for key in required_keys(kind) {
            if !self.exists(&service, key)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Key under which OAuth token JSON is stored
pub const OAUTH_TOKEN_KEY: &str = "oauth_token";

/// Keys a platform needs when no OAuth token is present
pub fn required_keys(kind: PlatformKind) -> &'static [&'static str] {
    match kind {
        PlatformKind::X => &["api_key", "api_secret", "access_token", "access_token_secret"],
        PlatformKind::LinkedIn => &["access_token"],
        PlatformKind::Bluesky => &["handle", "app_password"],
        PlatformKind::Facebook => &["page_id", "page_access_token"],
    }
}

/// Every key `press-creds` knows about for a platform
pub fn known_keys(kind: PlatformKind) -> &'static [&'static str] {
    match kind {
        PlatformKind::X => &["api_key", "api_secret", "access_token", "access_token_secret"],
        PlatformKind::LinkedIn => &["client_secret", "access_token", "author_urn", OAUTH_TOKEN_KEY],
        PlatformKind::Bluesky => &["handle", "app_password"],
        PlatformKind::Facebook => &["app_secret", "page_id", "page_access_token", OAUTH_TOKEN_KEY],
    }
}

/// Token pair produced by an OAuth 2 exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds; `None` for non-expiring tokens
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl OAuthToken {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }

    pub fn expires_within(&self, now: i64, secs: i64) -> bool {
        self.expires_at.map(|at| at - now <= secs).unwrap_or(false)
    }
}

fn require(manager: &CredentialManager, kind: PlatformKind, key: &str) -> Result<String> {
    match manager.retrieve_optional(&kind.service(), key)? {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(missing(kind, key)),
    }
}

fn missing(kind: PlatformKind, key: &str) -> PresscastError {
    PlatformError::Authentication(format!(
        "{} credential '{}' is not set. Run: press-creds set {} {}",
        kind.display_name(),
        key,
        kind.as_str(),
        key
    ))
    .into()
}

/// OAuth 1.0a user-context credentials for X
#[derive(Debug, Clone)]
pub struct XCredentials {
    pub api_key: String,
    pub api_secret: SecretString,
    pub access_token: String,
    pub access_token_secret: SecretString,
}

impl XCredentials {
    pub fn load(manager: &CredentialManager) -> Result<Self> {
        let kind = PlatformKind::X;
        Ok(Self {
            api_key: require(manager, kind, "api_key")?,
            api_secret: SecretString::from(require(manager, kind, "api_secret")?),
            access_token: require(manager, kind, "access_token")?,
            access_token_secret: SecretString::from(require(manager, kind, "access_token_secret")?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct LinkedInCredentials {
    pub access_token: SecretString,
    /// `urn:li:person:...` or `urn:li:organization:...`; discovered when absent
    pub author_urn: Option<String>,
}

impl LinkedInCredentials {
    pub fn load(manager: &CredentialManager) -> Result<Self> {
        let kind = PlatformKind::LinkedIn;
        let access_token = match manager.load_oauth_token(kind)? {
            Some(token) => token.access_token,
            None => require(manager, kind, "access_token")?,
        };

        Ok(Self {
            access_token: SecretString::from(access_token),
            author_urn: manager
                .retrieve_optional(&kind.service(), "author_urn")?
                .filter(|urn| !urn.is_empty()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct BlueskyCredentials {
    pub handle: String,
    pub app_password: SecretString,
}

impl BlueskyCredentials {
    pub fn load(manager: &CredentialManager) -> Result<Self> {
        let kind = PlatformKind::Bluesky;
        Ok(Self {
            handle: require(manager, kind, "handle")?,
            app_password: SecretString::from(require(manager, kind, "app_password")?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct FacebookCredentials {
    pub page_id: String,
    pub page_access_token: SecretString,
}

impl FacebookCredentials {
    pub fn load(manager: &CredentialManager) -> Result<Self> {
        Self::load_for_page(manager, None)
    }

    /// Load credentials, preferring `page_id` from configuration when given
    pub fn load_for_page(manager: &CredentialManager, page_id: Option<&str>) -> Result<Self> {
        let kind = PlatformKind::Facebook;
        let page_id = match page_id.filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => require(manager, kind, "page_id")?,
        };

        // The OAuth flow stores the page token itself as the oauth_token
        let page_access_token = match manager.load_oauth_token(kind)? {
            Some(token) => token.access_token,
            None => require(manager, kind, "page_access_token")?,
        };

        Ok(Self {
            page_id,
            page_access_token: SecretString::from(page_access_token),
        })
    }
}

/// Manager over a single options file, for tests elsewhere in the crate
#[cfg(test)]
pub(crate) fn options_manager_at(path: &Path) -> CredentialManager {
    let config = CredentialConfig {
        storage: StorageBackend::Options,
        path: path.to_string_lossy().to_string(),
    };
    CredentialManager {
        stores: vec![Box::new(OptionsFileStore::new(path.to_path_buf()))],
        config,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    fn options_manager(temp: &TempDir) -> CredentialManager {
        let config = CredentialConfig {
            storage: StorageBackend::Options,
            path: temp.path().join("options.json").to_string_lossy().to_string(),
        };
        let store = OptionsFileStore::new(config.expand_path());
        CredentialManager::with_stores(vec![Box::new(store)], config).unwrap()
    }

    #[test]
    fn test_options_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = OptionsFileStore::new(temp.path().join("options.json"));

        store.store("presscast.x", "api_key", "key-123").unwrap();
        store.store("presscast.x", "api_secret", "secret").unwrap();
        store.store("presscast.bluesky", "handle", "alice.bsky.social").unwrap();

        assert_eq!(store.retrieve("presscast.x", "api_key").unwrap(), "key-123");
        assert!(store.exists("presscast.bluesky", "handle").unwrap());
        assert!(!store.exists("presscast.bluesky", "app_password").unwrap());

        // One JSON object per option name
        let raw = std::fs::read_to_string(temp.path().join("options.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["presscast.x"]["api_secret"], "secret");
    }

    #[test]
    fn test_options_store_missing_key_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = OptionsFileStore::new(temp.path().join("options.json"));

        match store.retrieve("presscast.x", "api_key") {
            Err(PresscastError::Credential(CredentialError::NotFound(name))) => {
                assert_eq!(name, "presscast.x.api_key");
            }
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_options_store_delete_missing_is_ok() {
        let temp = TempDir::new().unwrap();
        let store = OptionsFileStore::new(temp.path().join("options.json"));

        store.delete("presscast.x", "api_key").unwrap();

        store.store("presscast.x", "api_key", "v").unwrap();
        store.delete("presscast.x", "api_key").unwrap();
        assert!(!store.exists("presscast.x", "api_key").unwrap());
    }

    #[test]
    fn test_options_store_rejects_malformed_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("options.json");
        std::fs::write(&path, "not json").unwrap();

        let store = OptionsFileStore::new(path);
        let err = store.retrieve("presscast.x", "api_key").unwrap_err();
        assert!(matches!(
            err,
            PresscastError::Credential(CredentialError::Malformed(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_options_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("options.json");
        let store = OptionsFileStore::new(path.clone());
        store.store("presscast.x", "api_key", "v").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_options_store_refuses_symlink() {
        let temp = TempDir::new().unwrap();
        let real = temp.path().join("real.json");
        std::fs::write(&real, "{}").unwrap();
        let link = temp.path().join("options.json");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let store = OptionsFileStore::new(link);
        let err = store.retrieve("presscast.x", "api_key").unwrap_err();
        assert!(err.to_string().contains("symbolic link"));
    }

    struct FailingStore;

    impl CredentialStore for FailingStore {
        fn store(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Err(CredentialError::Keyring("locked".to_string()).into())
        }
        fn retrieve(&self, _: &str, _: &str) -> Result<String> {
            Err(CredentialError::Keyring("locked".to_string()).into())
        }
        fn delete(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
        fn exists(&self, _: &str, _: &str) -> Result<bool> {
            Ok(false)
        }
        fn backend_name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_manager_falls_through_only_on_not_found() {
        let temp = TempDir::new().unwrap();
        let first = OptionsFileStore::new(temp.path().join("first.json"));
        let second = OptionsFileStore::new(temp.path().join("second.json"));
        second.store("presscast.x", "api_key", "from-second").unwrap();

        let manager = CredentialManager::with_stores(
            vec![Box::new(first), Box::new(second)],
            CredentialConfig::default(),
        )
        .unwrap();
        assert_eq!(manager.retrieve("presscast.x", "api_key").unwrap(), "from-second");
        assert_eq!(manager.backends(), vec!["options", "options"]);

        let failing = CredentialManager::with_stores(
            vec![
                Box::new(FailingStore),
                Box::new(OptionsFileStore::new(temp.path().join("second.json"))),
            ],
            CredentialConfig::default(),
        )
        .unwrap();
        let err = failing.retrieve("presscast.x", "api_key").unwrap_err();
        assert!(err.to_string().contains("locked"));
        assert_eq!(failing.primary_backend(), Some("failing"));
    }

    #[test]
    fn test_manager_requires_a_store() {
        let result = CredentialManager::with_stores(Vec::new(), CredentialConfig::default());
        assert!(matches!(
            result,
            Err(PresscastError::Credential(CredentialError::NoStoreAvailable))
        ));
    }

    #[test]
    fn test_x_credentials_missing_key_names_fix() {
        let temp = TempDir::new().unwrap();
        let manager = options_manager(&temp);
        manager.store("presscast.x", "api_key", "k").unwrap();

        let err = XCredentials::load(&manager).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let message = err.to_string();
        assert!(message.contains("'api_secret'"));
        assert!(message.contains("press-creds set x api_secret"));
    }

    #[test]
    fn test_x_credentials_load() {
        let temp = TempDir::new().unwrap();
        let manager = options_manager(&temp);
        for (key, value) in [
            ("api_key", "ck"),
            ("api_secret", "cs"),
            ("access_token", "at"),
            ("access_token_secret", "ats"),
        ] {
            manager.store("presscast.x", key, value).unwrap();
        }

        let creds = XCredentials::load(&manager).unwrap();
        assert_eq!(creds.api_key, "ck");
        assert_eq!(creds.access_token_secret.expose_secret(), "ats");
        assert!(manager.has_credentials(PlatformKind::X).unwrap());
        assert!(!manager.has_credentials(PlatformKind::Bluesky).unwrap());
    }

    #[test]
    fn test_oauth_token_takes_precedence() {
        let temp = TempDir::new().unwrap();
        let manager = options_manager(&temp);
        manager
            .store("presscast.linkedin", "access_token", "manual")
            .unwrap();
        manager
            .store_oauth_token(
                PlatformKind::LinkedIn,
                &OAuthToken {
                    access_token: "from-oauth".to_string(),
                    refresh_token: Some("refresh".to_string()),
                    expires_at: Some(2_000),
                    scope: None,
                },
            )
            .unwrap();

        let creds = LinkedInCredentials::load(&manager).unwrap();
        assert_eq!(creds.access_token.expose_secret(), "from-oauth");
        assert!(creds.author_urn.is_none());
    }

    #[test]
    fn test_facebook_config_page_id_overrides_store() {
        let temp = TempDir::new().unwrap();
        let manager = options_manager(&temp);
        manager.store("presscast.facebook", "page_id", "111").unwrap();
        manager
            .store("presscast.facebook", "page_access_token", "tok")
            .unwrap();

        assert_eq!(FacebookCredentials::load(&manager).unwrap().page_id, "111");
        let creds = FacebookCredentials::load_for_page(&manager, Some("222")).unwrap();
        assert_eq!(creds.page_id, "222");
        assert_eq!(creds.page_access_token.expose_secret(), "tok");
    }

    #[test]
    fn test_malformed_oauth_token() {
        let temp = TempDir::new().unwrap();
        let manager = options_manager(&temp);
        manager
            .store("presscast.linkedin", OAUTH_TOKEN_KEY, "{broken")
            .unwrap();

        let err = LinkedInCredentials::load(&manager).unwrap_err();
        assert!(matches!(
            err,
            PresscastError::Credential(CredentialError::Malformed(_))
        ));
    }

    #[test]
    fn test_oauth_token_expiry() {
        let token = OAuthToken {
            access_token: "t".to_string(),
            refresh_token: None,
            expires_at: Some(1_000),
            scope: None,
        };
        assert!(!token.is_expired(999));
        assert!(token.is_expired(1_000));
        assert!(token.expires_within(900, 100));
        assert!(!token.expires_within(800, 100));

        let forever = OAuthToken {
            expires_at: None,
            ..token
        };
        assert!(!forever.is_expired(i64::MAX));
        assert!(!forever.expires_within(0, i64::MAX));
    }

    #[test]
    fn test_credential_debug_redacts_secrets() {
        let creds = BlueskyCredentials {
            handle: "alice.bsky.social".to_string(),
            app_password: SecretString::from("hunter2-hunter2".to_string()),
        };
        let debug = format!("{:?}", creds);
        assert!(debug.contains("alice.bsky.social"));
        assert!(!debug.contains("hunter2"));
    }
}

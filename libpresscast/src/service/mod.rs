//! Service layer for Presscast
//!
//! One facade, [`PresscastService`], wires configuration, the database, the
//! credential store and the platform clients together so every binary works
//! against the same API:
//!
//! - [`publish::PublishService`]: transition hook, manual and bulk shares, job runner
//! - [`Analytics`]: share log queries and engagement polling
//! - [`Scheduler`]: the one-shot job queue
//! - [`events::EventBus`]: progress event distribution
//!
//! # Example
//!
//! ```no_run
//! use libpresscast::service::PresscastService;
//! use libpresscast::types::SourcePost;
//!
//! # async fn example() -> libpresscast::Result<()> {
//! let service = PresscastService::new().await?;
//!
//! let post = SourcePost::new(42, "Hello", "https://blog.example/hello");
//! let report = service.publish().share_now(&post, &[], false).await?;
//! println!("Shared to {} platforms", report.outcomes.len());
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod publish;

use std::sync::Arc;

use self::events::{EventBus, EventReceiver};
use self::publish::PublishService;
use crate::analytics::Analytics;
use crate::credentials::CredentialManager;
use crate::dispatcher::Dispatcher;
use crate::error::ConfigError;
use crate::platforms::{LivePlatforms, PlatformSource};
use crate::scheduling::Scheduler;
use crate::wordpress::WordPressClient;
use crate::{Config, Database, Result};

/// Main service facade
///
/// All sub-services share one `Database` pool, one `Arc<Config>` and one
/// event bus.
pub struct PresscastService {
    config: Arc<Config>,
    db: Database,
    credentials: Arc<CredentialManager>,
    publish: PublishService,
    analytics: Analytics,
    scheduler: Scheduler,
    event_bus: EventBus,
}

impl PresscastService {
    /// Create a service from the default configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded, the credential
    /// store cannot be opened or the database cannot be initialized.
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Create a service talking to the live platform APIs
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = Database::new(&config.database.path).await?;
        let credentials = Arc::new(CredentialManager::new(config.credentials.clone())?);
        let platforms: Arc<dyn PlatformSource> =
            Arc::new(LivePlatforms::new(config.clone(), Arc::clone(&credentials)));
        Self::from_parts(config, db, credentials, platforms)
    }

    /// Assemble a service from already-built parts
    ///
    /// Tests use this to substitute mock platforms and in-memory databases.
    pub fn from_parts(
        config: Config,
        db: Database,
        credentials: Arc<CredentialManager>,
        platforms: Arc<dyn PlatformSource>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let event_bus = EventBus::default();
        let analytics = Analytics::new(db.clone());
        let scheduler = Scheduler::new(db.clone());

        let dispatcher = Dispatcher::new(
            Arc::clone(&config),
            db.clone(),
            platforms,
            event_bus.clone(),
        )?;
        let publish = PublishService::new(
            Arc::clone(&config),
            dispatcher,
            scheduler.clone(),
            analytics.clone(),
            event_bus.clone(),
        );

        Ok(Self {
            config,
            db,
            credentials,
            publish,
            analytics,
            scheduler,
            event_bus,
        })
    }

    pub fn publish(&self) -> &PublishService {
        &self.publish
    }

    pub fn analytics(&self) -> &Analytics {
        &self.analytics
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    /// WordPress client for the configured site
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `[wordpress]` is missing.
    pub fn wordpress(&self) -> Result<WordPressClient> {
        let wp = self.config.wordpress.as_ref().ok_or_else(|| {
            ConfigError::MissingField("[wordpress] site_url is required to fetch posts by id".to_string())
        })?;
        WordPressClient::from_config(wp, &self.credentials)
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }
}

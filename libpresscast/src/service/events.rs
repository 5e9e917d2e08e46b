//! Event system for progress tracking
//!
//! This module provides an in-process event bus for distributing share
//! progress to subscribers without blocking the dispatcher.
//!
//! # Architecture
//!
//! The event bus uses `tokio::sync::broadcast` for multi-subscriber support.
//! Events are emitted while shares, retries and jobs run, and can be consumed
//! by any number of subscribers (CLI progress output, the daemon log, tests).
//!
//! If no subscribers exist, events are dropped immediately. Subscribers can
//! lag without blocking emitters.
//!
//! # Example
//!
//! ```no_run
//! use libpresscast::service::events::{EventBus, Event};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::ShareStarted {
//!     post_id: 42,
//!     platforms: vec!["bluesky".to_string()],
//!     attempt: 1,
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event receiver type alias
pub type EventReceiver = broadcast::Receiver<Event>;

/// Event bus for distributing progress events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the specified capacity
    ///
    /// The capacity determines how many events can be buffered per subscriber
    /// before older events are dropped (if the subscriber is lagging).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Never blocks. Without subscribers the event is dropped.
    pub fn emit(&self, event: Event) {
        // send() only fails when nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Events emitted while sharing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Dispatch of a post began
    ShareStarted {
        post_id: i64,
        platforms: Vec<String>,
        attempt: u32,
    },

    ShareSucceeded {
        post_id: i64,
        platform: String,
        remote_id: String,
        url: Option<String>,
    },

    ShareFailed {
        post_id: i64,
        platform: String,
        category: String,
        error: String,
    },

    /// A one-shot retry job was queued
    RetryScheduled {
        post_id: i64,
        platform: String,
        attempt: u32,
        run_at: i64,
    },

    /// Credentials were rejected; the user must re-run `press-creds`
    ReauthRequired { post_id: i64, platform: String },

    /// A queued job finished (successfully or not)
    JobCompleted {
        job_id: String,
        post_id: i64,
        succeeded: usize,
        failed: usize,
    },
}

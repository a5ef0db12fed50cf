//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::config::Config;
use crate::websocket::{ConnectionHub, Notifier};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Chat connection hub
    pub hub: Arc<ConnectionHub>,
    /// Push handle for handlers merged into this router from outside the
    /// crate (articles, resources, private messages); chat routes never use it
    pub notifier: Notifier,
    pub config: Arc<Config>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Config, hub: Arc<ConnectionHub>, notifier: Notifier) -> Self {
        Self {
            hub,
            notifier,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

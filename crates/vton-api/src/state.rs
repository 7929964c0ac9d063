//! Shared server state.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::ApiConfig;

/// State behind every handler: the configuration and the bounded job
/// queue driver runs take permits from.
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: Semaphore,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: ApiConfig) -> SharedState {
        let permits = config.jobs.max_concurrent.max(1);
        Arc::new(Self {
            config,
            jobs: Semaphore::new(permits),
        })
    }
}

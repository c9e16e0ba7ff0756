//! Application state shared across handlers.

use std::sync::Arc;

use capture_engine::CaptureEngine;

use crate::config::ServerConfig;

/// Application state shared across all handlers.
///
/// This is cloneable and can be extracted in handlers using `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// Routing, queue and incubator over the shared store.
    engine: CaptureEngine,
    /// Server configuration.
    config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(engine: CaptureEngine, config: ServerConfig) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }

    pub fn engine(&self) -> &CaptureEngine {
        &self.engine
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

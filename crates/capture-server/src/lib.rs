//! capture-server: HTTP API for the capture router
//!
//! This crate provides:
//! - REST endpoints for routing, routing actions and the registry
//! - The export queue API and an optional webhook export worker
//! - Idea incubator suggestions and cooldowns
//! - Server-Sent Events (SSE) for engine notifications
//!
//! # Architecture
//!
//! The server is built on Axum with a middleware stack for:
//! - Request tracing and logging
//! - CORS handling
//! - JSON error responses
//!
//! All state lives in a [`capture_engine::CaptureEngine`] over a
//! file-backed key-value store.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod webhook;

// Re-exports for convenience
pub use config::{ConfigError, ServerConfig};
pub use error::{ApiError, ApiResult};
pub use state::AppState;
pub use webhook::WebhookSink;

// Re-export dependent crates
pub use capture_engine;

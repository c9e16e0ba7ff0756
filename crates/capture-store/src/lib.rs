//! capture-store: Persistent store for the capture router
//!
//! This crate provides:
//! - The async [`KvStore`] trait (JSON documents, per-key versions, CAS)
//! - [`MemoryStore`] for tests and ephemeral sessions
//! - [`JsonFileStore`], one JSON file per key with atomic replace
//! - [`DocumentStore`], typed access with optimistic read-modify-write
//!
//! # Usage
//!
//! ```rust,ignore
//! use capture_store::{DocumentStore, JsonFileStore, StoreConfig, keys};
//!
//! let backend = JsonFileStore::from_config(&StoreConfig::from_env()).await?;
//! let docs = DocumentStore::new(std::sync::Arc::new(backend));
//!
//! let registry: Vec<RegistryEntry> = docs.load_or_default(keys::REGISTRY).await?;
//! ```

pub mod documents;
pub mod error;
pub mod file;
pub mod memory;
pub mod store;

pub use documents::{DocumentStore, MAX_CAS_ATTEMPTS, Mutation, keys};
pub use error::{StoreError, StoreResult};
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use store::{KvStore, StoreConfig, Versioned};

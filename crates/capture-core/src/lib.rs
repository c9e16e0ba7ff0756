//! capture-core: shared types for the capture router.
//!
//! This crate provides:
//! - The capture payload and the extracted [`Topic`]
//! - Registry, pending-topic and routing result records
//! - Export job and idea incubator records
//! - Content identity hashing (keyword fingerprints, dedupe keys)
//! - A [`Clock`] abstraction for time-dependent components

pub mod clock;
pub mod identity;
pub mod ideas;
pub mod jobs;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock, system_clock};
pub use ideas::*;
pub use jobs::*;
pub use types::*;

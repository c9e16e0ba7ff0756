//! Time source abstraction.
//!
//! Cooldowns, rolling windows, retry timers and recency bonuses all depend
//! on "now". Components take an `Arc<dyn Clock>` so tests can pin time.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, RwLock};

/// A source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for tests and replays.
///
/// Clones share the same instant.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(now)),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.write() {
            *guard = now;
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.write() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.read().map(|t| *t).unwrap_or_else(|_| Utc::now())
    }
}

/// Returns the system clock as a shared trait object.
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

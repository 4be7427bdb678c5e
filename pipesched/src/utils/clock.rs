//! Wall-clock source used by the scheduler.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt::Debug;

/// A source of the current UTC time.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Sets the current time.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.write() = at;
    }

    /// Moves the clock forward.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.write();
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

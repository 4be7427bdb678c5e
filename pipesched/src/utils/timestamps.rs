//! Timestamp utilities.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Represents a UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Milliseconds since the Unix epoch, clamped at zero.
#[must_use]
pub fn unix_millis(at: Timestamp) -> u64 {
    u64::try_from(at.timestamp_millis()).unwrap_or(0)
}

/// Converts a signed chrono delta into a std duration, clamping negatives to zero.
#[must_use]
pub fn to_std_duration(delta: chrono::Duration) -> Duration {
    delta.to_std().unwrap_or(Duration::ZERO)
}

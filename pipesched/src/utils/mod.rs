//! Clock abstraction and timestamp helpers.

mod clock;
pub mod timestamps;

pub use clock::{Clock, ManualClock, SystemClock};
pub use timestamps::{to_std_duration, unix_millis, Timestamp};

//! Value types shared by every component: fixed-point amounts and the
//! simulated calendar.

pub mod amount;
pub mod time;

pub use amount::{Amount, AmountError};
pub use time::{months_to_expiry, SimClock, TimeAdvance, SECONDS_PER_DAY};

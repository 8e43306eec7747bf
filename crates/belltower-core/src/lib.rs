//! # Belltower Core
//!
//! Shared foundation for the belltower alert engine: configuration, the
//! error taxonomy, and the weekday-set type used by recurrence math.

pub mod config;
pub mod days;
pub mod error;

pub use config::AlertsConfig;
pub use days::DaySet;
pub use error::{AlertsError, ConflictReason, Result};

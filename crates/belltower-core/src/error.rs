//! Error taxonomy for the alert engine.
//!
//! Every variant is a recoverable, caller-visible condition. Bad input never
//! panics or aborts the engine; it fails the single operation that carried it.

use thiserror::Error;

/// Why conflict resolution rejected a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// A repeating alert of the same kind already occupies this time of day.
    RepeatingAtSameTime,
    /// An alert with the exact same weekday set and time of day exists.
    IdenticalDaySet,
    /// The new weekday set is narrower than, or equal in size to, an
    /// overlapping existing set.
    NarrowerDaySet,
    /// Two one-shot alerts share the exact same fire instant.
    IdenticalInstant,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictReason::RepeatingAtSameTime => "repeating alert already at this time",
            ConflictReason::IdenticalDaySet => "identical day set at this time",
            ConflictReason::NarrowerDaySet => "day set not broader than an overlapping alert",
            ConflictReason::IdenticalInstant => "one-shot alert already at this instant",
        };
        f.write_str(s)
    }
}

/// Main error type for belltower operations.
#[derive(Error, Debug)]
pub enum AlertsError {
    #[error("token already registered: {0}")]
    DuplicateToken(String),

    #[error("registration rejected: {0}")]
    Rejected(ConflictReason),

    #[error("no alert with token: {0}")]
    NotFound(String),

    #[error("malformed schedule: {0}")]
    MalformedSchedule(String),

    #[error("timer host error: {0}")]
    TimerHost(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias.
pub type Result<T> = std::result::Result<T, AlertsError>;

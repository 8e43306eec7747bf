//! Outbound event payloads: plain data the protocol collaborator formats and
//! ships. The engine never does wire formatting itself.

use serde::{Deserialize, Serialize};

/// Why a ring stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    UserStopped,
    Snoozed,
    Superseded,
    DurationElapsed,
    Removed,
    Reset,
}

/// Structured notification emitted toward the event collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum AlertEvent {
    #[serde(rename_all = "camelCase")]
    AlertStarted { play_service_id: String, token: String },
    #[serde(rename_all = "camelCase")]
    AlertStopped {
        play_service_id: String,
        token: String,
        reason: StopReason,
    },
    /// One per service id and coalescing window, carrying every token whose
    /// fire instant was yielded to a later-created alert.
    #[serde(rename_all = "camelCase")]
    AlertIgnored {
        play_service_id: String,
        tokens: Vec<String>,
    },
    /// A remote ring asset has not been confirmed close to the fire instant.
    #[serde(rename_all = "camelCase")]
    AlertAssetRequired { play_service_id: String, token: String },
}

/// Receives engine notifications. Implementations must be cheap and
/// non-blocking; calls may arrive on the timer thread.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AlertEvent);
}

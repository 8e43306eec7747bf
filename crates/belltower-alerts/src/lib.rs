//! # Belltower Alerts
//!
//! Alarm/timer/sleep scheduling engine: decides which registered alert fires
//! next, when, and how conflicting or simultaneous alerts are resolved.
//! Directive decoding, audio playback, and network transport stay outside;
//! this crate only talks to them through traits.
//!
//! ## Design Principles
//! - All calendar math in a fixed reference offset (+9:00) — no host tzdata
//! - Every timer is a one-shot; recurrence means re-arming on the next pass
//! - One mutex around scheduler state; callbacks run outside the lock
//! - Simultaneous fire instants coalesce into one batched ignored event
//!
//! ## Architecture
//! ```text
//! AlertScheduler (caller-thread API)
//!   ├── timecalc: "07:30:00" + MON..FRI → seconds until next fire
//!   ├── AlertStore: token → AlertItem, creation-order tie-breaks
//!   └── TimerHost ("alert-timer" thread, own event loop)
//!         └── expiry → scheduler → AlertLifecycle (0-or-1 ringing)
//!               ├── EventSink: started / stopped / ignored / asset-required
//!               └── PlaybackSink: request_play / request_stop
//! ```

pub mod events;
pub mod host;
pub mod item;
pub mod lifecycle;
pub mod scheduler;
pub mod store;
pub mod timecalc;

pub use events::{AlertEvent, EventSink, StopReason};
pub use host::{TimerEvent, TimerHandle, TimerHost};
pub use item::{
    AlertItem, AlertKind, AlertSnapshot, AlertSpec, NormalizedSchedule, Recurrence, RepeatSpec,
    ResourceType,
};
pub use lifecycle::{AlertLifecycle, PlaybackSink};
pub use scheduler::{AlertScheduler, AlertsListener};
pub use store::AlertStore;

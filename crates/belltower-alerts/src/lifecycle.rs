//! Ringing state machine: turns scheduler callbacks into play/stop
//! transitions and owns the single currently-ringing slot.

use std::sync::{Arc, Mutex, MutexGuard};

use belltower_core::error::{AlertsError, Result};

use crate::events::{AlertEvent, EventSink, StopReason};
use crate::item::{AlertKind, AlertSpec, ResourceType};
use crate::scheduler::{AlertScheduler, AlertsListener};

/// Playback collaborator. The engine never performs audio I/O itself; it
/// only asks for rings to start and stop.
pub trait PlaybackSink: Send + Sync {
    fn request_play(&self, token: &str, kind: AlertKind, resource: ResourceType);
    fn request_stop(&self, token: &str, reason: StopReason);
}

#[derive(Debug, Clone)]
struct Ringing {
    token: String,
    ps_id: String,
}

/// Facade over the scheduler that owns the 0-or-1 ringing alert.
pub struct AlertLifecycle {
    scheduler: Arc<AlertScheduler>,
    playback: Arc<dyn PlaybackSink>,
    events: Arc<dyn EventSink>,
    ringing: Mutex<Option<Ringing>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AlertLifecycle {
    /// Build the lifecycle and install it as the scheduler's listener.
    pub fn attach(
        scheduler: Arc<AlertScheduler>,
        playback: Arc<dyn PlaybackSink>,
        events: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        let lifecycle = Arc::new(Self {
            scheduler,
            playback,
            events,
            ringing: Mutex::new(None),
        });
        let as_listener: Arc<dyn AlertsListener> = lifecycle.clone();
        lifecycle.scheduler.set_listener(&as_listener);
        lifecycle
    }

    pub fn register(&self, spec: AlertSpec) -> Result<String> {
        self.scheduler.register(spec)
    }

    /// Remove an alert, stopping its ring first if it is the one ringing.
    pub fn remove(&self, token: &str) -> Result<()> {
        let was_ringing = self.ringing_token().as_deref() == Some(token);
        if was_ringing {
            self.stop_current(StopReason::Removed);
        }
        if self.scheduler.remove(token) || was_ringing {
            Ok(())
        } else {
            Err(AlertsError::NotFound(token.to_string()))
        }
    }

    /// Snooze an alarm, stopping its ring first if it is the one ringing.
    pub fn snooze(&self, token: &str, secs: u32) -> Result<()> {
        if self.ringing_token().as_deref() == Some(token) {
            self.stop_current(StopReason::Snoozed);
        }
        self.scheduler.snooze(token, secs)
    }

    /// User-initiated stop of the current ring.
    pub fn stop(&self) {
        self.stop_current(StopReason::UserStopped);
    }

    /// Stop any ring and drop every alert.
    pub fn reset(&self) {
        self.stop_current(StopReason::Reset);
        self.scheduler.reset();
    }

    pub fn is_ringing(&self) -> bool {
        lock(&self.ringing).is_some()
    }

    pub fn ringing_token(&self) -> Option<String> {
        lock(&self.ringing).as_ref().map(|r| r.token.clone())
    }

    pub fn scheduler(&self) -> &Arc<AlertScheduler> {
        &self.scheduler
    }

    fn stop_current(&self, reason: StopReason) {
        let current = lock(&self.ringing).take();
        let Some(ring) = current else {
            return;
        };
        tracing::info!(token = %ring.token, ?reason, "stop ringing");
        self.scheduler.complete(&ring.token, true);
        self.playback.request_stop(&ring.token, reason);
        self.events.emit(AlertEvent::AlertStopped {
            play_service_id: ring.ps_id,
            token: ring.token,
            reason,
        });
    }
}

impl AlertsListener for AlertLifecycle {
    fn on_fire(&self, token: &str) {
        let Some(snap) = self.scheduler.snapshot(token) else {
            tracing::warn!(%token, "fired alert vanished");
            return;
        };
        // Whatever is ringing now yields to the newly fired alert.
        self.stop_current(StopReason::Superseded);
        *lock(&self.ringing) = Some(Ringing {
            token: snap.token.clone(),
            ps_id: snap.ps_id.clone(),
        });
        tracing::info!(%token, kind = %snap.kind.as_str(), "ringing");
        self.events.emit(AlertEvent::AlertStarted {
            play_service_id: snap.ps_id,
            token: snap.token,
        });
        self.scheduler.start_duration(token);
        self.playback.request_play(token, snap.kind, snap.resource);
    }

    fn on_asset_pending(&self, token: &str) {
        let Some(snap) = self.scheduler.snapshot(token) else {
            return;
        };
        // Only remote assets need confirmation ahead of the fire instant.
        if snap.resource.is_remote() {
            tracing::info!(%token, resource = ?snap.resource, "ring asset not yet delivered");
            self.events.emit(AlertEvent::AlertAssetRequired {
                play_service_id: snap.ps_id,
                token: snap.token,
            });
        }
    }

    fn on_duration_elapsed(&self, token: &str) {
        if self.ringing_token().as_deref() == Some(token) {
            self.stop_current(StopReason::DurationElapsed);
        }
    }
}

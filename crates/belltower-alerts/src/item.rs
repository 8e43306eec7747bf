//! Alert data model: the decoded directive payload and its runtime form.

use belltower_core::config::AlertsConfig;
use belltower_core::days::DaySet;
use serde::{Deserialize, Serialize};

use crate::host::TimerHandle;

/// Alert categories. At most one Timer and one Sleep item may be registered
/// at a time; registering a new one evicts the previous item of the same
/// kind. Alarms and Actions accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertKind {
    Timer,
    Alarm,
    Sleep,
    Action,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Timer => "TIMER",
            AlertKind::Alarm => "ALARM",
            AlertKind::Sleep => "SLEEP",
            AlertKind::Action => "ACTION",
        }
    }
}

/// Where ring audio comes from. Music and TTS are remote assets that must be
/// delivered to the device before the fire instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceType {
    #[default]
    Internal,
    Music,
    Tts,
}

impl ResourceType {
    pub fn is_remote(&self) -> bool {
        matches!(self, ResourceType::Music | ResourceType::Tts)
    }
}

/// Repeat clause of a directive payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeatSpec {
    /// `DAILY` or `WEEKLY`.
    #[serde(rename = "type")]
    pub repeat_type: String,
    #[serde(default)]
    pub days_of_week: Vec<String>,
}

/// Decoded `SetAlert` directive payload, field-for-field as the protocol
/// layer hands it over.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSpec {
    pub token: String,
    pub play_service_id: String,
    pub alert_type: AlertKind,
    /// `H:M:S` for repeating alerts, `Y-M-DTH:M:S` for one-shot alerts.
    pub scheduled_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatSpec>,
    pub activation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_resource_type: Option<ResourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_required_in_milliseconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_duration_in_sec: Option<u32>,
}

/// When a normalized schedule recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    /// Fire once at an absolute instant (epoch seconds).
    Once { epoch: i64 },
    /// Fire every week on each day in the set.
    Weekly,
}

/// Schedule normalized into the engine's internal representation. One-shot
/// schedules also carry the weekday bit and time-of-day of their instant so
/// conflict resolution can compare them against repeating alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedSchedule {
    pub days: DaySet,
    /// Seconds since local midnight.
    pub time_of_day: u32,
    pub recurrence: Recurrence,
}

impl NormalizedSchedule {
    pub fn repeats(&self) -> bool {
        matches!(self.recurrence, Recurrence::Weekly)
    }
}

/// One registered alert and its runtime bookkeeping.
#[derive(Debug)]
pub struct AlertItem {
    pub spec: AlertSpec,
    pub kind: AlertKind,
    pub resource: ResourceType,
    pub schedule: NormalizedSchedule,
    pub active: bool,
    /// Minimum ring duration in seconds.
    pub duration_secs: u32,
    /// Asset pre-warning lead in seconds; 0 disables the asset timer.
    pub asset_lead_secs: u32,
    /// Transient one-shot delay override; consumed by the next fire cycle.
    pub snooze_secs: u32,
    /// Recomputed on every scheduling pass.
    pub ignored: bool,
    /// Monotonic creation sequence, the total tie-break order.
    pub created_seq: u64,
    /// Absolute fire instant cached by the last scheduling pass.
    pub pending_fire_at: Option<i64>,
    pub fire_timer: Option<TimerHandle>,
    pub asset_timer: Option<TimerHandle>,
    pub duration_timer: Option<TimerHandle>,
}

impl AlertItem {
    pub fn new(
        spec: AlertSpec,
        schedule: NormalizedSchedule,
        config: &AlertsConfig,
        created_seq: u64,
    ) -> Self {
        let kind = spec.alert_type;
        let resource = spec.alarm_resource_type.unwrap_or_default();
        let duration_secs = match kind {
            // Sleep rings only long enough to emit start/stop in order.
            AlertKind::Sleep => 1,
            _ => spec.min_duration_in_sec.unwrap_or(config.default_duration_secs),
        };
        let asset_lead_secs = (spec.asset_required_in_milliseconds.unwrap_or(0) / 1000) as u32;
        let active = spec.activation;
        Self {
            spec,
            kind,
            resource,
            schedule,
            active,
            duration_secs,
            asset_lead_secs,
            snooze_secs: 0,
            ignored: false,
            created_seq,
            pending_fire_at: None,
            fire_timer: None,
            asset_timer: None,
            duration_timer: None,
        }
    }

    pub fn token(&self) -> &str {
        &self.spec.token
    }

    pub fn ps_id(&self) -> &str {
        &self.spec.play_service_id
    }

    pub fn repeats(&self) -> bool {
        self.schedule.repeats()
    }

    /// Absolute instant for one-shot schedules.
    pub fn fire_epoch(&self) -> Option<i64> {
        match self.schedule.recurrence {
            Recurrence::Once { epoch } => Some(epoch),
            Recurrence::Weekly => None,
        }
    }

    /// Cancel and forget every armed timer.
    pub fn clear_timers(&mut self) {
        if let Some(t) = self.fire_timer.take() {
            t.cancel();
        }
        if let Some(t) = self.asset_timer.take() {
            t.cancel();
        }
        if let Some(t) = self.duration_timer.take() {
            t.cancel();
        }
    }

    /// Finish the current fire cycle: timers, cached instant, snooze request.
    pub fn done(&mut self) {
        self.clear_timers();
        self.pending_fire_at = None;
        self.snooze_secs = 0;
    }

    pub fn deactivate(&mut self) {
        self.done();
        self.active = false;
        self.spec.activation = false;
    }
}

/// Read-only view of an item handed to listeners outside the state lock.
#[derive(Debug, Clone)]
pub struct AlertSnapshot {
    pub token: String,
    pub ps_id: String,
    pub kind: AlertKind,
    pub resource: ResourceType,
    pub schedule: NormalizedSchedule,
    pub active: bool,
    pub ignored: bool,
    pub duration_secs: u32,
    pub pending_fire_at: Option<i64>,
}

impl AlertSnapshot {
    pub fn of(item: &AlertItem) -> Self {
        Self {
            token: item.token().to_string(),
            ps_id: item.ps_id().to_string(),
            kind: item.kind,
            resource: item.resource,
            schedule: item.schedule,
            active: item.active,
            ignored: item.ignored,
            duration_secs: item.duration_secs,
            pending_fire_at: item.pending_fire_at,
        }
    }
}

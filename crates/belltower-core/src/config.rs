//! Belltower configuration system.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AlertsError, Result};

/// Engine configuration.
///
/// Calendar fields in alert schedules are interpreted in a fixed reference
/// offset rather than the host timezone database; devices this engine serves
/// ship without tzdata and the service contract pins the offset to +9:00.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Minimum ring duration when the directive carries none.
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: u32,
    /// Grace period after an alarm stops during which snooze still applies.
    #[serde(default = "default_snooze_availability_secs")]
    pub snooze_availability_secs: u32,
    /// Coalescing window for batching ignored-alert notifications.
    #[serde(default = "default_ignore_batch_window_secs")]
    pub ignore_batch_window_secs: u32,
    /// Fixed UTC offset, in hours, for all calendar interpretation.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    /// Alarm-count ceiling advertised to context consumers.
    #[serde(default = "default_max_alarms")]
    pub max_alarms: u32,
}

fn default_duration_secs() -> u32 { 180 }
fn default_snooze_availability_secs() -> u32 { 30 }
fn default_ignore_batch_window_secs() -> u32 { 1 }
fn default_utc_offset_hours() -> i32 { 9 }
fn default_max_alarms() -> u32 { 50 }

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            default_duration_secs: default_duration_secs(),
            snooze_availability_secs: default_snooze_availability_secs(),
            ignore_batch_window_secs: default_ignore_batch_window_secs(),
            utc_offset_hours: default_utc_offset_hours(),
            max_alarms: default_max_alarms(),
        }
    }
}

impl AlertsConfig {
    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AlertsError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Total alert ceiling: alarms plus one Timer and one Sleep slot.
    pub fn max_alerts(&self) -> u32 {
        self.max_alarms + 2
    }
}

//! Pure schedule math: normalizing directive time fields and computing the
//! number of seconds until the next fire instant.
//!
//! All calendar fields are interpreted in a fixed reference offset (+9:00 by
//! default), never the host timezone database. Target devices ship without
//! tzdata and the service contract pins the offset; keep it that way.

use belltower_core::days::DaySet;
use belltower_core::error::{AlertsError, Result};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::item::{NormalizedSchedule, Recurrence, RepeatSpec};

pub const SECS_PER_DAY: i64 = 86_400;

const REPEAT_FORMAT: &str = "%H:%M:%S";
const ONESHOT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Build the reference offset from the configured hour count.
pub fn reference_offset(utc_offset_hours: i32) -> Result<FixedOffset> {
    FixedOffset::east_opt(utc_offset_hours * 3600).ok_or_else(|| {
        AlertsError::MalformedSchedule(format!("invalid utc offset: {utc_offset_hours}"))
    })
}

/// Current time in the reference offset.
pub fn now_in(offset: FixedOffset) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset)
}

/// Normalize a directive schedule into the internal representation.
///
/// With a repeat clause the scheduled time is a bare time of day; without one
/// it is a full local datetime whose calendar fields are wall-clock in the
/// reference offset.
pub fn normalize(
    scheduled_time: &str,
    repeat: Option<&RepeatSpec>,
    offset: FixedOffset,
) -> Result<NormalizedSchedule> {
    match repeat {
        Some(rep) => {
            let time = NaiveTime::parse_from_str(scheduled_time, REPEAT_FORMAT).map_err(|e| {
                AlertsError::MalformedSchedule(format!("bad repeat time '{scheduled_time}': {e}"))
            })?;
            let days = if rep.repeat_type == "DAILY" {
                DaySet::ALL
            } else {
                DaySet::from_day_names(&rep.days_of_week)?
            };
            if days.is_empty() {
                return Err(AlertsError::MalformedSchedule("empty day set".into()));
            }
            Ok(NormalizedSchedule {
                days,
                time_of_day: time.num_seconds_from_midnight(),
                recurrence: Recurrence::Weekly,
            })
        }
        None => {
            let local = NaiveDateTime::parse_from_str(scheduled_time, ONESHOT_FORMAT).map_err(
                |e| {
                    AlertsError::MalformedSchedule(format!(
                        "bad scheduled time '{scheduled_time}': {e}"
                    ))
                },
            )?;
            let epoch = local.and_utc().timestamp() - i64::from(offset.local_minus_utc());
            Ok(NormalizedSchedule {
                days: DaySet::single(local.weekday().num_days_from_sunday()),
                time_of_day: local.time().num_seconds_from_midnight(),
                recurrence: Recurrence::Once { epoch },
            })
        }
    }
}

/// Seconds from `now` until the schedule's next fire instant.
///
/// One-shot results may be negative (already due). Weekly results are always
/// in `[0, 7 * 86400)`: the nearest set weekday counting from today, where
/// today only qualifies while the time of day has not passed yet.
pub fn next_fire_after(now: DateTime<FixedOffset>, schedule: &NormalizedSchedule) -> i64 {
    match schedule.recurrence {
        Recurrence::Once { epoch } => epoch - now.timestamp(),
        Recurrence::Weekly => {
            let now_wday = now.weekday().num_days_from_sunday();
            let now_tod = i64::from(now.time().num_seconds_from_midnight());
            let tod = i64::from(schedule.time_of_day);

            let mut min_days = 7i64;
            for day in 0..7u32 {
                if !schedule.days.contains_day(day) {
                    continue;
                }
                let mut k = i64::from((day + 7 - now_wday) % 7);
                if k == 0 && tod < now_tod {
                    k = 7;
                }
                if k < min_days {
                    min_days = k;
                }
            }
            min_days * SECS_PER_DAY + tod - now_tod
        }
    }
}

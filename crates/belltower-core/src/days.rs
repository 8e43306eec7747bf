//! Weekday bitset for repeating alerts.

use serde::{Deserialize, Serialize};

use crate::error::{AlertsError, Result};

/// 7-bit set of weekdays. Bit 0 is Sunday, bit 6 is Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DaySet(u8);

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

impl DaySet {
    pub const NONE: DaySet = DaySet(0x00);
    pub const SUN: DaySet = DaySet(0x01);
    pub const MON: DaySet = DaySet(0x02);
    pub const TUE: DaySet = DaySet(0x04);
    pub const WED: DaySet = DaySet(0x08);
    pub const THU: DaySet = DaySet(0x10);
    pub const FRI: DaySet = DaySet(0x20);
    pub const SAT: DaySet = DaySet(0x40);
    pub const WEEKDAYS: DaySet = DaySet(0x3e);
    pub const WEEKEND: DaySet = DaySet(0x41);
    pub const ALL: DaySet = DaySet(0x7f);

    /// Set containing only the given weekday (0 = Sunday .. 6 = Saturday).
    pub fn single(weekday_from_sunday: u32) -> DaySet {
        DaySet(1 << (weekday_from_sunday % 7))
    }

    /// Parse a list of upper-case day names ("SUN".."SAT").
    pub fn from_day_names<S: AsRef<str>>(names: &[S]) -> Result<DaySet> {
        let mut set = DaySet::NONE;
        for name in names {
            let name = name.as_ref();
            let idx = DAY_NAMES
                .iter()
                .position(|d| *d == name)
                .ok_or_else(|| AlertsError::MalformedSchedule(format!("unknown day name: {name}")))?;
            set = set.union(DaySet::single(idx as u32));
        }
        Ok(set)
    }

    pub fn contains_day(&self, weekday_from_sunday: u32) -> bool {
        self.0 & (1 << (weekday_from_sunday % 7)) != 0
    }

    pub fn overlaps(&self, other: DaySet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn union(&self, other: DaySet) -> DaySet {
        DaySet(self.0 | other.0)
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for DaySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (idx, name) in DAY_NAMES.iter().enumerate() {
            if self.contains_day(idx as u32) {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

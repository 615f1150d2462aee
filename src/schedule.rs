//! Recurrence evaluation — the single source of truth for "which slots are
//! scheduled for dose D on date Day?".
//!
//! Both the reminder engine and the rendering-side derivations (checklist,
//! calendar) call [`due_slots`]; no other code re-derives recurrence.

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::models::Dose;

const ALL_DAYS: u8 = 0b0111_1111;

/// Subset of the seven weekdays, bit 0 = Monday … bit 6 = Sunday.
///
/// Serialized as a sorted list of day indices (0–6), the shape the schedule
/// editor produces. "Daily" is the full subset; recurrence has exactly one
/// representation, never a separate daily flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn full() -> Self {
        Self(ALL_DAYS)
    }

    pub fn from_days(days: &[Weekday]) -> Self {
        let mut set = Self::empty();
        for day in days {
            set.insert(*day);
        }
        set
    }

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= Self::bit(day);
    }

    pub fn remove(&mut self, day: Weekday) {
        self.0 &= !Self::bit(day);
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// All seven days selected. The UI renders this as "daily".
    pub fn is_daily(&self) -> bool {
        self.0 == ALL_DAYS
    }

    pub fn len(&self) -> u32 {
        self.0.count_ones()
    }

    /// Day indices in ascending order, 0 = Monday … 6 = Sunday.
    pub fn day_indices(&self) -> Vec<u8> {
        (0..7).filter(|i| self.0 & (1 << i) != 0).collect()
    }
}

impl Serialize for WeekdaySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.day_indices().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for WeekdaySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let indices = Vec::<u8>::deserialize(deserializer)?;
        let mut set = WeekdaySet::empty();
        for idx in indices {
            if idx > 6 {
                return Err(D::Error::custom(format!("weekday index out of range: {idx}")));
            }
            set.0 |= 1 << idx;
        }
        Ok(set)
    }
}

/// One recurring time-of-day with its active weekdays and optional end date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRule {
    pub time: NaiveTime,
    pub weekdays: WeekdaySet,
    pub end_date: Option<NaiveDate>,
}

/// Scheduled times-of-day for `dose` on `date`, ascending and deduplicated.
///
/// Pure and deterministic: no I/O, no clock. A slot is due when its weekday
/// set contains the date's weekday, its end date (if any) has not passed,
/// the dose has started, and the dose is active.
pub fn due_slots(dose: &Dose, date: NaiveDate) -> Vec<NaiveTime> {
    if !dose.is_active || date < dose.start_date {
        return Vec::new();
    }
    let weekday = date.weekday();
    let mut times: Vec<NaiveTime> = dose
        .schedule
        .iter()
        .filter(|rule| rule.weekdays.contains(weekday))
        .filter(|rule| rule.end_date.map_or(true, |end| date <= end))
        .map(|rule| rule.time)
        .collect();
    times.sort();
    times.dedup();
    times
}

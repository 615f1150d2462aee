//! Calendar screen backend — per-day adherence summaries for the month and
//! week heat maps.
//!
//! A day with nothing resolved is NoData, not 0%: the cell renders empty
//! rather than red, and the completion ratio is undefined rather than zero.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::checklist::slot_state;
use crate::db::repository::fetch_doses_for_profile;
use crate::db::DatabaseError;
use crate::ledger::{self, AdherenceEntry};
use crate::models::{DayStatus, Dose, EntryStatus, SlotState};
use crate::schedule::due_slots;

/// Aggregated outcome of one calendar day.
#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub scheduled: u32,
    pub taken: u32,
    pub skipped: u32,
    pub missed: u32,
    pub status: DayStatus,
}

impl DaySummary {
    /// `taken / (taken + skipped + missed)`. Undefined (None) when nothing
    /// is resolved yet, which is distinct from 0%.
    pub fn completion_ratio(&self) -> Option<f64> {
        let resolved = self.taken + self.skipped + self.missed;
        if resolved == 0 {
            None
        } else {
            Some(f64::from(self.taken) / f64::from(resolved))
        }
    }
}

/// Pure aggregation of one day from the dose set and that day's entries.
fn summarize_day(
    doses: &[Dose],
    entries: &[&AdherenceEntry],
    date: NaiveDate,
    now: NaiveDateTime,
) -> DaySummary {
    let mut scheduled = 0u32;
    let mut taken = 0u32;
    let mut skipped = 0u32;
    let mut missed = 0u32;
    let mut matched: Vec<i64> = Vec::new();

    for dose in doses {
        for slot in due_slots(dose, date) {
            scheduled += 1;
            let entry = entries
                .iter()
                .find(|e| e.dose_id == dose.id && e.slot_time == slot)
                .copied();
            if let Some(e) = entry {
                matched.push(e.id);
            }
            match slot_state(date, slot, now, entry) {
                SlotState::Taken => taken += 1,
                SlotState::Skipped => skipped += 1,
                SlotState::Missed => missed += 1,
                SlotState::Upcoming => {}
            }
        }
    }

    // Entries with no scheduled slot still count: PRN logs and history from
    // doses that were edited or deleted since.
    for entry in entries {
        if matched.contains(&entry.id) {
            continue;
        }
        match entry.status {
            EntryStatus::Taken => taken += 1,
            EntryStatus::Skipped => skipped += 1,
        }
    }

    let resolved = taken + skipped + missed;
    let status = if resolved == 0 {
        DayStatus::NoData
    } else if taken == resolved {
        DayStatus::Complete
    } else if taken > 0 {
        DayStatus::Partial
    } else {
        DayStatus::AllMissed
    };

    DaySummary {
        date,
        scheduled,
        taken,
        skipped,
        missed,
        status,
    }
}

/// Summary of a single day.
pub fn day_summary(
    conn: &Connection,
    profile_id: &Uuid,
    date: NaiveDate,
    now: NaiveDateTime,
) -> Result<DaySummary, DatabaseError> {
    let doses = fetch_doses_for_profile(conn, profile_id)?;
    let entries = ledger::entries_for_date(conn, profile_id, date)?;
    let refs: Vec<&AdherenceEntry> = entries.iter().collect();
    Ok(summarize_day(&doses, &refs, date, now))
}

/// Summaries for an inclusive date range, one per day.
pub fn range_summaries(
    conn: &Connection,
    profile_id: &Uuid,
    start: NaiveDate,
    end: NaiveDate,
    now: NaiveDateTime,
) -> Result<Vec<DaySummary>, DatabaseError> {
    let doses = fetch_doses_for_profile(conn, profile_id)?;
    let entries = ledger::entries_in_range(conn, profile_id, start, end)?;

    let mut by_date: HashMap<NaiveDate, Vec<&AdherenceEntry>> = HashMap::new();
    for entry in &entries {
        by_date.entry(entry.date).or_default().push(entry);
    }

    let mut summaries = Vec::new();
    let mut day = start;
    while day <= end {
        let day_entries = by_date.get(&day).map(Vec::as_slice).unwrap_or(&[]);
        summaries.push(summarize_day(&doses, day_entries, day, now));
        day = day.succ_opt().ok_or_else(|| {
            DatabaseError::ConstraintViolation("date range exceeds calendar".into())
        })?;
    }
    Ok(summaries)
}

/// Summaries for one calendar month.
pub fn month_summaries(
    conn: &Connection,
    profile_id: &Uuid,
    year: i32,
    month: u32,
    now: NaiveDateTime,
) -> Result<Vec<DaySummary>, DatabaseError> {
    let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        DatabaseError::ConstraintViolation(format!("invalid month: {year}-{month}"))
    })?;
    let end = last_day_of_month(start);
    range_summaries(conn, profile_id, start, end, now)
}

/// Summaries for the week starting at `week_start`.
pub fn week_summaries(
    conn: &Connection,
    profile_id: &Uuid,
    week_start: NaiveDate,
    now: NaiveDateTime,
) -> Result<Vec<DaySummary>, DatabaseError> {
    range_summaries(
        conn,
        profile_id,
        week_start,
        week_start + chrono::Duration::days(6),
        now,
    )
}

fn last_day_of_month(first: NaiveDate) -> NaiveDate {
    let (next_year, next_month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    // The first of the next month always exists when `first` does.
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .map(|d| d - chrono::Duration::days(1))
        .unwrap_or(first)
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

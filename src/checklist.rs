//! Checklist screen backend — per-dose slot states for one date.
//!
//! Missed is derived here, never read from storage: every due slot is either
//! resolved (a ledger row), still ahead of the clock (upcoming), or elapsed
//! with no row (missed).

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::db::repository::fetch_doses_for_profile;
use crate::db::DatabaseError;
use crate::ledger::{self, AdherenceEntry};
use crate::models::{DoseKind, EntryStatus, SlotState};
use crate::schedule::due_slots;

/// One scheduled slot with its display state.
#[derive(Debug, Clone, Serialize)]
pub struct ChecklistSlot {
    pub time: NaiveTime,
    pub state: SlotState,
    pub acted_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// A manual log entry outside the current schedule: a PRN dose, or a slot
/// removed by a later edit.
#[derive(Debug, Clone, Serialize)]
pub struct LoggedEntry {
    pub time: NaiveTime,
    pub status: EntryStatus,
    pub acted_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// One dose's row on the checklist.
#[derive(Debug, Clone, Serialize)]
pub struct ChecklistItem {
    pub dose_id: i64,
    pub name: String,
    pub dosage: Option<String>,
    pub kind: DoseKind,
    pub icon: String,
    pub color: i64,
    pub is_prn: bool,
    pub slots: Vec<ChecklistSlot>,
    pub logged: Vec<LoggedEntry>,
}

/// Display state of one slot given its ledger entry (if any) and the clock.
pub fn slot_state(
    date: NaiveDate,
    slot: NaiveTime,
    now: NaiveDateTime,
    entry: Option<&AdherenceEntry>,
) -> SlotState {
    match entry.map(|e| e.status) {
        Some(EntryStatus::Taken) => SlotState::Taken,
        Some(EntryStatus::Skipped) => SlotState::Skipped,
        None => {
            if date.and_time(slot) <= now {
                SlotState::Missed
            } else {
                SlotState::Upcoming
            }
        }
    }
}

/// Build the checklist for a profile and date.
pub fn checklist_for_date(
    conn: &Connection,
    profile_id: &Uuid,
    date: NaiveDate,
    now: NaiveDateTime,
) -> Result<Vec<ChecklistItem>, DatabaseError> {
    let doses = fetch_doses_for_profile(conn, profile_id)?;
    let entries = ledger::entries_for_date(conn, profile_id, date)?;

    let mut items = Vec::with_capacity(doses.len());
    for dose in doses {
        let dose_entries: Vec<&AdherenceEntry> =
            entries.iter().filter(|e| e.dose_id == dose.id).collect();
        let scheduled = due_slots(&dose, date);

        let slots: Vec<ChecklistSlot> = scheduled
            .iter()
            .map(|&slot| {
                let entry = dose_entries.iter().find(|e| e.slot_time == slot).copied();
                ChecklistSlot {
                    time: slot,
                    state: slot_state(date, slot, now, entry),
                    acted_at: entry.map(|e| e.acted_at),
                    reason: entry.and_then(|e| e.reason.clone()),
                }
            })
            .collect();

        let logged: Vec<LoggedEntry> = dose_entries
            .iter()
            .filter(|e| !scheduled.contains(&e.slot_time))
            .map(|e| LoggedEntry {
                time: e.slot_time,
                status: e.status,
                acted_at: e.acted_at,
                reason: e.reason.clone(),
            })
            .collect();

        items.push(ChecklistItem {
            dose_id: dose.id,
            name: dose.name.clone(),
            dosage: dose.dosage.clone(),
            kind: dose.kind,
            icon: dose.icon.clone(),
            color: dose.color,
            is_prn: dose.is_prn(),
            slots,
            logged,
        });
    }
    Ok(items)
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

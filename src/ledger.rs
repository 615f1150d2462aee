//! Adherence Ledger — per-slot outcome records and the queries behind the
//! checklist, calendar and adherence metric.
//!
//! One row per resolved (dose, date, time) slot. Rows are never mutated in
//! place: corrections are remove-then-reinsert. Missed is never written —
//! an elapsed slot with no row renders as missed at query time. Every
//! caller (interactive checklist, notification resolution) funnels through
//! `record_taken` / `record_skipped`; nothing else writes this table.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::EntryStatus;

/// One persisted outcome record.
#[derive(Debug, Clone)]
pub struct AdherenceEntry {
    pub id: i64,
    pub dose_id: i64,
    pub profile_id: Uuid,
    pub date: NaiveDate,
    pub slot_time: NaiveTime,
    pub status: EntryStatus,
    pub acted_at: DateTime<Utc>,
    pub reason: Option<String>,
}

fn time_str(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn profile_of_dose(conn: &Connection, dose_id: i64) -> Result<Uuid, DatabaseError> {
    let id: Option<String> = conn
        .query_row(
            "SELECT profile_id FROM doses WHERE id = ?1",
            params![dose_id],
            |row| row.get(0),
        )
        .optional()?;
    match id {
        Some(id) => Ok(id.parse().unwrap_or_else(|_| Uuid::nil())),
        None => Err(DatabaseError::NotFound {
            entity_type: "Dose".into(),
            id: dose_id.to_string(),
        }),
    }
}

fn existing_status(
    conn: &Connection,
    dose_id: i64,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<Option<String>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT status FROM intake_entries
             WHERE dose_id = ?1 AND entry_date = ?2 AND slot_time = ?3",
            params![dose_id, date.to_string(), time_str(time)],
            |row| row.get(0),
        )
        .optional()?)
}

/// Record a Taken outcome for a slot. Idempotent: if a Taken entry already
/// exists for the key, nothing changes and `false` is returned. A Skipped
/// entry for the same key is replaced (remove-then-reinsert).
pub fn record_taken(
    conn: &Connection,
    dose_id: i64,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<bool, DatabaseError> {
    let profile_id = profile_of_dose(conn, dose_id)?;

    match existing_status(conn, dose_id, date, time)?.as_deref() {
        Some("taken") => {
            tracing::debug!(dose_id, %date, "Taken already recorded, no-op");
            return Ok(false);
        }
        Some(_) => {
            conn.execute(
                "DELETE FROM intake_entries
                 WHERE dose_id = ?1 AND entry_date = ?2 AND slot_time = ?3",
                params![dose_id, date.to_string(), time_str(time)],
            )?;
        }
        None => {}
    }

    conn.execute(
        "INSERT INTO intake_entries (dose_id, profile_id, entry_date, slot_time, status, acted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            dose_id,
            profile_id.to_string(),
            date.to_string(),
            time_str(time),
            EntryStatus::Taken.as_str(),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(true)
}

/// Record a Skipped outcome for a slot. A Taken entry for the same key is
/// removed first: Taken and Skipped are mutually exclusive per slot.
pub fn record_skipped(
    conn: &Connection,
    dose_id: i64,
    date: NaiveDate,
    time: NaiveTime,
    reason: Option<&str>,
) -> Result<(), DatabaseError> {
    let profile_id = profile_of_dose(conn, dose_id)?;

    conn.execute(
        "DELETE FROM intake_entries
         WHERE dose_id = ?1 AND entry_date = ?2 AND slot_time = ?3",
        params![dose_id, date.to_string(), time_str(time)],
    )?;
    conn.execute(
        "INSERT INTO intake_entries (dose_id, profile_id, entry_date, slot_time, status, acted_at, reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            dose_id,
            profile_id.to_string(),
            date.to_string(),
            time_str(time),
            EntryStatus::Skipped.as_str(),
            Utc::now().to_rfc3339(),
            reason,
        ],
    )?;
    Ok(())
}

/// Toggle a Taken entry off. Unchecking removes the row; it does not
/// insert a Skipped one. Returns whether a row was removed.
pub fn remove_taken(
    conn: &Connection,
    dose_id: i64,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<bool, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM intake_entries
         WHERE dose_id = ?1 AND entry_date = ?2 AND slot_time = ?3 AND status = 'taken'",
        params![dose_id, date.to_string(), time_str(time)],
    )?;
    Ok(deleted > 0)
}

/// Whether a Taken entry exists for the slot (the reminder engine's
/// "already taken" check).
pub fn taken_exists(
    conn: &Connection,
    dose_id: i64,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<bool, DatabaseError> {
    Ok(existing_status(conn, dose_id, date, time)?.as_deref() == Some("taken"))
}

const ENTRY_COLUMNS: &str =
    "id, dose_id, profile_id, entry_date, slot_time, status, acted_at, reason";

struct EntryRow {
    id: i64,
    dose_id: i64,
    profile_id: String,
    entry_date: String,
    slot_time: String,
    status: String,
    acted_at: String,
    reason: Option<String>,
}

fn map_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok(EntryRow {
        id: row.get(0)?,
        dose_id: row.get(1)?,
        profile_id: row.get(2)?,
        entry_date: row.get(3)?,
        slot_time: row.get(4)?,
        status: row.get(5)?,
        acted_at: row.get(6)?,
        reason: row.get(7)?,
    })
}

fn row_to_entry(row: EntryRow) -> Result<AdherenceEntry, DatabaseError> {
    Ok(AdherenceEntry {
        id: row.id,
        dose_id: row.dose_id,
        profile_id: row.profile_id.parse().unwrap_or_else(|_| Uuid::nil()),
        date: NaiveDate::parse_from_str(&row.entry_date, "%Y-%m-%d").map_err(|e| {
            DatabaseError::ConstraintViolation(format!("invalid entry_date: {e}"))
        })?,
        slot_time: NaiveTime::parse_from_str(&row.slot_time, "%H:%M").map_err(|e| {
            DatabaseError::ConstraintViolation(format!("invalid slot_time: {e}"))
        })?,
        status: row.status.parse()?,
        acted_at: DateTime::parse_from_rfc3339(&row.acted_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        reason: row.reason,
    })
}

/// All entries for a profile on one date, ordered by slot time. A date with
/// no entries yields an empty sequence, never a zero-filled one.
pub fn entries_for_date(
    conn: &Connection,
    profile_id: &Uuid,
    date: NaiveDate,
) -> Result<Vec<AdherenceEntry>, DatabaseError> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM intake_entries
         WHERE profile_id = ?1 AND entry_date = ?2
         ORDER BY slot_time ASC, dose_id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![profile_id.to_string(), date.to_string()], map_entry_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(row_to_entry).collect()
}

/// All entries for a profile in an inclusive date range, chronological.
/// Backs calendar rendering and the overall adherence percentage.
pub fn entries_in_range(
    conn: &Connection,
    profile_id: &Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<AdherenceEntry>, DatabaseError> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM intake_entries
         WHERE profile_id = ?1 AND entry_date >= ?2 AND entry_date <= ?3
         ORDER BY entry_date ASC, slot_time ASC, dose_id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![profile_id.to_string(), start.to_string(), end.to_string()],
            map_entry_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(row_to_entry).collect()
}

/// Full history for one dose, chronological.
pub fn entries_for_dose(
    conn: &Connection,
    dose_id: i64,
) -> Result<Vec<AdherenceEntry>, DatabaseError> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM intake_entries
         WHERE dose_id = ?1
         ORDER BY entry_date ASC, slot_time ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![dose_id], map_entry_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(row_to_entry).collect()
}

/// Overall adherence over a set of entries: `taken * 100 / total` with
/// integer truncation, 0 when there are no entries.
pub fn adherence_percent(entries: &[AdherenceEntry]) -> u32 {
    let total = entries.len() as u32;
    if total == 0 {
        return 0;
    }
    let taken = entries
        .iter()
        .filter(|e| e.status == EntryStatus::Taken)
        .count() as u32;
    taken * 100 / total
}

/// Adherence percentage for a profile over an inclusive date range.
pub fn adherence_percent_in_range(
    conn: &Connection,
    profile_id: &Uuid,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<u32, DatabaseError> {
    let entries = entries_in_range(conn, profile_id, start, end)?;
    Ok(adherence_percent(&entries))
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

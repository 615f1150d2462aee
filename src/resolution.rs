//! Notification resolution — converts a "Mark Taken" action (delivered
//! asynchronously, outside normal UI navigation) into a ledger mutation and
//! a retracted notification, exactly once per physical action.
//!
//! Safe to invoke repeatedly for the same payload: the ledger's
//! `record_taken` is idempotent, and cancelling an already-cancelled
//! notification id is harmless.

use rusqlite::Connection;

use crate::db::repository::fetch_dose;
use crate::db::DatabaseError;
use crate::ledger;
use crate::reminder::{NotificationPresenter, ReminderPayload};

/// What the action resolved to. `AlreadyRecorded` covers a second tap
/// arriving before the notification is retracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Recorded,
    AlreadyRecorded,
    UnknownDose,
}

/// Resolve a "Mark Taken" action.
pub fn resolve_mark_taken(
    conn: &Connection,
    payload: &ReminderPayload,
    notifications: &dyn NotificationPresenter,
) -> Result<ResolutionOutcome, DatabaseError> {
    if fetch_dose(conn, payload.dose_id)?.is_none() {
        // Payload references a since-deleted dose: no ledger mutation, but
        // a lingering notification is still retracted.
        tracing::debug!(dose_id = payload.dose_id, "Mark-taken for deleted dose, discarded");
        notifications.cancel(payload.slot_id());
        return Ok(ResolutionOutcome::UnknownDose);
    }

    let inserted = ledger::record_taken(conn, payload.dose_id, payload.date, payload.time)?;
    notifications.cancel(payload.slot_id());

    if inserted {
        tracing::info!(
            dose_id = payload.dose_id,
            date = %payload.date,
            "Dose marked taken from notification"
        );
        Ok(ResolutionOutcome::Recorded)
    } else {
        Ok(ResolutionOutcome::AlreadyRecorded)
    }
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

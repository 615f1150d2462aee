//! Reminder engine — maintains the one-reminder-per-due-slot invariant as
//! dose definitions, ledger entries and the clock change.
//!
//! The platform's alarm and notification services sit behind the
//! [`AlarmScheduler`] and [`NotificationPresenter`] seams. Slot ids are
//! derived arithmetically from `(dose_id, hour, minute)`, so cancellation
//! never needs a persisted registry: the engine keeps only an in-memory set
//! of ids it registered in this process.

use std::collections::HashSet;

use chrono::{Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository::{fetch_dose, fetch_doses_for_profile};
use crate::db::DatabaseError;
use crate::ledger;
use crate::schedule::due_slots;

/// Refusals from the platform capabilities. Always recoverable: the affected
/// slot is skipped until permission returns and a reschedule pass re-runs.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Permission denied by the platform")]
    PermissionDenied,
}

/// One-shot wake-up callbacks at an absolute time, cancelable by id.
/// Delivery is at-least-once and best-effort; the engine never assumes
/// exactly-once and re-checks state when a callback fires.
pub trait AlarmScheduler: Send + Sync {
    fn schedule(&self, id: i64, at_epoch_millis: i64, payload: &[u8])
        -> Result<(), CapabilityError>;
    fn cancel(&self, id: i64);
}

/// Persistent notifications with a single user action, cancelable by id.
pub trait NotificationPresenter: Send + Sync {
    fn show(
        &self,
        id: i64,
        title: &str,
        body: &str,
        action_label: &str,
        action_payload: &[u8],
    ) -> Result<(), CapabilityError>;
    fn cancel(&self, id: i64);
    fn cancel_all(&self);
}

/// Deterministic id for a (dose, time-of-day) slot. Serves as both the
/// wake-up id and the notification id.
pub fn slot_id(dose_id: i64, time: NaiveTime) -> i64 {
    dose_id * 10_000 + (time.hour() * 100 + time.minute()) as i64
}

/// Recover the dose id a slot id was derived from.
pub fn dose_of_slot(slot_id: i64) -> i64 {
    slot_id / 10_000
}

/// Payload carried through the wake-up and notification action round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPayload {
    pub dose_id: i64,
    pub dose_name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl ReminderPayload {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn slot_id(&self) -> i64 {
        slot_id(self.dose_id, self.time)
    }
}

/// Map a wall-clock slot to an epoch instant. DST ambiguity resolves to the
/// earlier instant; a time inside a DST gap has no instant and yields None.
fn local_epoch_millis(date: NaiveDate, time: NaiveTime) -> Option<i64> {
    match Local.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(dt) => Some(dt.timestamp_millis()),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.timestamp_millis()),
        LocalResult::None => None,
    }
}

/// Result of one reschedule pass. Permission refusals are collected, never
/// raised: one slot's failure must not sink the pass.
#[derive(Debug, Clone, Default)]
pub struct RescheduleOutcome {
    pub scheduled: Vec<i64>,
    pub permission_denied: Vec<i64>,
}

impl RescheduleOutcome {
    pub fn is_clean(&self) -> bool {
        self.permission_denied.is_empty()
    }
}

/// Outcome of a wake-up callback firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeOutcome {
    /// Notification displayed.
    Shown,
    /// Taken meanwhile (stale-slot race): suppressed, nothing shown.
    AlreadyTaken,
    /// Dose deleted since registration: discarded.
    UnknownDose,
    /// Notification capability refused.
    PermissionDenied,
}

/// Owns the set of registered wake-up ids and runs the reschedule pass.
pub struct ReminderEngine {
    registered: HashSet<i64>,
}

impl ReminderEngine {
    pub fn new() -> Self {
        Self {
            registered: HashSet::new(),
        }
    }

    /// Ids currently registered, ascending (primarily for assertions and
    /// status display).
    pub fn registered_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.registered.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Cancel every wake-up this engine owns.
    pub fn cancel_all(&mut self, alarms: &dyn AlarmScheduler) {
        for id in self.registered.drain() {
            alarms.cancel(id);
        }
    }

    /// Cancel the wake-ups belonging to one dose. Runs synchronously with
    /// the triggering call (dose deletion) so no stale callback can fire
    /// after the user has seen the deletion confirmed.
    pub fn cancel_dose(&mut self, dose_id: i64, alarms: &dyn AlarmScheduler) {
        let ids: Vec<i64> = self
            .registered
            .iter()
            .copied()
            .filter(|id| dose_of_slot(*id) == dose_id)
            .collect();
        for id in ids {
            self.registered.remove(&id);
            alarms.cancel(id);
        }
        tracing::debug!(dose_id, "Cancelled dose reminders");
    }

    /// The full reschedule pass. Runs on app start, any dose add/edit/delete,
    /// any ledger mutation, and the notifications-enabled toggle.
    ///
    /// Cancellation of everything previously registered is unconditional and
    /// completes before any re-registration, never interleaved per dose, so
    /// a slot removed by an edit loses its stale wake-up even though no new
    /// one replaces it.
    pub fn reschedule(
        &mut self,
        conn: &Connection,
        profile_id: &Uuid,
        now: NaiveDateTime,
        notifications_enabled: bool,
        alarms: &dyn AlarmScheduler,
        notifications: &dyn NotificationPresenter,
    ) -> Result<RescheduleOutcome, DatabaseError> {
        self.cancel_all(alarms);

        if !notifications_enabled {
            notifications.cancel_all();
            tracing::info!("Notifications disabled, reminders stay cancelled");
            return Ok(RescheduleOutcome::default());
        }

        let today = now.date();
        let mut outcome = RescheduleOutcome::default();

        for dose in fetch_doses_for_profile(conn, profile_id)? {
            for slot in due_slots(&dose, today) {
                if slot <= now.time() {
                    continue;
                }
                if ledger::taken_exists(conn, dose.id, today, slot)? {
                    continue;
                }

                let id = slot_id(dose.id, slot);
                let Some(at) = local_epoch_millis(today, slot) else {
                    tracing::warn!(dose_id = dose.id, %slot, "Slot falls in a DST gap, skipping");
                    continue;
                };
                let payload = ReminderPayload {
                    dose_id: dose.id,
                    dose_name: dose.name.clone(),
                    date: today,
                    time: slot,
                };
                let bytes = match payload.to_bytes() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::error!(dose_id = dose.id, %slot, "Payload encoding failed: {e}");
                        continue;
                    }
                };

                match alarms.schedule(id, at, &bytes) {
                    Ok(()) => {
                        self.registered.insert(id);
                        outcome.scheduled.push(id);
                    }
                    Err(CapabilityError::PermissionDenied) => {
                        tracing::warn!(
                            dose_id = dose.id,
                            %slot,
                            "Wake-up registration refused, slot left unscheduled"
                        );
                        outcome.permission_denied.push(id);
                    }
                }
            }
        }

        tracing::debug!(
            scheduled = outcome.scheduled.len(),
            refused = outcome.permission_denied.len(),
            "Reminder reschedule pass complete"
        );
        Ok(outcome)
    }
}

impl Default for ReminderEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// A wake-up callback fired. Re-checks "already taken" (the race against a
/// concurrent manual log) before displaying anything.
pub fn handle_wake(
    conn: &Connection,
    payload: &ReminderPayload,
    notifications: &dyn NotificationPresenter,
) -> Result<WakeOutcome, DatabaseError> {
    let Some(dose) = fetch_dose(conn, payload.dose_id)? else {
        tracing::debug!(dose_id = payload.dose_id, "Wake-up for deleted dose, discarded");
        return Ok(WakeOutcome::UnknownDose);
    };

    if ledger::taken_exists(conn, payload.dose_id, payload.date, payload.time)? {
        tracing::debug!(dose_id = payload.dose_id, "Already taken, reminder suppressed");
        return Ok(WakeOutcome::AlreadyTaken);
    }

    let body = format!(
        "Did you take {} at {}?",
        dose.name,
        payload.time.format("%H:%M")
    );
    let bytes = payload.to_bytes().unwrap_or_else(|e| {
        tracing::error!(dose_id = payload.dose_id, "Payload encoding failed: {e}");
        Vec::new()
    });
    match notifications.show(payload.slot_id(), "Dose reminder", &body, "Mark Taken", &bytes) {
        Ok(()) => Ok(WakeOutcome::Shown),
        Err(CapabilityError::PermissionDenied) => {
            tracing::warn!(dose_id = payload.dose_id, "Notification display refused");
            Ok(WakeOutcome::PermissionDenied)
        }
    }
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

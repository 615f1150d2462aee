//! Shared application state — the single owner of all mutation.
//!
//! Every dose, ledger and settings change funnels through these entry
//! points; screens hold immutable snapshots and refresh through the
//! [`ChangeNotifier`]. Each mutation is followed by a reminder reschedule
//! pass, so the one-reminder-per-due-slot invariant holds no matter which
//! caller (checklist, edit form, notification action) triggered it.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository;
use crate::db::{self, DatabaseError};
use crate::events::{ChangeEvent, ChangeNotifier};
use crate::ledger;
use crate::models::{Dose, DoseInput, Profile};
use crate::reminder::{
    handle_wake, slot_id, AlarmScheduler, NotificationPresenter, ReminderEngine,
    ReminderPayload, RescheduleOutcome, WakeOutcome,
};
use crate::resolution::{resolve_mark_taken, ResolutionOutcome};
use crate::settings::{self, Settings};

const MAX_NAME_LEN: usize = 100;
const MAX_DOSAGE_LEN: usize = 100;
const MAX_NOTE_LEN: usize = 500;
const MAX_REASON_LEN: usize = 500;

/// Errors from state-level operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("No active profile")]
    NoActiveProfile,
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Shared state between the UI shell and the OS-driven delivery context.
///
/// Wrapped in `Arc` at startup. The reminder engine sits behind a `Mutex` so
/// reschedule passes are sequential: cancel-all always completes before any
/// re-registration, even when callers interleave.
pub struct AppState {
    db_path: PathBuf,
    active_profile: RwLock<Option<Uuid>>,
    engine: Mutex<ReminderEngine>,
    alarms: Arc<dyn AlarmScheduler>,
    notifications: Arc<dyn NotificationPresenter>,
    notifier: ChangeNotifier,
}

impl AppState {
    pub fn new(
        db_path: PathBuf,
        alarms: Arc<dyn AlarmScheduler>,
        notifications: Arc<dyn NotificationPresenter>,
    ) -> Self {
        Self {
            db_path,
            active_profile: RwLock::new(None),
            engine: Mutex::new(ReminderEngine::new()),
            alarms,
            notifications,
            notifier: ChangeNotifier::new(),
        }
    }

    /// Open a database connection. Most entry points open one per
    /// operation; migrations are a version-checked no-op after the first.
    pub fn open_db(&self) -> Result<Connection, CoreError> {
        Ok(db::open_database(&self.db_path)?)
    }

    /// Register a listener for state-change events.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.notifier.subscribe(listener);
    }

    // ── Profiles ────────────────────────────────────────────

    pub fn active_profile(&self) -> Result<Uuid, CoreError> {
        self.active_profile
            .read()
            .map_err(|_| CoreError::LockPoisoned)?
            .ok_or(CoreError::NoActiveProfile)
    }

    /// Create a profile. The first profile created becomes active.
    pub fn create_profile(&self, name: &str) -> Result<Profile, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::InvalidInput("Profile name is required".into()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(CoreError::InvalidInput("Profile name too long".into()));
        }

        let conn = self.open_db()?;
        let profile = repository::insert_profile(&conn, name)?;

        let mut active = self
            .active_profile
            .write()
            .map_err(|_| CoreError::LockPoisoned)?;
        if active.is_none() {
            *active = Some(profile.id);
        }
        drop(active);

        self.notifier.emit(&ChangeEvent::ProfileChanged);
        Ok(profile)
    }

    pub fn list_profiles(&self) -> Result<Vec<Profile>, CoreError> {
        let conn = self.open_db()?;
        Ok(repository::fetch_profiles(&conn)?)
    }

    /// Switch the active profile and reschedule reminders for it.
    pub fn set_active_profile(&self, profile_id: Uuid) -> Result<(), CoreError> {
        let conn = self.open_db()?;
        if repository::fetch_profile(&conn, &profile_id)?.is_none() {
            return Err(CoreError::Database(DatabaseError::NotFound {
                entity_type: "Profile".into(),
                id: profile_id.to_string(),
            }));
        }

        *self
            .active_profile
            .write()
            .map_err(|_| CoreError::LockPoisoned)? = Some(profile_id);

        self.run_reschedule(&conn, Local::now().naive_local())?;
        self.notifier.emit(&ChangeEvent::ProfileChanged);
        Ok(())
    }

    /// Delete a profile and its doses. Deleting the active profile cancels
    /// all of its reminders and leaves no profile active.
    pub fn delete_profile(&self, profile_id: Uuid) -> Result<(), CoreError> {
        let conn = self.open_db()?;

        let mut active = self
            .active_profile
            .write()
            .map_err(|_| CoreError::LockPoisoned)?;
        if *active == Some(profile_id) {
            *active = None;
            let mut engine = self.engine.lock().map_err(|_| CoreError::LockPoisoned)?;
            engine.cancel_all(self.alarms.as_ref());
        }
        drop(active);

        repository::delete_profile(&conn, &profile_id)?;
        self.notifier.emit(&ChangeEvent::ProfileChanged);
        Ok(())
    }

    // ── Doses ───────────────────────────────────────────────

    /// Add a dose to the active profile. Returns the assigned id.
    pub fn add_dose(&self, input: &DoseInput) -> Result<i64, CoreError> {
        validate_dose_input(input)?;
        let profile_id = self.active_profile()?;
        let conn = self.open_db()?;

        let dose_id = repository::insert_dose(&conn, &profile_id, input)?;
        self.run_reschedule(&conn, Local::now().naive_local())?;
        self.notifier.emit(&ChangeEvent::DosesChanged);
        Ok(dose_id)
    }

    /// Edit a dose. The schedule is replaced; id and ledger history are
    /// preserved, and stale slots lose their wake-ups in the pass.
    pub fn update_dose(&self, dose_id: i64, input: &DoseInput) -> Result<(), CoreError> {
        validate_dose_input(input)?;
        let conn = self.open_db()?;

        repository::update_dose(&conn, dose_id, input)?;
        self.run_reschedule(&conn, Local::now().naive_local())?;
        self.notifier.emit(&ChangeEvent::DosesChanged);
        Ok(())
    }

    /// Delete a dose. Its wake-ups are cancelled synchronously with this
    /// call, before the row is removed, so no stale callback can fire
    /// after the user has seen the deletion confirmed. Ledger entries are
    /// retained.
    pub fn delete_dose(&self, dose_id: i64) -> Result<(), CoreError> {
        let conn = self.open_db()?;

        {
            let mut engine = self.engine.lock().map_err(|_| CoreError::LockPoisoned)?;
            engine.cancel_dose(dose_id, self.alarms.as_ref());
        }
        // Retract any displayed notification for the dose's slots.
        if let Some(dose) = repository::fetch_dose(&conn, dose_id)? {
            for rule in &dose.schedule {
                self.notifications.cancel(slot_id(dose_id, rule.time));
            }
        }

        repository::delete_dose(&conn, dose_id)?;
        self.run_reschedule(&conn, Local::now().naive_local())?;
        self.notifier.emit(&ChangeEvent::DosesChanged);
        Ok(())
    }

    pub fn list_doses(&self) -> Result<Vec<Dose>, CoreError> {
        let profile_id = self.active_profile()?;
        let conn = self.open_db()?;
        Ok(repository::fetch_doses_for_profile(&conn, &profile_id)?)
    }

    pub fn get_dose(&self, dose_id: i64) -> Result<Option<Dose>, CoreError> {
        let conn = self.open_db()?;
        Ok(repository::fetch_dose(&conn, dose_id)?)
    }

    // ── Ledger ──────────────────────────────────────────────

    /// Mark a slot taken (checklist check, or manual PRN log). Idempotent.
    /// Retracts any displayed notification for the slot and reschedules.
    pub fn mark_taken(
        &self,
        dose_id: i64,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<bool, CoreError> {
        let conn = self.open_db()?;
        let inserted = ledger::record_taken(&conn, dose_id, date, time)?;

        self.notifications.cancel(slot_id(dose_id, time));
        self.run_reschedule(&conn, Local::now().naive_local())?;
        self.notifier.emit(&ChangeEvent::LedgerChanged { date });
        Ok(inserted)
    }

    /// Toggle a taken slot back off (checklist uncheck). The entry is
    /// removed, never replaced by a Skipped one.
    pub fn unmark_taken(
        &self,
        dose_id: i64,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<bool, CoreError> {
        let conn = self.open_db()?;
        let removed = ledger::remove_taken(&conn, dose_id, date, time)?;

        self.run_reschedule(&conn, Local::now().naive_local())?;
        self.notifier.emit(&ChangeEvent::LedgerChanged { date });
        Ok(removed)
    }

    /// Mark a slot skipped with an optional reason.
    pub fn mark_skipped(
        &self,
        dose_id: i64,
        date: NaiveDate,
        time: NaiveTime,
        reason: Option<&str>,
    ) -> Result<(), CoreError> {
        if let Some(reason) = reason {
            if reason.len() > MAX_REASON_LEN {
                return Err(CoreError::InvalidInput(
                    "Reason must be 500 characters or fewer".into(),
                ));
            }
        }
        let conn = self.open_db()?;
        ledger::record_skipped(&conn, dose_id, date, time, reason)?;

        self.run_reschedule(&conn, Local::now().naive_local())?;
        self.notifier.emit(&ChangeEvent::LedgerChanged { date });
        Ok(())
    }

    // ── Settings ────────────────────────────────────────────

    pub fn settings(&self) -> Result<Settings, CoreError> {
        let conn = self.open_db()?;
        Ok(settings::load_settings(&conn)?)
    }

    /// Toggle notifications. Disabling cancels every wake-up and clears all
    /// displayed notifications, synchronously with this call.
    pub fn set_notifications_enabled(&self, enabled: bool) -> Result<(), CoreError> {
        let conn = self.open_db()?;
        settings::set_notifications_enabled(&conn, enabled)?;

        self.run_reschedule(&conn, Local::now().naive_local())?;
        self.notifier.emit(&ChangeEvent::SettingsChanged);
        Ok(())
    }

    // ── Reminders ───────────────────────────────────────────

    /// Full reschedule pass at the current wall clock. Run on app start and
    /// on resume from background.
    pub fn reschedule_reminders(&self) -> Result<RescheduleOutcome, CoreError> {
        self.reschedule_at(Local::now().naive_local())
    }

    /// Deterministic variant of [`Self::reschedule_reminders`] for replays
    /// and tests.
    pub fn reschedule_at(&self, now: NaiveDateTime) -> Result<RescheduleOutcome, CoreError> {
        let conn = self.open_db()?;
        self.run_reschedule(&conn, now)
    }

    fn run_reschedule(
        &self,
        conn: &Connection,
        now: NaiveDateTime,
    ) -> Result<RescheduleOutcome, CoreError> {
        let active = *self
            .active_profile
            .read()
            .map_err(|_| CoreError::LockPoisoned)?;
        let mut engine = self.engine.lock().map_err(|_| CoreError::LockPoisoned)?;

        let Some(profile_id) = active else {
            engine.cancel_all(self.alarms.as_ref());
            return Ok(RescheduleOutcome::default());
        };

        let enabled = settings::notifications_enabled(conn)?;
        Ok(engine.reschedule(
            conn,
            &profile_id,
            now,
            enabled,
            self.alarms.as_ref(),
            self.notifications.as_ref(),
        )?)
    }

    /// Wake-up ids currently registered (status display, assertions).
    pub fn registered_reminders(&self) -> Result<Vec<i64>, CoreError> {
        let engine = self.engine.lock().map_err(|_| CoreError::LockPoisoned)?;
        Ok(engine.registered_ids())
    }

    // ── OS-driven delivery context ──────────────────────────

    /// A wake-up callback fired. Re-checks the ledger before displaying.
    pub fn alarm_fired(&self, payload: &[u8]) -> Result<WakeOutcome, CoreError> {
        let payload = ReminderPayload::from_bytes(payload)?;
        let conn = self.open_db()?;
        Ok(handle_wake(&conn, &payload, self.notifications.as_ref())?)
    }

    /// The user tapped "Mark Taken" on a notification. Idempotent; screens
    /// refresh through the change signal without a manual reload.
    pub fn notification_action(&self, payload: &[u8]) -> Result<ResolutionOutcome, CoreError> {
        let payload = ReminderPayload::from_bytes(payload)?;
        let conn = self.open_db()?;
        let outcome = resolve_mark_taken(&conn, &payload, self.notifications.as_ref())?;

        if outcome == ResolutionOutcome::Recorded {
            self.run_reschedule(&conn, Local::now().naive_local())?;
            self.notifier.emit(&ChangeEvent::LedgerChanged {
                date: payload.date,
            });
        }
        Ok(outcome)
    }
}

fn validate_dose_input(input: &DoseInput) -> Result<(), CoreError> {
    if input.name.trim().is_empty() {
        return Err(CoreError::InvalidInput("Name is required".into()));
    }
    if input.name.len() > MAX_NAME_LEN {
        return Err(CoreError::InvalidInput("Name too long".into()));
    }
    if let Some(ref dosage) = input.dosage {
        if dosage.len() > MAX_DOSAGE_LEN {
            return Err(CoreError::InvalidInput("Dosage text too long".into()));
        }
    }
    if let Some(ref note) = input.note {
        if note.len() > MAX_NOTE_LEN {
            return Err(CoreError::InvalidInput(
                "Note must be 500 characters or fewer".into(),
            ));
        }
    }
    for rule in &input.schedule {
        if rule.weekdays.is_empty() {
            return Err(CoreError::InvalidInput(
                "Each scheduled time needs at least one weekday".into(),
            ));
        }
        if rule.time.second() != 0 || rule.time.nanosecond() != 0 {
            return Err(CoreError::InvalidInput(
                "Scheduled times have minute granularity".into(),
            ));
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DoseKind;
    use crate::reminder::test_support::{FakeAlarms, FakeNotifications};
    use crate::schedule::{SlotRule, WeekdaySet};
    use chrono::Weekday;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(d: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
        d.and_time(time(h, m))
    }

    struct Harness {
        state: AppState,
        alarms: Arc<FakeAlarms>,
        notifications: Arc<FakeNotifications>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let alarms = Arc::new(FakeAlarms::new());
        let notifications = Arc::new(FakeNotifications::new());
        let state = AppState::new(
            dir.path().join("suppletrack.db"),
            alarms.clone(),
            notifications.clone(),
        );
        Harness {
            state,
            alarms,
            notifications,
            _dir: dir,
        }
    }

    fn daily_input(name: &str, slots: &[(u32, u32)]) -> DoseInput {
        DoseInput {
            name: name.into(),
            dosage: Some("3 g".into()),
            note: None,
            icon: "pill".into(),
            color: 0,
            kind: DoseKind::Supplement,
            schedule: slots
                .iter()
                .map(|(h, m)| SlotRule {
                    time: time(*h, *m),
                    weekdays: WeekdaySet::full(),
                    end_date: None,
                })
                .collect(),
            start_date: date(2026, 1, 1),
            is_active: true,
        }
    }

    // ───────────────────────────────────────
    // Profiles & validation
    // ───────────────────────────────────────

    #[test]
    fn first_profile_becomes_active() {
        let h = harness();
        assert!(h.state.active_profile().is_err());

        let profile = h.state.create_profile("Alex").unwrap();
        assert_eq!(h.state.active_profile().unwrap(), profile.id);

        // A second profile does not steal the active slot.
        h.state.create_profile("Sam").unwrap();
        assert_eq!(h.state.active_profile().unwrap(), profile.id);
    }

    #[test]
    fn empty_profile_name_rejected() {
        let h = harness();
        assert!(matches!(
            h.state.create_profile("   "),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn add_dose_requires_active_profile() {
        let h = harness();
        let result = h.state.add_dose(&daily_input("Creatine", &[(8, 0)]));
        assert!(matches!(result, Err(CoreError::NoActiveProfile)));
    }

    #[test]
    fn dose_validation_rejects_bad_input() {
        let h = harness();
        h.state.create_profile("Alex").unwrap();

        let mut input = daily_input("", &[(8, 0)]);
        assert!(matches!(
            h.state.add_dose(&input),
            Err(CoreError::InvalidInput(_))
        ));

        input = daily_input(&"x".repeat(101), &[(8, 0)]);
        assert!(matches!(
            h.state.add_dose(&input),
            Err(CoreError::InvalidInput(_))
        ));

        input = daily_input("Creatine", &[(8, 0)]);
        input.schedule[0].weekdays = WeekdaySet::empty();
        assert!(matches!(
            h.state.add_dose(&input),
            Err(CoreError::InvalidInput(_))
        ));

        input = daily_input("Creatine", &[(8, 0)]);
        input.schedule[0].time = NaiveTime::from_hms_opt(8, 0, 30).unwrap();
        assert!(matches!(
            h.state.add_dose(&input),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn skip_reason_length_capped() {
        let h = harness();
        h.state.create_profile("Alex").unwrap();
        let dose = h.state.add_dose(&daily_input("Creatine", &[(8, 0)])).unwrap();

        let result =
            h.state
                .mark_skipped(dose, date(2026, 3, 2), time(8, 0), Some(&"x".repeat(501)));
        assert!(matches!(result, Err(CoreError::InvalidInput(_))));
    }

    // ───────────────────────────────────────
    // Reminder wiring
    // ───────────────────────────────────────

    #[test]
    fn reschedule_registers_due_slots() {
        let h = harness();
        h.state.create_profile("Alex").unwrap();
        let dose = h.state.add_dose(&daily_input("Creatine", &[(8, 0)])).unwrap();

        h.state.reschedule_at(at(date(2026, 3, 2), 7, 0)).unwrap();
        assert_eq!(h.alarms.ids(), vec![slot_id(dose, time(8, 0))]);
        assert_eq!(h.state.registered_reminders().unwrap(), h.alarms.ids());
    }

    #[test]
    fn delete_dose_cancels_synchronously() {
        let h = harness();
        h.state.create_profile("Alex").unwrap();
        let dose = h.state.add_dose(&daily_input("Creatine", &[(8, 0)])).unwrap();
        h.state.reschedule_at(at(date(2026, 3, 2), 7, 0)).unwrap();
        assert_eq!(h.alarms.ids().len(), 1);

        h.state.delete_dose(dose).unwrap();
        assert!(h.alarms.ids().is_empty());
        assert!(h.state.registered_reminders().unwrap().is_empty());
        assert!(h.state.get_dose(dose).unwrap().is_none());
    }

    #[test]
    fn disabling_notifications_clears_everything() {
        let h = harness();
        h.state.create_profile("Alex").unwrap();
        h.state.add_dose(&daily_input("Creatine", &[(8, 0)])).unwrap();
        h.state.reschedule_at(at(date(2026, 3, 2), 7, 0)).unwrap();
        assert_eq!(h.alarms.ids().len(), 1);

        h.state.set_notifications_enabled(false).unwrap();
        assert!(h.alarms.ids().is_empty());
        assert!(*h.notifications.cancel_all_calls.lock().unwrap() >= 1);
        assert!(!h.state.settings().unwrap().notifications_enabled);

        // Re-enabling restores scheduling on the next pass.
        h.state.set_notifications_enabled(true).unwrap();
        h.state.reschedule_at(at(date(2026, 3, 2), 7, 0)).unwrap();
        assert_eq!(h.alarms.ids().len(), 1);
    }

    #[test]
    fn weekday_dose_not_scheduled_off_day() {
        let h = harness();
        h.state.create_profile("Alex").unwrap();
        let mut input = daily_input("Creatine", &[(8, 0)]);
        input.schedule[0].weekdays =
            WeekdaySet::from_days(&[Weekday::Mon, Weekday::Wed, Weekday::Fri]);
        h.state.add_dose(&input).unwrap();

        // 2026-03-03 is a Tuesday: no slots, no wake-ups.
        h.state.reschedule_at(at(date(2026, 3, 3), 6, 0)).unwrap();
        assert!(h.alarms.ids().is_empty());
    }

    #[test]
    fn switching_profile_reschedules_for_it() {
        let h = harness();
        let alex = h.state.create_profile("Alex").unwrap();
        h.state.add_dose(&daily_input("Creatine", &[(8, 0)])).unwrap();
        let sam = h.state.create_profile("Sam").unwrap();

        h.state.reschedule_at(at(date(2026, 3, 2), 7, 0)).unwrap();
        assert_eq!(h.alarms.ids().len(), 1);

        // Sam has no doses: switching must drop Alex's registrations.
        h.state.set_active_profile(sam.id).unwrap();
        assert!(h.state.registered_reminders().unwrap().is_empty());
        let _ = alex;
    }

    #[test]
    fn deleting_active_profile_cancels_reminders() {
        let h = harness();
        let alex = h.state.create_profile("Alex").unwrap();
        h.state.add_dose(&daily_input("Creatine", &[(8, 0)])).unwrap();
        h.state.reschedule_at(at(date(2026, 3, 2), 7, 0)).unwrap();
        assert_eq!(h.alarms.ids().len(), 1);

        h.state.delete_profile(alex.id).unwrap();
        assert!(h.alarms.ids().is_empty());
        assert!(h.state.active_profile().is_err());
    }

    // ───────────────────────────────────────
    // Change signal
    // ───────────────────────────────────────

    #[test]
    fn mutations_emit_change_events() {
        let h = harness();
        let events = Arc::new(AtomicUsize::new(0));
        let seen = events.clone();
        h.state.subscribe(move |event| {
            if matches!(event, ChangeEvent::DosesChanged) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        h.state.create_profile("Alex").unwrap();
        let dose = h.state.add_dose(&daily_input("Creatine", &[(8, 0)])).unwrap();
        assert_eq!(events.load(Ordering::SeqCst), 1);

        h.state
            .update_dose(dose, &daily_input("Creatine", &[(9, 0)]))
            .unwrap();
        assert_eq!(events.load(Ordering::SeqCst), 2);

        h.state.delete_dose(dose).unwrap();
        assert_eq!(events.load(Ordering::SeqCst), 3);
    }

    // ───────────────────────────────────────
    // End-to-end scenarios
    // ───────────────────────────────────────

    #[test]
    fn creatine_end_to_end() {
        let h = harness();
        h.state.create_profile("Alex").unwrap();
        let dose = h.state.add_dose(&daily_input("Creatine", &[(8, 0)])).unwrap();
        let today = date(2026, 3, 2);
        let id = slot_id(dose, time(8, 0));

        // At 07:00 the 08:00 slot is registered.
        h.state.reschedule_at(at(today, 7, 0)).unwrap();
        assert_eq!(h.alarms.ids(), vec![id]);

        // At 08:00 the wake-up fires with its registered payload.
        let (_, wake_payload) = h.alarms.scheduled.lock().unwrap()[&id].clone();
        let outcome = h.state.alarm_fired(&wake_payload).unwrap();
        assert_eq!(outcome, WakeOutcome::Shown);

        let (shown_id, _, body, action, action_payload) =
            h.notifications.shown.lock().unwrap()[0].clone();
        assert_eq!(shown_id, id);
        assert_eq!(body, "Did you take Creatine at 08:00?");
        assert_eq!(action, "Mark Taken");

        // The user taps "Mark Taken".
        let outcome = h.state.notification_action(&action_payload).unwrap();
        assert_eq!(outcome, ResolutionOutcome::Recorded);
        assert!(h.notifications.cancelled.lock().unwrap().contains(&id));

        let conn = h.state.open_db().unwrap();
        let profile = h.state.active_profile().unwrap();
        let entries = ledger::entries_for_date(&conn, &profile, today).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].dose_id, dose);
        assert_eq!(entries[0].slot_time, time(8, 0));

        // A second tap on the already-cancelled action is a no-op.
        let outcome = h.state.notification_action(&action_payload).unwrap();
        assert_eq!(outcome, ResolutionOutcome::AlreadyRecorded);
        let entries = ledger::entries_for_date(&conn, &profile, today).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn wake_after_manual_mark_is_suppressed() {
        let h = harness();
        h.state.create_profile("Alex").unwrap();
        let dose = h.state.add_dose(&daily_input("Creatine", &[(8, 0)])).unwrap();
        let today = date(2026, 3, 2);
        let id = slot_id(dose, time(8, 0));

        h.state.reschedule_at(at(today, 7, 0)).unwrap();
        let (_, wake_payload) = h.alarms.scheduled.lock().unwrap()[&id].clone();

        // The user marks it taken from the checklist just before the alarm
        // delivers; the stale wake-up must show nothing.
        h.state.mark_taken(dose, today, time(8, 0)).unwrap();
        let outcome = h.state.alarm_fired(&wake_payload).unwrap();
        assert_eq!(outcome, WakeOutcome::AlreadyTaken);
        assert!(h.notifications.shown_ids().is_empty());
    }

    #[test]
    fn malformed_action_payload_is_an_error_not_a_crash() {
        let h = harness();
        h.state.create_profile("Alex").unwrap();
        assert!(matches!(
            h.state.notification_action(b"garbage"),
            Err(CoreError::Payload(_))
        ));
    }

    #[test]
    fn unmark_retoggles_and_mark_is_idempotent_across_callers() {
        let h = harness();
        h.state.create_profile("Alex").unwrap();
        let dose = h.state.add_dose(&daily_input("Creatine", &[(8, 0)])).unwrap();
        let today = date(2026, 3, 2);

        assert!(h.state.mark_taken(dose, today, time(8, 0)).unwrap());
        // Same slot via the notification path: no second entry.
        let payload = ReminderPayload {
            dose_id: dose,
            dose_name: "Creatine".into(),
            date: today,
            time: time(8, 0),
        };
        let outcome = h
            .state
            .notification_action(&payload.to_bytes().unwrap())
            .unwrap();
        assert_eq!(outcome, ResolutionOutcome::AlreadyRecorded);

        assert!(h.state.unmark_taken(dose, today, time(8, 0)).unwrap());
        let conn = h.state.open_db().unwrap();
        let profile = h.state.active_profile().unwrap();
        assert!(ledger::entries_for_date(&conn, &profile, today)
            .unwrap()
            .is_empty());
    }
}

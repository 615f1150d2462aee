//! SuppleTrack core — dose scheduling, adherence ledger and reminder engine
//! for a local-first supplement/medication tracker.
//!
//! This crate is the in-process library behind the app shell: recurrence
//! evaluation ([`schedule`]), the per-slot outcome log ([`ledger`]), the
//! one-reminder-per-due-slot engine ([`reminder`]), and the "Mark Taken"
//! resolution path ([`resolution`]). The platform's alarm and notification
//! services plug in behind the capability traits in [`reminder`]; screens
//! consume the snapshot queries in [`checklist`] and [`calendar`] and
//! refresh through [`events`]. All mutation routes through
//! [`state::AppState`].

pub mod calendar;
pub mod checklist;
pub mod config;
pub mod db;
pub mod events;
pub mod ledger;
pub mod models;
pub mod reminder;
pub mod resolution;
pub mod schedule;
pub mod settings;
pub mod state;
pub mod wakeup; // in-process alarm runner for desktop builds

pub use events::{ChangeEvent, ChangeNotifier};
pub use models::{Dose, DoseInput, DoseKind, Profile};
pub use reminder::{AlarmScheduler, CapabilityError, NotificationPresenter};
pub use state::{AppState, CoreError};

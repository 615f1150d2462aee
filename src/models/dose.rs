use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::enums::DoseKind;
use crate::schedule::SlotRule;

/// A trackable item the user intends to take.
///
/// The id is an integer assigned by the store at creation and never changes;
/// the reminder slot id is derived arithmetically from it. An empty schedule
/// means PRN ("as needed"): the dose never fires a reminder and participates
/// in the ledger only through manual logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dose {
    pub id: i64,
    pub profile_id: Uuid,
    pub name: String,
    pub dosage: Option<String>,
    pub note: Option<String>,
    pub icon: String,
    pub color: i64,
    pub kind: DoseKind,
    pub schedule: Vec<SlotRule>,
    pub start_date: NaiveDate,
    pub is_active: bool,
}

impl Dose {
    /// PRN doses carry no fixed schedule.
    pub fn is_prn(&self) -> bool {
        self.schedule.is_empty()
    }
}

/// Input for creating or editing a dose. Editing replaces the schedule but
/// preserves the id and all past ledger entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoseInput {
    pub name: String,
    pub dosage: Option<String>,
    pub note: Option<String>,
    pub icon: String,
    pub color: i64,
    pub kind: DoseKind,
    pub schedule: Vec<SlotRule>,
    pub start_date: NaiveDate,
    pub is_active: bool,
}

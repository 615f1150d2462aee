//! Repository functions for profiles, doses and user preferences.
//!
//! All functions operate against an open connection and return
//! `DatabaseError`. Adherence entries have their own module (`ledger`).

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::DatabaseError;
use crate::models::{Dose, DoseInput, Profile};

// ═══════════════════════════════════════════
// Profiles
// ═══════════════════════════════════════════

/// Create a profile. Returns the stored row.
pub fn insert_profile(conn: &Connection, name: &str) -> Result<Profile, DatabaseError> {
    let profile = Profile {
        id: Uuid::new_v4(),
        name: name.to_string(),
        created_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO profiles (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![
            profile.id.to_string(),
            profile.name,
            profile.created_at.to_rfc3339()
        ],
    )?;
    Ok(profile)
}

/// All profiles, oldest first.
pub fn fetch_profiles(conn: &Connection) -> Result<Vec<Profile>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT id, name, created_at FROM profiles ORDER BY created_at ASC")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut profiles = Vec::with_capacity(rows.len());
    for (id, name, created_at) in rows {
        profiles.push(Profile {
            id: id.parse().unwrap_or_else(|_| Uuid::nil()),
            name,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        });
    }
    Ok(profiles)
}

/// Fetch one profile by id.
pub fn fetch_profile(conn: &Connection, id: &Uuid) -> Result<Option<Profile>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, name, created_at FROM profiles WHERE id = ?1",
        params![id.to_string()],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        },
    );
    match result {
        Ok((id, name, created_at)) => Ok(Some(Profile {
            id: id.parse().unwrap_or_else(|_| Uuid::nil()),
            name,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DatabaseError::from(e)),
    }
}

/// Delete a profile and its doses. Ledger entries are retained; they are
/// the audit trail behind historical reporting.
pub fn delete_profile(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM doses WHERE profile_id = ?1",
        params![id.to_string()],
    )?;
    let deleted = conn.execute("DELETE FROM profiles WHERE id = ?1", params![id.to_string()])?;
    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Profile".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════
// Doses
// ═══════════════════════════════════════════

struct DoseRow {
    id: i64,
    profile_id: String,
    name: String,
    dosage: Option<String>,
    note: Option<String>,
    icon: String,
    color: i64,
    kind: String,
    schedule: String,
    start_date: String,
    is_active: i32,
}

fn row_to_dose(row: DoseRow) -> Result<Dose, DatabaseError> {
    Ok(Dose {
        id: row.id,
        profile_id: row.profile_id.parse().unwrap_or_else(|_| Uuid::nil()),
        name: row.name,
        dosage: row.dosage,
        note: row.note,
        icon: row.icon,
        color: row.color,
        kind: row.kind.parse()?,
        schedule: serde_json::from_str(&row.schedule)
            .map_err(|e| DatabaseError::InvalidSchedule(e.to_string()))?,
        start_date: NaiveDate::parse_from_str(&row.start_date, "%Y-%m-%d").map_err(|e| {
            DatabaseError::ConstraintViolation(format!("invalid start_date: {e}"))
        })?,
        is_active: row.is_active != 0,
    })
}

const DOSE_COLUMNS: &str = "id, profile_id, name, dosage, note, icon, color, kind,
                            schedule, start_date, is_active";

fn map_dose_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DoseRow> {
    Ok(DoseRow {
        id: row.get(0)?,
        profile_id: row.get(1)?,
        name: row.get(2)?,
        dosage: row.get(3)?,
        note: row.get(4)?,
        icon: row.get(5)?,
        color: row.get(6)?,
        kind: row.get(7)?,
        schedule: row.get(8)?,
        start_date: row.get(9)?,
        is_active: row.get(10)?,
    })
}

/// Insert a dose for a profile. Returns the assigned id.
pub fn insert_dose(
    conn: &Connection,
    profile_id: &Uuid,
    input: &DoseInput,
) -> Result<i64, DatabaseError> {
    let schedule = serde_json::to_string(&input.schedule)
        .map_err(|e| DatabaseError::InvalidSchedule(e.to_string()))?;
    conn.execute(
        "INSERT INTO doses (profile_id, name, dosage, note, icon, color, kind,
                            schedule, start_date, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            profile_id.to_string(),
            input.name,
            input.dosage,
            input.note,
            input.icon,
            input.color,
            input.kind.as_str(),
            schedule,
            input.start_date.to_string(),
            input.is_active as i32,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Replace a dose's mutable fields (including the schedule). The id and all
/// past ledger entries are preserved.
pub fn update_dose(
    conn: &Connection,
    dose_id: i64,
    input: &DoseInput,
) -> Result<(), DatabaseError> {
    let schedule = serde_json::to_string(&input.schedule)
        .map_err(|e| DatabaseError::InvalidSchedule(e.to_string()))?;
    let updated = conn.execute(
        "UPDATE doses SET name = ?1, dosage = ?2, note = ?3, icon = ?4, color = ?5,
                          kind = ?6, schedule = ?7, start_date = ?8, is_active = ?9
         WHERE id = ?10",
        params![
            input.name,
            input.dosage,
            input.note,
            input.icon,
            input.color,
            input.kind.as_str(),
            schedule,
            input.start_date.to_string(),
            input.is_active as i32,
            dose_id,
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Dose".into(),
            id: dose_id.to_string(),
        });
    }
    Ok(())
}

/// Hard-delete a dose. Ledger entries are retained (no cascade).
pub fn delete_dose(conn: &Connection, dose_id: i64) -> Result<(), DatabaseError> {
    let deleted = conn.execute("DELETE FROM doses WHERE id = ?1", params![dose_id])?;
    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Dose".into(),
            id: dose_id.to_string(),
        });
    }
    Ok(())
}

/// Fetch one dose by id.
pub fn fetch_dose(conn: &Connection, dose_id: i64) -> Result<Option<Dose>, DatabaseError> {
    let sql = format!("SELECT {DOSE_COLUMNS} FROM doses WHERE id = ?1");
    let result = conn.query_row(&sql, params![dose_id], map_dose_row);
    match result {
        Ok(row) => Ok(Some(row_to_dose(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DatabaseError::from(e)),
    }
}

/// All doses for a profile, in creation order.
pub fn fetch_doses_for_profile(
    conn: &Connection,
    profile_id: &Uuid,
) -> Result<Vec<Dose>, DatabaseError> {
    let sql = format!("SELECT {DOSE_COLUMNS} FROM doses WHERE profile_id = ?1 ORDER BY id ASC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![profile_id.to_string()], map_dose_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(row_to_dose).collect()
}

// ═══════════════════════════════════════════
// User preferences
// ═══════════════════════════════════════════

/// Read a preference value, `None` when unset.
pub fn get_user_preference(
    conn: &Connection,
    key: &str,
) -> Result<Option<String>, DatabaseError> {
    let result = conn.query_row(
        "SELECT value FROM user_preferences WHERE key = ?1",
        params![key],
        |row| row.get::<_, String>(0),
    );
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DatabaseError::from(e)),
    }
}

/// Write a preference value, replacing any previous one.
pub fn set_user_preference(
    conn: &Connection,
    key: &str,
    value: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO user_preferences (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::DoseKind;
    use crate::schedule::{SlotRule, WeekdaySet};
    use chrono::NaiveTime;

    fn test_db() -> Connection {
        open_memory_database().expect("in-memory DB")
    }

    fn sample_input(name: &str) -> DoseInput {
        DoseInput {
            name: name.into(),
            dosage: Some("3 g".into()),
            note: None,
            icon: "pill".into(),
            color: 0xFF43A047,
            kind: DoseKind::Supplement,
            schedule: vec![SlotRule {
                time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                weekdays: WeekdaySet::full(),
                end_date: None,
            }],
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            is_active: true,
        }
    }

    // ───────────────────────────────────────
    // Profile tests
    // ───────────────────────────────────────

    #[test]
    fn insert_and_list_profiles() {
        let conn = test_db();
        let a = insert_profile(&conn, "Alex").unwrap();
        let b = insert_profile(&conn, "Sam").unwrap();

        let profiles = fetch_profiles(&conn).unwrap();
        assert_eq!(profiles.len(), 2);
        assert!(profiles.iter().any(|p| p.id == a.id && p.name == "Alex"));
        assert!(profiles.iter().any(|p| p.id == b.id && p.name == "Sam"));
    }

    #[test]
    fn fetch_profile_by_id() {
        let conn = test_db();
        let created = insert_profile(&conn, "Alex").unwrap();
        let fetched = fetch_profile(&conn, &created.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Alex");
    }

    #[test]
    fn fetch_missing_profile_is_none() {
        let conn = test_db();
        assert!(fetch_profile(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn delete_profile_removes_its_doses() {
        let conn = test_db();
        let profile = insert_profile(&conn, "Alex").unwrap();
        insert_dose(&conn, &profile.id, &sample_input("Creatine")).unwrap();

        delete_profile(&conn, &profile.id).unwrap();
        assert!(fetch_profile(&conn, &profile.id).unwrap().is_none());
        assert!(fetch_doses_for_profile(&conn, &profile.id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn delete_missing_profile_is_not_found() {
        let conn = test_db();
        assert!(delete_profile(&conn, &Uuid::new_v4()).is_err());
    }

    // ───────────────────────────────────────
    // Dose tests
    // ───────────────────────────────────────

    #[test]
    fn insert_and_fetch_dose_round_trip() {
        let conn = test_db();
        let profile = insert_profile(&conn, "Alex").unwrap();
        let id = insert_dose(&conn, &profile.id, &sample_input("Creatine")).unwrap();

        let dose = fetch_dose(&conn, id).unwrap().unwrap();
        assert_eq!(dose.name, "Creatine");
        assert_eq!(dose.kind, DoseKind::Supplement);
        assert_eq!(dose.profile_id, profile.id);
        assert_eq!(dose.schedule.len(), 1);
        assert!(dose.schedule[0].weekdays.is_daily());
        assert!(dose.is_active);
    }

    #[test]
    fn ids_are_assigned_sequentially() {
        let conn = test_db();
        let profile = insert_profile(&conn, "Alex").unwrap();
        let first = insert_dose(&conn, &profile.id, &sample_input("A")).unwrap();
        let second = insert_dose(&conn, &profile.id, &sample_input("B")).unwrap();
        assert!(second > first);
    }

    #[test]
    fn update_replaces_schedule_and_preserves_id() {
        let conn = test_db();
        let profile = insert_profile(&conn, "Alex").unwrap();
        let id = insert_dose(&conn, &profile.id, &sample_input("Creatine")).unwrap();

        let mut edited = sample_input("Creatine monohydrate");
        edited.schedule = vec![]; // now PRN
        update_dose(&conn, id, &edited).unwrap();

        let dose = fetch_dose(&conn, id).unwrap().unwrap();
        assert_eq!(dose.id, id);
        assert_eq!(dose.name, "Creatine monohydrate");
        assert!(dose.is_prn());
    }

    #[test]
    fn update_missing_dose_is_not_found() {
        let conn = test_db();
        let result = update_dose(&conn, 99, &sample_input("Ghost"));
        match result.unwrap_err() {
            DatabaseError::NotFound { entity_type, .. } => assert_eq!(entity_type, "Dose"),
            other => panic!("Expected NotFound, got {other}"),
        }
    }

    #[test]
    fn delete_dose_removes_row() {
        let conn = test_db();
        let profile = insert_profile(&conn, "Alex").unwrap();
        let id = insert_dose(&conn, &profile.id, &sample_input("Creatine")).unwrap();
        delete_dose(&conn, id).unwrap();
        assert!(fetch_dose(&conn, id).unwrap().is_none());
    }

    #[test]
    fn delete_missing_dose_is_not_found() {
        let conn = test_db();
        assert!(delete_dose(&conn, 42).is_err());
    }

    #[test]
    fn doses_filtered_by_profile() {
        let conn = test_db();
        let alex = insert_profile(&conn, "Alex").unwrap();
        let sam = insert_profile(&conn, "Sam").unwrap();
        insert_dose(&conn, &alex.id, &sample_input("Creatine")).unwrap();
        insert_dose(&conn, &alex.id, &sample_input("Vitamin D")).unwrap();
        insert_dose(&conn, &sam.id, &sample_input("Magnesium")).unwrap();

        let alex_doses = fetch_doses_for_profile(&conn, &alex.id).unwrap();
        assert_eq!(alex_doses.len(), 2);
        let sam_doses = fetch_doses_for_profile(&conn, &sam.id).unwrap();
        assert_eq!(sam_doses.len(), 1);
        assert_eq!(sam_doses[0].name, "Magnesium");
    }

    #[test]
    fn corrupted_schedule_column_is_reported() {
        let conn = test_db();
        let profile = insert_profile(&conn, "Alex").unwrap();
        let id = insert_dose(&conn, &profile.id, &sample_input("Creatine")).unwrap();
        conn.execute(
            "UPDATE doses SET schedule = 'not json' WHERE id = ?1",
            params![id],
        )
        .unwrap();

        match fetch_dose(&conn, id).unwrap_err() {
            DatabaseError::InvalidSchedule(_) => {}
            other => panic!("Expected InvalidSchedule, got {other}"),
        }
    }

    // ───────────────────────────────────────
    // Preference tests
    // ───────────────────────────────────────

    #[test]
    fn preference_unset_is_none() {
        let conn = test_db();
        assert!(get_user_preference(&conn, "language").unwrap().is_none());
    }

    #[test]
    fn preference_set_get_overwrite() {
        let conn = test_db();
        set_user_preference(&conn, "language", "en").unwrap();
        assert_eq!(
            get_user_preference(&conn, "language").unwrap().as_deref(),
            Some("en")
        );
        set_user_preference(&conn, "language", "de").unwrap();
        assert_eq!(
            get_user_preference(&conn, "language").unwrap().as_deref(),
            Some("de")
        );
    }
}

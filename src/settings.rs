//! User settings over the `user_preferences` key/value table.
//!
//! The reminder engine reads `notifications_enabled` at every reschedule
//! pass; the remaining fields belong to the shell (theme, language,
//! accessibility) and are carried here so every surface shares one store.

use rusqlite::Connection;

use crate::db::repository::{get_user_preference, set_user_preference};
use crate::db::DatabaseError;

pub const KEY_NOTIFICATIONS_ENABLED: &str = "notifications_enabled";
pub const KEY_DARK_MODE: &str = "dark_mode";
pub const KEY_LANGUAGE: &str = "language";
pub const KEY_TEXT_SIZE: &str = "text_size";
pub const KEY_COLOR_BLIND_MODE: &str = "color_blind_mode";

/// Snapshot of all settings with their defaults filled in.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Settings {
    pub notifications_enabled: bool,
    pub dark_mode: bool,
    pub language: String,
    pub text_size: f32,
    pub color_blind_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            dark_mode: false,
            language: "en".to_string(),
            text_size: 1.0,
            color_blind_mode: false,
        }
    }
}

fn bool_pref(conn: &Connection, key: &str, default: bool) -> Result<bool, DatabaseError> {
    Ok(get_user_preference(conn, key)?
        .map(|v| v == "true")
        .unwrap_or(default))
}

/// Load the full settings snapshot.
pub fn load_settings(conn: &Connection) -> Result<Settings, DatabaseError> {
    let defaults = Settings::default();
    Ok(Settings {
        notifications_enabled: bool_pref(
            conn,
            KEY_NOTIFICATIONS_ENABLED,
            defaults.notifications_enabled,
        )?,
        dark_mode: bool_pref(conn, KEY_DARK_MODE, defaults.dark_mode)?,
        language: get_user_preference(conn, KEY_LANGUAGE)?.unwrap_or(defaults.language),
        text_size: get_user_preference(conn, KEY_TEXT_SIZE)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.text_size),
        color_blind_mode: bool_pref(conn, KEY_COLOR_BLIND_MODE, defaults.color_blind_mode)?,
    })
}

/// Read just the notifications toggle (the scheduler's per-pass check).
pub fn notifications_enabled(conn: &Connection) -> Result<bool, DatabaseError> {
    bool_pref(conn, KEY_NOTIFICATIONS_ENABLED, true)
}

pub fn set_notifications_enabled(conn: &Connection, enabled: bool) -> Result<(), DatabaseError> {
    set_user_preference(
        conn,
        KEY_NOTIFICATIONS_ENABLED,
        if enabled { "true" } else { "false" },
    )
}

pub fn set_dark_mode(conn: &Connection, enabled: bool) -> Result<(), DatabaseError> {
    set_user_preference(conn, KEY_DARK_MODE, if enabled { "true" } else { "false" })
}

pub fn set_language(conn: &Connection, language: &str) -> Result<(), DatabaseError> {
    set_user_preference(conn, KEY_LANGUAGE, language)
}

pub fn set_text_size(conn: &Connection, size: f32) -> Result<(), DatabaseError> {
    set_user_preference(conn, KEY_TEXT_SIZE, &size.to_string())
}

pub fn set_color_blind_mode(conn: &Connection, enabled: bool) -> Result<(), DatabaseError> {
    set_user_preference(
        conn,
        KEY_COLOR_BLIND_MODE,
        if enabled { "true" } else { "false" },
    )
}

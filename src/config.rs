use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

/// Application-level constants
pub const APP_NAME: &str = "SuppleTrack";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is not set.
pub fn default_log_filter() -> String {
    "suppletrack=info".to_string()
}

/// Get the application data directory
/// ~/SuppleTrack/ on all platforms (user-visible, per design requirement)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("SuppleTrack")
}

/// Get the default database path
pub fn database_path() -> PathBuf {
    app_data_dir().join("suppletrack.db")
}

/// Initialize tracing for the consuming shell. Safe to call once at startup.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_filter())),
        )
        .init();
    tracing::info!("{} starting v{}", APP_NAME, APP_VERSION);
}

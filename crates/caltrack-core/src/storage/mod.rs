pub mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, GoogleConfig, SyncConfig};
pub use database::{
    Category, CategoryPatch, Database, EventFilter, KeyPatch, KeyStats, ManualEvent, NewCategory,
    NewKey, StoredEvent, SummaryStats,
};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the caltrack data directory, creating it if needed.
///
/// `CALTRACK_HOME` names the directory outright. Otherwise it is
/// `~/.config/caltrack[-dev]/`, with `CALTRACK_ENV=dev` selecting the
/// development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("CALTRACK_HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("CALTRACK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("caltrack-dev")
            } else {
                base_dir.join("caltrack")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

mod config;
pub mod database;
pub mod migrations;
pub mod progression;

pub use config::GameConfig;
pub use database::{Database, StoredResult};
pub use progression::{
    MemoryProgressionStore, Progression, ProgressionState, ProgressionStore, ProgressionUpdate,
};

use std::path::PathBuf;

use crate::error::Result;

/// Returns `~/.config/coinsmith[-dev]/` based on COINSMITH_ENV.
///
/// Set COINSMITH_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("COINSMITH_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("coinsmith-dev")
    } else {
        base_dir.join("coinsmith")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

mod config;
pub mod database;
mod traits;

pub use config::{Config, DeviceConfig, RobotConfig, SessionConfig, UiConfig};
pub use database::{Database, StatsSummary};
pub use traits::{AlarmStore, ChallengeStore, Settings, StatsStore};

use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// Returns `~/.config/wakebot[-dev]/` based on WAKEBOT_ENV.
///
/// Set WAKEBOT_ENV=dev to use the development data directory, or
/// WAKEBOT_DATA_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("WAKEBOT_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("WAKEBOT_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("wakebot-dev")
            } else {
                base_dir.join("wakebot")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

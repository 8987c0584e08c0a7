pub mod alarm;
pub mod config;
pub mod device;
pub mod next;
pub mod question;
pub mod ring;
pub mod run;
pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use wakebot_core::{Config, ConfigDirectory, DeviceLink, ValidationError};

/// Parse `HH:MM` (or `H:MM`) into hour and minute.
pub fn parse_time(text: &str) -> Result<(u32, u32), ValidationError> {
    let invalid = || ValidationError::InvalidValue {
        field: "time".into(),
        message: format!("expected HH:MM, got '{text}'"),
    };
    let (hour, minute) = text.trim().split_once(':').ok_or_else(invalid)?;
    let hour = hour.parse::<u32>().map_err(|_| invalid())?;
    let minute = minute.parse::<u32>().map_err(|_| invalid())?;
    wakebot_core::alarm::validate_time(hour, minute)?;
    Ok((hour, minute))
}

/// A link over the peers listed in `[device]`.
pub fn device_link(config: &Config) -> DeviceLink {
    DeviceLink::with_time_sync_interval(
        Arc::new(ConfigDirectory::new(config.device.peers.clone())),
        Duration::from_secs(config.device.time_sync_interval_secs.max(1)),
    )
}

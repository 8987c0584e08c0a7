//! Robot wire protocol.
//!
//! Newline-terminated ASCII lines with `|`-separated fields. There are no
//! length prefixes, checksums or acknowledgements; the robot replies only
//! with application-level lines (`BAT:`, `SNOOZE_PRESSED`, `WIFI_LIST:`,
//! `SONG_LIST:`).

pub mod codec;
mod lines;

#[cfg(test)]
mod codec_tests;

pub use codec::{decode, parse_command, AlertProfile, Command, DeviceEvent, Direction};
pub use lines::LineBuffer;

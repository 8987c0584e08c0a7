//! Dismissal of a firing alarm.
//!
//! [`DismissalSession`] is the per-firing state machine; [`run_session`]
//! drives it from a tick interval, robot events and operator input.
//!
//! ```text
//! AwaitingDeviceAck -> Armed -> Muted -> Resolved
//!        ^                        |
//!        +------ Grace <----------+   (wrong answer or timeout)
//! ```

mod driver;
mod machine;
#[cfg(test)]
mod testing;

pub use driver::{run_session, OperatorInput};
pub use machine::DismissalSession;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::challenge::ChallengeMode;
use crate::protocol::{AlertProfile, Command};
use crate::storage::{ChallengeStore, Config, Settings, StatsStore};

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeReason {
    Solved,
    Exhausted,
    OperatorCancelled,
}

impl OutcomeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeReason::Solved => "solved",
            OutcomeReason::Exhausted => "exhausted",
            OutcomeReason::OperatorCancelled => "operator-cancelled",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "solved" => Some(OutcomeReason::Solved),
            "exhausted" => Some(OutcomeReason::Exhausted),
            "operator-cancelled" => Some(OutcomeReason::OperatorCancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutcomeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one dismissal session, recorded once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DismissalOutcome {
    /// Whole seconds from trigger to resolution.
    pub seconds: i64,
    /// Attempts consumed, counting the first.
    pub attempts: u32,
    pub reason: OutcomeReason,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// About to send a challenge to the robot.
    AwaitingDeviceAck,
    /// Alert ringing; waiting for the robot's pause button.
    Armed,
    /// Alert silenced; the answer is due by `deadline`.
    Muted {
        attempt: u32,
        deadline: DateTime<Utc>,
    },
    /// Short pause after a failed attempt before the next challenge.
    Grace { resume_at: DateTime<Utc> },
    Resolved(DismissalOutcome),
}

/// Outbound command path. [`crate::link::DeviceLink`] is the real one.
pub trait CommandSink: Send {
    fn send(&self, command: Command);
}

/// Local alert feedback (sound, vibration, notification).
pub trait Feedback: Send {
    fn start(&mut self);
    fn stop(&mut self);
}

/// Feedback that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentFeedback;

impl Feedback for SilentFeedback {
    fn start(&mut self) {}
    fn stop(&mut self) {}
}

/// Collaborators a session talks to.
pub struct SessionPorts {
    pub challenges: Box<dyn ChallengeStore + Send>,
    pub stats: Box<dyn StatsStore + Send>,
    pub commands: Box<dyn CommandSink>,
    pub feedback: Box<dyn Feedback>,
}

/// Longest configurable mute window (one hour).
pub const MAX_MUTE_WINDOW_SECS: u64 = 3_600;
/// Longest configurable grace wait (one minute).
pub const MAX_GRACE_MS: u64 = 60_000;

/// Per-session parameters, read from settings when the alarm fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub profile: AlertProfile,
    pub mode: ChallengeMode,
    pub max_attempts: u32,
    pub mute_window: Duration,
    pub grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            profile: AlertProfile {
                speed: config.speed(),
                volume: config.volume(),
                song: config.song(),
            },
            mode: config.challenge_mode(),
            max_attempts: config.session.max_attempts.max(1),
            mute_window: Duration::seconds(
                config.session.mute_window_secs.clamp(1, MAX_MUTE_WINDOW_SECS) as i64,
            ),
            grace: Duration::milliseconds(config.session.grace_ms.min(MAX_GRACE_MS) as i64),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::challenge::ChallengeMode;
use crate::session::DismissalOutcome;

/// Every state change of the scheduler or a dismissal session produces an Event.
/// The CLI prints them; tests assert on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A wake was armed for the next firing instant.
    WakeArmed {
        alarm_id: i64,
        fires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// The previously armed wake was withdrawn and nothing replaced it.
    WakeDisarmed {
        alarm_id: i64,
        at: DateTime<Utc>,
    },
    /// A challenge was sent to the robot and the alert is ringing.
    ChallengeIssued {
        session_id: Uuid,
        attempt: u32,
        mode: ChallengeMode,
        /// Stored question behind a multiple-choice challenge.
        question_id: Option<i64>,
        /// Text shown to the sleeper.
        prompt: String,
        at: DateTime<Utc>,
    },
    /// The robot's pause button silenced the alert; answer before `deadline`.
    DeviceMuted {
        session_id: Uuid,
        attempt: u32,
        deadline: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    AttemptFailed {
        session_id: Uuid,
        attempt: u32,
        /// The submitted answer, or `timeout`.
        submitted: String,
        at: DateTime<Utc>,
    },
    SessionResolved {
        session_id: Uuid,
        outcome: DismissalOutcome,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// When the event was produced.
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::WakeArmed { at, .. }
            | Event::WakeDisarmed { at, .. }
            | Event::ChallengeIssued { at, .. }
            | Event::DeviceMuted { at, .. }
            | Event::AttemptFailed { at, .. }
            | Event::SessionResolved { at, .. } => *at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let at = Utc::now();
        let event = Event::WakeDisarmed { alarm_id: 3, at };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "WakeDisarmed");
        assert_eq!(json["alarm_id"], 3);

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back.at(), at);
    }
}

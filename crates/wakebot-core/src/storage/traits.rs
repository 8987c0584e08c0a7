//! Collaborator interfaces the scheduler and dismissal session depend on.
//!
//! [`Database`](super::Database) implements the record stores and
//! [`Config`](super::Config) implements [`Settings`]; tests substitute their own.

use crate::alarm::AlarmDefinition;
use crate::challenge::{ChallengeMode, Question};
use crate::error::Result;
use crate::session::DismissalOutcome;

/// Keyed store of alarm definitions.
pub trait AlarmStore {
    /// All alarms ordered by hour, then minute.
    fn list_alarms(&self) -> Result<Vec<AlarmDefinition>>;

    fn get_alarm(&self, id: i64) -> Result<Option<AlarmDefinition>>;

    /// Insert and return the new id. The `id` field of `alarm` is ignored.
    fn insert_alarm(&self, alarm: &AlarmDefinition) -> Result<i64>;

    /// Returns false when no alarm has `alarm.id`.
    fn update_alarm(&self, alarm: &AlarmDefinition) -> Result<bool>;

    /// Returns false when no alarm has `id`.
    fn delete_alarm(&self, id: i64) -> Result<bool>;
}

/// Source of multiple-choice questions.
pub trait ChallengeStore {
    fn insert_question(&self, question: &Question) -> Result<i64>;

    /// A uniformly random question, skipping `exclude` when given.
    fn random_question(&self, exclude: Option<i64>) -> Result<Option<Question>>;
}

/// Append-only record of dismissal outcomes.
pub trait StatsStore {
    fn record_outcome(&self, outcome: &DismissalOutcome) -> Result<i64>;

    /// Most recent first.
    fn recent_outcomes(&self, limit: usize) -> Result<Vec<DismissalOutcome>>;
}

/// Typed application settings with defaults.
pub trait Settings {
    fn volume(&self) -> i32;
    fn speed(&self) -> i32;
    fn song(&self) -> String;
    fn challenge_mode(&self) -> ChallengeMode;
    fn dark_mode(&self) -> bool;
    fn device_name(&self) -> String;

    fn set_volume(&mut self, volume: i32);
    fn set_speed(&mut self, speed: i32);
    fn set_song(&mut self, song: &str);
    fn set_challenge_mode(&mut self, mode: ChallengeMode);
    fn set_dark_mode(&mut self, enabled: bool);
    fn set_device_name(&mut self, name: &str);
}

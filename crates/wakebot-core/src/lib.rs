//! # wakebot core library
//!
//! Core logic for an alarm clock paired with a small robot over a serial
//! line. The robot rings and wanders around; the alarm only stops once the
//! sleeper has pressed the robot's pause button and answered a challenge.
//! The `wakebot-cli` binary is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Recurrence**: computes the next firing instant over a set of alarm
//!   definitions ([`next_fire_time`])
//! - **Protocol**: the newline-delimited text protocol spoken with the robot
//! - **Link**: one connection to a paired robot, with an ordered outbound
//!   queue, inbound event fan-out and periodic time sync ([`DeviceLink`])
//! - **Session**: the per-firing dismissal state machine and its async driver
//!   ([`DismissalSession`], [`run_session`])
//! - **Scheduler**: keeps exactly one wake armed for the next alarm
//!   ([`SchedulerDriver`])
//! - **Storage**: SQLite records and TOML configuration

pub mod alarm;
pub mod challenge;
pub mod error;
pub mod events;
pub mod link;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod storage;

pub use alarm::{next_fire_time, AlarmDefinition, DaySet, Recurrence};
pub use challenge::{Challenge, ChallengeMode, ComputedChallenge, Question};
pub use error::{ConfigError, CoreError, DatabaseError, Result, ValidationError};
pub use events::Event;
pub use link::{ConfigDirectory, DeviceLink, LinkState, PeerDirectory, Telemetry};
pub use protocol::{AlertProfile, Command, DeviceEvent, Direction};
pub use scheduler::{projection, run_scheduler, Projection, SchedulerDriver, TokioWakeArming, WakeArming};
pub use session::{
    run_session, DismissalOutcome, DismissalSession, OperatorInput, OutcomeReason, SessionPorts,
    SessionSettings,
};
pub use storage::{AlarmStore, ChallengeStore, Config, Database, Settings, StatsStore};

//! The dismissal state machine.
//!
//! Wall-clock driven and single-owner: every stimulus is a `&mut self` method
//! taking the current instant and returning the [`Event`] it produced, if any.
//! The caller (normally [`super::run_session`]) is responsible for calling
//! `tick()` often enough to expire the mute countdown and the grace wait.

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_pcg::Mcg128Xsl64;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{DismissalOutcome, OutcomeReason, SessionPorts, SessionSettings, SessionState};
use crate::challenge::{Challenge, ChallengeMode, ComputedChallenge, Question};
use crate::events::Event;
use crate::protocol::{Command, DeviceEvent};

/// Stop token sent when the attempts run out on a wrong answer.
const STOP_FAIL: &str = "fail";
/// Stop token sent when the attempts run out on a timeout.
const STOP_LIMIT: &str = "limit";
const STOP_CANCEL: &str = "cancel";
const TIMEOUT_VALUE: &str = "timeout";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    WrongAnswer,
    Timeout,
}

pub struct DismissalSession {
    id: Uuid,
    settings: SessionSettings,
    ports: SessionPorts,
    rng: Mcg128Xsl64,
    state: SessionState,
    attempt: u32,
    challenge: Option<Challenge>,
    last_question_id: Option<i64>,
    started_at: Option<DateTime<Utc>>,
}

impl DismissalSession {
    pub fn new(settings: SessionSettings, ports: SessionPorts) -> Self {
        Self::with_rng(settings, ports, Mcg128Xsl64::from_entropy())
    }

    /// Deterministic challenge generation, for tests.
    pub fn with_seed(settings: SessionSettings, ports: SessionPorts, seed: u64) -> Self {
        Self::with_rng(settings, ports, Mcg128Xsl64::seed_from_u64(seed))
    }

    fn with_rng(settings: SessionSettings, ports: SessionPorts, rng: Mcg128Xsl64) -> Self {
        Self {
            id: Uuid::new_v4(),
            settings,
            ports,
            rng,
            state: SessionState::AwaitingDeviceAck,
            attempt: 1,
            challenge: None,
            last_question_id: None,
            started_at: None,
        }
    }

    /// Question issued by the previous session, so the first challenge differs from it.
    pub fn with_last_question(mut self, id: Option<i64>) -> Self {
        self.last_question_id = id;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Current attempt, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn challenge(&self) -> Option<&Challenge> {
        self.challenge.as_ref()
    }

    pub fn last_question_id(&self) -> Option<i64> {
        self.last_question_id
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, SessionState::Resolved(_))
    }

    pub fn outcome(&self) -> Option<&DismissalOutcome> {
        match &self.state {
            SessionState::Resolved(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Next instant at which `tick` will change something.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        match self.state {
            SessionState::Muted { deadline, .. } => Some(deadline),
            SessionState::Grace { resume_at } => Some(resume_at),
            _ => None,
        }
    }

    /// The alarm fired: issue the first challenge.
    pub fn start(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if self.started_at.is_some() || self.is_resolved() {
            return None;
        }
        self.started_at = Some(now);
        info!(session = %self.id, "dismissal session started");
        self.issue_challenge(now)
    }

    /// The robot's pause button (or a simulated press).
    pub fn pause_pressed(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if self.state != SessionState::Armed {
            debug!(session = %self.id, "pause press ignored outside Armed");
            return None;
        }
        let deadline = now + self.settings.mute_window;
        self.state = SessionState::Muted {
            attempt: self.attempt,
            deadline,
        };
        self.ports.feedback.stop();
        Some(Event::DeviceMuted {
            session_id: self.id,
            attempt: self.attempt,
            deadline,
            at: now,
        })
    }

    /// An answer from the operator. Only considered while muted.
    pub fn submit(&mut self, answer: &str, now: DateTime<Utc>) -> Option<Event> {
        if !matches!(self.state, SessionState::Muted { .. }) {
            debug!(session = %self.id, "answer ignored outside Muted");
            return None;
        }
        let answer = answer.trim();
        let correct = self
            .challenge
            .as_ref()
            .is_some_and(|challenge| challenge.accepts(answer));
        if correct {
            self.ports.commands.send(Command::StopAlarm {
                token: answer.to_string(),
            });
            return self.resolve(OutcomeReason::Solved, now);
        }
        self.fail_attempt(answer, Failure::WrongAnswer, now)
    }

    /// Expire the mute countdown or finish the grace wait when due.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<Event> {
        match self.state {
            SessionState::Muted { deadline, .. } if now >= deadline => {
                self.fail_attempt(TIMEOUT_VALUE, Failure::Timeout, now)
            }
            SessionState::Grace { resume_at } if now >= resume_at => {
                self.state = SessionState::AwaitingDeviceAck;
                self.issue_challenge(now)
            }
            _ => None,
        }
    }

    /// Stop the alarm without solving it.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if self.is_resolved() {
            return None;
        }
        self.ports.commands.send(Command::StopAlarm {
            token: STOP_CANCEL.to_string(),
        });
        self.resolve(OutcomeReason::OperatorCancelled, now)
    }

    pub fn handle_device_event(&mut self, event: &DeviceEvent, now: DateTime<Utc>) -> Option<Event> {
        match event {
            DeviceEvent::DevicePausePressed => self.pause_pressed(now),
            _ => None,
        }
    }

    fn issue_challenge(&mut self, now: DateTime<Utc>) -> Option<Event> {
        let challenge = self.next_challenge();
        let profile = self.settings.profile.clone();
        let command = match &challenge {
            Challenge::MultipleChoice(q) => Command::StartMultipleChoice {
                profile,
                prompt: q.prompt.clone(),
                options: q.options.clone(),
                correct: q.correct.as_str().to_string(),
            },
            Challenge::Computed(c) => Command::StartComputed {
                profile,
                expression: c.expression(),
                result: c.result(),
            },
        };
        self.ports.commands.send(command);
        self.ports.feedback.start();

        let question_id = challenge.question_id();
        if question_id.is_some() {
            self.last_question_id = question_id;
        }
        let mode = challenge.mode();
        let prompt = challenge.prompt();
        self.challenge = Some(challenge);
        self.state = SessionState::Armed;
        info!(session = %self.id, attempt = self.attempt, ?mode, "challenge issued");
        Some(Event::ChallengeIssued {
            session_id: self.id,
            attempt: self.attempt,
            mode,
            question_id,
            prompt,
            at: now,
        })
    }

    fn next_challenge(&mut self) -> Challenge {
        if self.settings.mode == ChallengeMode::MultipleChoice {
            if let Some(question) = self.fetch_question() {
                return Challenge::MultipleChoice(question);
            }
            info!(session = %self.id, "no stored question, issuing a computed challenge");
        }
        Challenge::Computed(ComputedChallenge::generate(&mut self.rng))
    }

    /// Random stored question, avoiding the previous one unless it is the only one.
    fn fetch_question(&mut self) -> Option<Question> {
        let fetched = match self.ports.challenges.random_question(self.last_question_id) {
            Ok(None) if self.last_question_id.is_some() => self.ports.challenges.random_question(None),
            other => other,
        };
        match fetched {
            Ok(question) => question,
            Err(e) => {
                warn!(session = %self.id, error = %e, "question store unavailable");
                None
            }
        }
    }

    fn fail_attempt(&mut self, submitted: &str, failure: Failure, now: DateTime<Utc>) -> Option<Event> {
        if self.attempt < self.settings.max_attempts {
            let failed = self.attempt;
            self.attempt += 1;
            self.ports.commands.send(Command::WrongAnswer {
                value: submitted.to_string(),
            });
            self.state = SessionState::Grace {
                resume_at: now + self.settings.grace,
            };
            info!(session = %self.id, attempt = failed, ?failure, "attempt failed");
            return Some(Event::AttemptFailed {
                session_id: self.id,
                attempt: failed,
                submitted: submitted.to_string(),
                at: now,
            });
        }

        let token = match failure {
            Failure::WrongAnswer => STOP_FAIL,
            Failure::Timeout => STOP_LIMIT,
        };
        self.ports.commands.send(Command::StopAlarm {
            token: token.to_string(),
        });
        self.resolve(OutcomeReason::Exhausted, now)
    }

    fn resolve(&mut self, reason: OutcomeReason, now: DateTime<Utc>) -> Option<Event> {
        let started = self.started_at.unwrap_or(now);
        let outcome = DismissalOutcome {
            seconds: (now - started).num_seconds().max(0),
            attempts: self.attempt,
            reason,
            recorded_at: now,
        };
        self.ports.feedback.stop();
        if let Err(e) = self.ports.stats.record_outcome(&outcome) {
            warn!(session = %self.id, error = %e, "failed to record dismissal outcome");
        }
        self.state = SessionState::Resolved(outcome.clone());
        info!(session = %self.id, %reason, attempts = outcome.attempts, "session resolved");
        Some(Event::SessionResolved {
            session_id: self.id,
            outcome,
            at: now,
        })
    }
}

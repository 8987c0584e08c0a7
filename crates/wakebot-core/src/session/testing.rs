//! Recording collaborators for session tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{CommandSink, DismissalOutcome, Feedback, SessionPorts};
use crate::challenge::Question;
use crate::error::{CoreError, Result};
use crate::protocol::Command;
use crate::storage::{ChallengeStore, StatsStore};

/// Shared view of everything a session sent or recorded.
#[derive(Clone, Default)]
pub(crate) struct Doubles {
    commands: Arc<Mutex<Vec<Command>>>,
    outcomes: Arc<Mutex<Vec<DismissalOutcome>>>,
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl Doubles {
    pub(crate) fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    pub(crate) fn outcomes(&self) -> Vec<DismissalOutcome> {
        self.outcomes.lock().unwrap().clone()
    }

    pub(crate) fn feedback_starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn feedback_stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

struct FixedQuestions(Vec<Question>);

impl ChallengeStore for FixedQuestions {
    fn insert_question(&self, _question: &Question) -> Result<i64> {
        Err(CoreError::Custom("read-only question store".into()))
    }

    fn random_question(&self, exclude: Option<i64>) -> Result<Option<Question>> {
        Ok(self.0.iter().find(|q| Some(q.id) != exclude).cloned())
    }
}

struct RecordingStats(Arc<Mutex<Vec<DismissalOutcome>>>);

impl StatsStore for RecordingStats {
    fn record_outcome(&self, outcome: &DismissalOutcome) -> Result<i64> {
        let mut outcomes = self.0.lock().unwrap();
        outcomes.push(outcome.clone());
        Ok(outcomes.len() as i64)
    }

    fn recent_outcomes(&self, limit: usize) -> Result<Vec<DismissalOutcome>> {
        Ok(self.0.lock().unwrap().iter().rev().take(limit).cloned().collect())
    }
}

struct RecordingSink(Arc<Mutex<Vec<Command>>>);

impl CommandSink for RecordingSink {
    fn send(&self, command: Command) {
        self.0.lock().unwrap().push(command);
    }
}

struct CountingFeedback {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl Feedback for CountingFeedback {
    fn start(&mut self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) fn ports(questions: Vec<Question>) -> (SessionPorts, Doubles) {
    let doubles = Doubles::default();
    let ports = SessionPorts {
        challenges: Box::new(FixedQuestions(questions)),
        stats: Box::new(RecordingStats(doubles.outcomes.clone())),
        commands: Box::new(RecordingSink(doubles.commands.clone())),
        feedback: Box::new(CountingFeedback {
            starts: doubles.starts.clone(),
            stops: doubles.stops.clone(),
        }),
    };
    (ports, doubles)
}

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::{DismissalOutcome, DismissalSession};
use crate::events::Event;
use crate::protocol::DeviceEvent;

/// Input from whoever is trying to dismiss the alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorInput {
    Answer(String),
    /// Stand-in for the robot's pause button.
    SimulatePause,
    Cancel,
}

/// Wall clock anchored to the tokio clock, so paused-time tests see time move.
struct SessionClock {
    origin: Instant,
    origin_utc: DateTime<Utc>,
}

impl SessionClock {
    fn start() -> Self {
        Self {
            origin: Instant::now(),
            origin_utc: Utc::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.origin_utc + elapsed
    }
}

/// Run a session to completion and return its outcome.
///
/// Stimuli are applied one at a time. When both the device event stream and
/// the operator channel have closed, nothing can dismiss the alarm any more
/// and the session is cancelled.
pub async fn run_session<F>(
    mut session: DismissalSession,
    mut device_events: broadcast::Receiver<DeviceEvent>,
    operator: &mut mpsc::Receiver<OperatorInput>,
    tick: Duration,
    mut on_event: F,
) -> DismissalOutcome
where
    F: FnMut(&Event),
{
    let clock = SessionClock::start();
    if let Some(event) = session.start(clock.now()) {
        on_event(&event);
    }

    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut device_open = true;
    let mut operator_open = true;

    loop {
        if let Some(outcome) = session.outcome() {
            return outcome.clone();
        }
        if !device_open && !operator_open {
            info!(session = %session.id(), "no input sources left, cancelling");
            if let Some(event) = session.cancel(clock.now()) {
                on_event(&event);
            }
            continue;
        }

        let event = tokio::select! {
            _ = ticker.tick() => session.tick(clock.now()),
            received = device_events.recv(), if device_open => match received {
                Ok(device_event) => session.handle_device_event(&device_event, clock.now()),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session fell behind device events");
                    None
                }
                Err(RecvError::Closed) => {
                    device_open = false;
                    None
                }
            },
            input = operator.recv(), if operator_open => match input {
                Some(OperatorInput::Answer(answer)) => session.submit(&answer, clock.now()),
                Some(OperatorInput::SimulatePause) => session.pause_pressed(clock.now()),
                Some(OperatorInput::Cancel) => session.cancel(clock.now()),
                None => {
                    operator_open = false;
                    None
                }
            },
        };
        if let Some(event) = event {
            on_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::ChallengeMode;
    use crate::protocol::Command;
    use crate::session::testing::ports;
    use crate::session::{OutcomeReason, SessionSettings};

    const TICK: Duration = Duration::from_millis(250);

    fn computed_session(max_attempts: u32) -> (DismissalSession, crate::session::testing::Doubles) {
        let (ports, doubles) = ports(Vec::new());
        let settings = SessionSettings {
            mode: ChallengeMode::Computed,
            max_attempts,
            ..SessionSettings::default()
        };
        (DismissalSession::with_seed(settings, ports, 11), doubles)
    }

    fn expected_answer(doubles: &crate::session::testing::Doubles) -> String {
        doubles
            .commands()
            .iter()
            .rev()
            .find_map(|command| match command {
                Command::StartComputed { result, .. } => Some(result.to_string()),
                _ => None,
            })
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn device_pause_then_correct_answer_solves() {
        let (session, doubles) = computed_session(10);
        let (device_tx, device_rx) = broadcast::channel(8);
        let (operator_tx, mut operator_rx) = mpsc::channel(8);

        let driver = tokio::spawn(async move {
            let mut events = Vec::new();
            let outcome = run_session(session, device_rx, &mut operator_rx, TICK, |e| {
                events.push(e.clone())
            })
            .await;
            (outcome, events)
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        device_tx.send(DeviceEvent::DevicePausePressed).unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        operator_tx
            .send(OperatorInput::Answer(expected_answer(&doubles)))
            .await
            .unwrap();

        let (outcome, events) = driver.await.unwrap();
        assert_eq!(outcome.reason, OutcomeReason::Solved);
        assert_eq!(outcome.attempts, 1);
        assert!((6..=8).contains(&outcome.seconds), "{}", outcome.seconds);
        assert!(matches!(events.first(), Some(Event::ChallengeIssued { .. })));
        assert!(matches!(events.last(), Some(Event::SessionResolved { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_mutes_time_out_until_exhausted() {
        let (session, doubles) = computed_session(2);
        let (_device_tx, device_rx) = broadcast::channel(8);
        let (operator_tx, mut operator_rx) = mpsc::channel(8);

        let driver = tokio::spawn(async move {
            run_session(session, device_rx, &mut operator_rx, TICK, |_| {}).await
        });

        operator_tx.send(OperatorInput::SimulatePause).await.unwrap();
        // Mute window plus grace, then the challenge is back.
        tokio::time::sleep(Duration::from_secs(23)).await;
        operator_tx.send(OperatorInput::SimulatePause).await.unwrap();

        let outcome = driver.await.unwrap();
        assert_eq!(outcome.reason, OutcomeReason::Exhausted);
        assert_eq!(outcome.attempts, 2);

        let commands = doubles.commands();
        assert!(commands.contains(&Command::WrongAnswer { value: "timeout".into() }));
        assert_eq!(commands.last(), Some(&Command::StopAlarm { token: "limit".into() }));
        let issued = commands
            .iter()
            .filter(|c| matches!(c, Command::StartComputed { .. }))
            .count();
        assert_eq!(issued, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn operator_cancel_resolves_immediately() {
        let (session, doubles) = computed_session(10);
        let (_device_tx, device_rx) = broadcast::channel(8);
        let (operator_tx, mut operator_rx) = mpsc::channel(8);
        operator_tx.send(OperatorInput::Cancel).await.unwrap();

        let outcome = run_session(session, device_rx, &mut operator_rx, TICK, |_| {}).await;
        assert_eq!(outcome.reason, OutcomeReason::OperatorCancelled);
        assert_eq!(doubles.commands().last(), Some(&Command::StopAlarm { token: "cancel".into() }));
        assert!(doubles.feedback_stops() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_inputs_cancel_the_session() {
        let (session, doubles) = computed_session(10);
        let (device_tx, device_rx) = broadcast::channel::<DeviceEvent>(8);
        let (operator_tx, mut operator_rx) = mpsc::channel(8);
        drop(device_tx);
        drop(operator_tx);

        let outcome = run_session(session, device_rx, &mut operator_rx, TICK, |_| {}).await;
        assert_eq!(outcome.reason, OutcomeReason::OperatorCancelled);
        assert_eq!(doubles.outcomes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn answers_before_muting_are_ignored() {
        let (session, doubles) = computed_session(10);
        let (_device_tx, device_rx) = broadcast::channel(8);
        let (operator_tx, mut operator_rx) = mpsc::channel(8);

        let driver = tokio::spawn(async move {
            run_session(session, device_rx, &mut operator_rx, TICK, |_| {}).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let answer = expected_answer(&doubles);
        operator_tx.send(OperatorInput::Answer(answer.clone())).await.unwrap();
        operator_tx.send(OperatorInput::SimulatePause).await.unwrap();
        operator_tx.send(OperatorInput::Answer(answer)).await.unwrap();

        let outcome = driver.await.unwrap();
        assert_eq!(outcome.reason, OutcomeReason::Solved);
        assert_eq!(
            doubles
                .commands()
                .iter()
                .filter(|c| matches!(c, Command::StopAlarm { .. }))
                .count(),
            1
        );
    }
}

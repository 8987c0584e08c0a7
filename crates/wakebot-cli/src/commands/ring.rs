use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use wakebot_core::link::sim::MemoryDirectory;
use wakebot_core::session::Feedback;
use wakebot_core::storage::Database;
use wakebot_core::{
    run_session, Config, DeviceLink, DismissalOutcome, DismissalSession, Event, OperatorInput,
    SessionPorts, SessionSettings, Settings,
};

use super::device_link;

/// kv key remembering the last question asked, so the next alarm avoids it.
pub(crate) const LAST_QUESTION_KEY: &str = "last_question_id";

const SIMULATED_PEER: &str = "simulated";

/// Rings the terminal bell while the alert is on.
pub(crate) struct BellFeedback;

impl Feedback for BellFeedback {
    fn start(&mut self) {
        print!("\x07");
        let _ = std::io::stdout().flush();
    }

    fn stop(&mut self) {}
}

/// One typed line: `pause` stands in for the robot's button, `cancel` gives
/// up, anything else is an answer. `|` separates fields on the wire, so it
/// never reaches the robot.
fn parse_operator_line(line: &str) -> Option<OperatorInput> {
    match line.trim() {
        "" => None,
        "pause" => Some(OperatorInput::SimulatePause),
        "cancel" => Some(OperatorInput::Cancel),
        answer => {
            let answer: String = answer.chars().filter(|c| *c != '|').collect();
            let answer = answer.trim();
            (!answer.is_empty()).then(|| OperatorInput::Answer(answer.to_string()))
        }
    }
}

/// Operator input read line by line from stdin.
pub(crate) fn operator_input() -> mpsc::Receiver<OperatorInput> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Some(input) = parse_operator_line(&line) else {
                continue;
            };
            if tx.send(input).await.is_err() {
                break;
            }
        }
    });
    rx
}

pub(crate) fn print_event(event: &Event) {
    match event {
        Event::ChallengeIssued {
            attempt, prompt, ..
        } => {
            println!();
            println!("Attempt {attempt}: press the robot's button (or type 'pause'), then answer.");
            println!("{prompt}");
        }
        Event::DeviceMuted { deadline, at, .. } => {
            println!("Muted. Answer within {} seconds.", (*deadline - *at).num_seconds());
        }
        Event::AttemptFailed { submitted, .. } => println!("Wrong ({submitted})."),
        Event::SessionResolved { outcome, .. } => println!(
            "Alarm over: {} after {} attempt(s) in {}s",
            outcome.reason, outcome.attempts, outcome.seconds
        ),
        Event::WakeArmed { .. } | Event::WakeDisarmed { .. } => {}
    }
}

/// Session collaborators backed by the on-disk database.
pub(crate) fn database_ports(link: &DeviceLink) -> Result<SessionPorts, Box<dyn std::error::Error>> {
    let questions = Database::open()?;
    questions.seed_questions()?;
    Ok(SessionPorts {
        challenges: Box::new(questions),
        stats: Box::new(Database::open()?),
        commands: Box::new(link.clone()),
        feedback: Box::new(BellFeedback),
    })
}

/// Run one dismissal session. Returns the outcome and the last question asked.
pub(crate) async fn dismiss(
    link: &DeviceLink,
    ports: SessionPorts,
    settings: SessionSettings,
    last_question: Option<i64>,
    operator: &mut mpsc::Receiver<OperatorInput>,
    tick: Duration,
) -> (DismissalOutcome, Option<i64>) {
    // Lines typed before the alarm rang are not answers.
    while operator.try_recv().is_ok() {}

    let session = DismissalSession::new(settings, ports).with_last_question(last_question);
    let mut last = last_question;
    let outcome = run_session(session, link.subscribe(), operator, tick, |event| {
        if let Event::ChallengeIssued {
            question_id: Some(id),
            ..
        } = event
        {
            last = Some(*id);
        }
        print_event(event);
    })
    .await;
    (outcome, last)
}

pub(crate) fn tick_interval(config: &Config) -> Duration {
    Duration::from_millis(config.session.tick_ms.max(10))
}

async fn ring_simulated(
    settings: SessionSettings,
    operator: &mut mpsc::Receiver<OperatorInput>,
    tick: Duration,
) -> Result<DismissalOutcome, Box<dyn std::error::Error>> {
    let directory = MemoryDirectory::new();
    let robot = directory.add_peer(SIMULATED_PEER);
    let robot_task = tokio::spawn(robot.run_auto_pause(vec!["wake.wav".to_string()]));
    let link = DeviceLink::new(Arc::new(directory));
    link.connect(SIMULATED_PEER).await;

    let questions = Database::open_memory()?;
    questions.seed_questions()?;
    let ports = SessionPorts {
        challenges: Box::new(questions),
        stats: Box::new(Database::open_memory()?),
        commands: Box::new(link.clone()),
        feedback: Box::new(BellFeedback),
    };
    let (outcome, _) = dismiss(&link, ports, settings, None, operator, tick).await;

    link.disconnect().await;
    let _ = robot_task.await;
    Ok(outcome)
}

async fn ring_device(
    config: &Config,
    peer: String,
    operator: &mut mpsc::Receiver<OperatorInput>,
) -> Result<DismissalOutcome, Box<dyn std::error::Error>> {
    let link = device_link(config);
    if !link.connect(&peer).await {
        println!("not connected (type 'pause' in place of the robot's button)");
    }

    let db = Database::open()?;
    let last = db.kv_get(LAST_QUESTION_KEY)?.and_then(|v| v.parse().ok());
    let ports = database_ports(&link)?;
    let settings = SessionSettings::from_config(config);
    let (outcome, last) = dismiss(&link, ports, settings, last, operator, tick_interval(config)).await;
    if let Some(id) = last {
        db.kv_set(LAST_QUESTION_KEY, &id.to_string())?;
    }

    link.disconnect().await;
    Ok(outcome)
}

/// Start a dismissal session right away.
pub fn run(simulate: bool, peer: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let peer = peer.unwrap_or_else(|| config.device_name());

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let mut operator = operator_input();
        if simulate {
            let settings = SessionSettings::from_config(&config);
            ring_simulated(settings, &mut operator, tick_interval(&config)).await
        } else {
            ring_device(&config, peer, &mut operator).await
        }
    });
    // The stdin reader may still be blocked on a read.
    rt.shutdown_background();

    let outcome = result?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};
use wakebot_core::storage::Database;
use wakebot_core::{
    run_scheduler, AlarmDefinition, AlarmStore, Config, DeviceLink, Event, Projection,
    SchedulerDriver, SessionSettings, Settings, TokioWakeArming,
};

use super::device_link;
use super::ring::{database_ports, dismiss, operator_input, tick_interval, LAST_QUESTION_KEY};

/// How often the alarm table is re-read for edits made from another shell.
const ALARM_RELOAD_INTERVAL: Duration = Duration::from_secs(5);

fn announce(projection: &Projection, event: Option<&Event>) {
    match (event, projection) {
        (Some(Event::WakeArmed { .. }), Projection::Scheduled(next)) => println!(
            "Next alarm: {} {} (in {})",
            next.weekday, next.time, next.countdown
        ),
        (Some(Event::WakeDisarmed { .. }), _) => println!("No active alarms"),
        _ => {}
    }
}

/// Publish `alarms` only when they differ from the current snapshot.
fn publish(definitions: &watch::Sender<Vec<AlarmDefinition>>, alarms: Vec<AlarmDefinition>) {
    definitions.send_if_modified(|current| {
        if *current == alarms {
            false
        } else {
            *current = alarms;
            true
        }
    });
}

async fn ensure_connected(link: &DeviceLink, peer: &str) {
    if link.is_connected() {
        return;
    }
    if link.connect(peer).await {
        info!(peer, "robot connected");
    } else {
        warn!(peer, "robot not reachable");
        println!("not connected");
    }
}

async fn serve(config: Config, peer: String) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    db.seed_questions()?;

    let link = device_link(&config);
    ensure_connected(&link, &peer).await;

    let (definitions, definitions_rx) = watch::channel(db.list_alarms()?);
    let (arming, mut fired) = TokioWakeArming::new();
    let scheduler = tokio::spawn(run_scheduler(
        SchedulerDriver::new(arming),
        definitions_rx,
        Duration::from_secs(1),
        announce,
    ));

    let mut operator = operator_input();
    let mut reload = tokio::time::interval(ALARM_RELOAD_INTERVAL);
    println!("Waiting for alarms (Ctrl-C to stop)");

    loop {
        tokio::select! {
            Some(alarm_id) = fired.recv() => {
                info!(alarm_id, "alarm fired");
                ensure_connected(&link, &peer).await;

                // Settings may have changed since startup.
                let config = Config::load_or_default();
                let last = db.kv_get(LAST_QUESTION_KEY)?.and_then(|v| v.parse().ok());
                let (outcome, last) = dismiss(
                    &link,
                    database_ports(&link)?,
                    SessionSettings::from_config(&config),
                    last,
                    &mut operator,
                    tick_interval(&config),
                )
                .await;
                if let Some(id) = last {
                    db.kv_set(LAST_QUESTION_KEY, &id.to_string())?;
                }
                info!(alarm_id, reason = %outcome.reason, attempts = outcome.attempts, "alarm dismissed");
                publish(&definitions, db.list_alarms()?);
            }
            _ = reload.tick() => {
                match db.list_alarms() {
                    Ok(alarms) => publish(&definitions, alarms),
                    Err(e) => warn!(error = %e, "could not reload alarms"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    drop(definitions);
    let _ = scheduler.await;
    link.disconnect().await;
    Ok(())
}

/// Run the alarm clock until interrupted.
pub fn run(peer: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let peer = peer.unwrap_or_else(|| config.device_name());

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(serve(config, peer));
    // The stdin reader may still be blocked on a read.
    rt.shutdown_background();
    result
}

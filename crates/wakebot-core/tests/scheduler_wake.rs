//! Scheduler runner wired to the in-process wake facility and a SQLite alarm table.

use std::time::Duration;

use chrono::{Local, Timelike};
use tokio::sync::watch;
use wakebot_core::storage::Database;
use wakebot_core::{
    run_scheduler, AlarmDefinition, AlarmStore, Projection, Recurrence, SchedulerDriver,
    TokioWakeArming,
};

fn alarm_in_two_minutes() -> AlarmDefinition {
    let soon = Local::now() + chrono::Duration::minutes(2);
    AlarmDefinition::new(soon.hour(), soon.minute(), Recurrence::OneShot).unwrap()
}

#[tokio::test(start_paused = true)]
async fn stored_alarm_fires_through_the_runner() {
    let db = Database::open_memory().unwrap();
    let id = db.insert_alarm(&alarm_in_two_minutes()).unwrap();

    let (arming, mut fired) = TokioWakeArming::new();
    let (definitions, definitions_rx) = watch::channel(db.list_alarms().unwrap());
    let runner = tokio::spawn(run_scheduler(
        SchedulerDriver::new(arming),
        definitions_rx,
        Duration::from_secs(1),
        |_, _| {},
    ));

    let woke = tokio::time::timeout(Duration::from_secs(600), fired.recv())
        .await
        .expect("wake should fire within ten minutes");
    assert_eq!(woke, Some(id));

    drop(definitions);
    let driver = runner.await.unwrap();
    assert_eq!(driver.armed().map(|(armed_id, _)| armed_id), Some(id));
}

#[tokio::test(start_paused = true)]
async fn deleting_the_alarm_disarms_its_wake() {
    let db = Database::open_memory().unwrap();
    let id = db.insert_alarm(&alarm_in_two_minutes()).unwrap();

    let (arming, mut fired) = TokioWakeArming::new();
    let (definitions, definitions_rx) = watch::channel(db.list_alarms().unwrap());
    let (projections_tx, mut projections) = tokio::sync::mpsc::unbounded_channel();
    let runner = tokio::spawn(run_scheduler(
        SchedulerDriver::new(arming),
        definitions_rx,
        Duration::from_secs(1),
        move |projection, _| {
            let _ = projections_tx.send(projection.clone());
        },
    ));

    assert!(matches!(
        projections.recv().await,
        Some(Projection::Scheduled(ref next)) if next.alarm_id == id
    ));
    assert!(db.delete_alarm(id).unwrap());
    definitions.send(db.list_alarms().unwrap()).unwrap();

    assert!(tokio::time::timeout(Duration::from_secs(600), fired.recv())
        .await
        .is_err());
    drop(definitions);
    let driver = runner.await.unwrap();
    assert!(driver.armed().is_none());
    assert!(driver.arming().armed_at(id).is_none());
}

#[tokio::test(start_paused = true)]
async fn wall_clock_jump_past_the_alarm_still_fires_it() {
    let alarm = alarm_in_two_minutes().with_id(1);
    let defs = vec![alarm];
    let (arming, mut fired) = TokioWakeArming::new();
    let mut driver = SchedulerDriver::new(arming);

    let now = Local::now();
    driver.refresh(&defs, &now);
    let (_, due) = driver.armed().unwrap();

    // The wall clock is already past the instant while the sleep is pending.
    driver.refresh(&defs, &(now + chrono::Duration::minutes(3)));
    assert_eq!(fired.try_recv(), Ok(1));

    let (rearmed_id, next) = driver.armed().unwrap();
    assert_eq!(rearmed_id, 1);
    assert!(next > due + chrono::Duration::hours(22));
    assert!(tokio::time::timeout(Duration::from_secs(600), fired.recv())
        .await
        .is_err());
}

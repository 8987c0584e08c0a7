use chrono::Local;
use wakebot_core::storage::Database;
use wakebot_core::{projection, AlarmStore, Projection};

/// Print the next alarm and the time left until it fires.
pub fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let alarms = db.list_alarms()?;
    let next = projection(&alarms, &Local::now());

    if json {
        println!("{}", serde_json::to_string_pretty(&next)?);
        return Ok(());
    }
    match next {
        Projection::Scheduled(summary) => println!(
            "Next alarm: {} {} (in {}, id {})",
            summary.weekday, summary.time, summary.countdown, summary.alarm_id
        ),
        Projection::NoActiveAlarms => println!("No active alarms"),
    }
    Ok(())
}

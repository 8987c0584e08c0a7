use clap::Subcommand;
use wakebot_core::storage::Database;
use wakebot_core::{AlarmDefinition, AlarmStore, Config, DeviceLink, Recurrence, Settings};

use super::{device_link, parse_time};

#[derive(Subcommand)]
pub enum AlarmAction {
    /// Add an alarm
    Add {
        /// Time of day (HH:MM)
        time: String,
        /// Repeat on these days (e.g. "mon,wed,fri"); fires once when omitted
        #[arg(long)]
        days: Option<String>,
        /// Store the alarm switched off
        #[arg(long)]
        inactive: bool,
    },
    /// List alarms
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change an alarm's time or days
    Edit {
        /// Alarm ID
        id: i64,
        /// New time of day (HH:MM)
        #[arg(long)]
        time: Option<String>,
        /// New repeat days; "once" makes it a one-shot alarm
        #[arg(long)]
        days: Option<String>,
    },
    /// Delete an alarm
    Delete {
        /// Alarm ID
        id: i64,
    },
    /// Switch an alarm on
    Enable {
        /// Alarm ID
        id: i64,
    },
    /// Switch an alarm off
    Disable {
        /// Alarm ID
        id: i64,
    },
}

fn recurrence_arg(days: Option<&str>) -> Recurrence {
    match days.map(str::trim) {
        None | Some("") | Some("once") => Recurrence::OneShot,
        Some(list) => Recurrence::parse_lossy(list),
    }
}

fn not_found(id: i64) -> Box<dyn std::error::Error> {
    format!("alarm not found: {id}").into()
}

fn set_active(db: &Database, id: i64, active: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut alarm = db.get_alarm(id)?.ok_or_else(|| not_found(id))?;
    alarm.active = active;
    db.update_alarm(&alarm)?;
    println!("Alarm {id} {}", if active { "enabled" } else { "disabled" });
    Ok(())
}

/// Push a saved alarm's time to the robot's own clock. Returns false when
/// the robot cannot be reached.
async fn push_alarm(link: &DeviceLink, peer: &str, alarm: &AlarmDefinition) -> bool {
    if !link.connect(peer).await {
        return false;
    }
    link.set_alarm_clock(alarm.hour, alarm.minute);
    link.disconnect().await;
    true
}

/// Best effort: a robot out of reach only gets a notice.
fn sync_with_robot(alarm: &AlarmDefinition) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let link = device_link(&config);
    let rt = tokio::runtime::Runtime::new()?;
    if rt.block_on(push_alarm(&link, &config.device_name(), alarm)) {
        println!("Robot alarm set to {}", alarm.time_label());
    } else {
        println!("not connected");
    }
    Ok(())
}

pub fn run(action: AlarmAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        AlarmAction::Add {
            time,
            days,
            inactive,
        } => {
            let (hour, minute) = parse_time(&time)?;
            let mut alarm = AlarmDefinition::new(hour, minute, recurrence_arg(days.as_deref()))?;
            alarm.active = !inactive;
            let id = db.insert_alarm(&alarm)?;
            println!("Alarm created: {id} ({} {})", alarm.time_label(), alarm.recurrence);
            sync_with_robot(&alarm)?;
        }
        AlarmAction::List { json } => {
            let alarms = db.list_alarms()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&alarms)?);
            } else if alarms.is_empty() {
                println!("No alarms");
            } else {
                for alarm in alarms {
                    let state = if alarm.active { "on" } else { "off" };
                    println!(
                        "{:>4}  {}  {:<3}  {}",
                        alarm.id,
                        alarm.time_label(),
                        state,
                        alarm.recurrence
                    );
                }
            }
        }
        AlarmAction::Edit { id, time, days } => {
            let mut alarm = db.get_alarm(id)?.ok_or_else(|| not_found(id))?;
            if let Some(time) = time {
                let (hour, minute) = parse_time(&time)?;
                alarm.hour = hour;
                alarm.minute = minute;
            }
            if days.is_some() {
                alarm.recurrence = recurrence_arg(days.as_deref());
            }
            db.update_alarm(&alarm)?;
            println!("Alarm updated: {id} ({} {})", alarm.time_label(), alarm.recurrence);
            sync_with_robot(&alarm)?;
        }
        AlarmAction::Delete { id } => {
            if !db.delete_alarm(id)? {
                return Err(not_found(id));
            }
            println!("Alarm deleted: {id}");
        }
        AlarmAction::Enable { id } => set_active(&db, id, true)?,
        AlarmAction::Disable { id } => set_active(&db, id, false)?,
    }
    Ok(())
}

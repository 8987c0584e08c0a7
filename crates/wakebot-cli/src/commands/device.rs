use std::time::Duration;

use clap::Subcommand;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use wakebot_core::{Config, DeviceEvent, DeviceLink, Direction, Settings};

use super::device_link;

/// How long to wait for the robot to answer a request.
const REPLY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Subcommand)]
pub enum DeviceAction {
    /// Connection state and battery level
    Status,
    /// Drive the robot (forward, backward, left, right, stop)
    Move {
        #[arg(value_parser = parse_direction)]
        direction: Direction,
    },
    /// Play or stop a song on the robot
    Music {
        /// Song file name
        song: String,
        /// Stop instead of play
        #[arg(long)]
        stop: bool,
    },
    /// Set the robot volume and remember it
    Volume { volume: i32 },
    /// Set the robot speed and remember it
    Speed { speed: i32 },
    /// Select the alarm song and remember it
    Song { name: String },
    /// List songs stored on the robot
    Songs,
    /// Send Wi-Fi credentials to the robot
    Wifi { ssid: String, password: String },
    /// List Wi-Fi networks the robot can see
    ScanWifi,
    /// Push the current local time to the robot
    TimeSync,
}

fn parse_direction(text: &str) -> Result<Direction, String> {
    Direction::parse(text).ok_or_else(|| format!("unknown direction '{text}'"))
}

async fn wait_for<T>(
    events: &mut broadcast::Receiver<DeviceEvent>,
    mut pick: impl FnMut(DeviceEvent) -> Option<T>,
) -> Option<T> {
    let reply = async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(value) = pick(event) {
                        return Some(value);
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    };
    tokio::time::timeout(REPLY_TIMEOUT, reply).await.ok().flatten()
}

fn print_list(items: &[String]) {
    if items.is_empty() {
        println!("(none)");
    }
    for item in items {
        println!("{item}");
    }
}

/// Alert-profile changes are kept even when the robot is out of reach.
fn remember_setting(config: &mut Config, action: &DeviceAction) -> wakebot_core::Result<bool> {
    match action {
        DeviceAction::Volume { volume } => config.set_volume(*volume),
        DeviceAction::Speed { speed } => config.set_speed(*speed),
        DeviceAction::Song { name } => config.set_song(name),
        _ => return Ok(false),
    }
    config.save()?;
    Ok(true)
}

async fn execute(link: &DeviceLink, action: DeviceAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = link.subscribe();
    match action {
        DeviceAction::Status => {
            let battery = match link.telemetry().battery {
                Some(level) => Some(level),
                None => {
                    wait_for(&mut events, |event| match event {
                        DeviceEvent::BatteryLevel { percent } => Some(percent),
                        _ => None,
                    })
                    .await
                }
            };
            let status = json!({
                "peer": link.peer(),
                "state": link.state(),
                "battery": battery,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        DeviceAction::Move { direction } => {
            link.move_robot(direction);
            println!("ok");
        }
        DeviceAction::Music { song, stop } => {
            if stop {
                link.stop_music(&song);
            } else {
                link.start_music(&song);
            }
            println!("ok");
        }
        DeviceAction::Volume { volume } => {
            link.set_volume(volume);
            println!("ok");
        }
        DeviceAction::Speed { speed } => {
            link.set_speed(speed);
            println!("ok");
        }
        DeviceAction::Song { name } => {
            link.set_song(&name);
            println!("ok");
        }
        DeviceAction::Songs => {
            link.request_song_list();
            let songs = wait_for(&mut events, |event| match event {
                DeviceEvent::SongList { songs } => Some(songs),
                _ => None,
            })
            .await
            .ok_or("robot did not report its songs")?;
            print_list(&songs);
        }
        DeviceAction::Wifi { ssid, password } => {
            link.set_wifi(&ssid, &password);
            println!("ok");
        }
        DeviceAction::ScanWifi => {
            link.request_wifi_scan();
            let networks = wait_for(&mut events, |event| match event {
                DeviceEvent::WifiList { networks } => Some(networks),
                _ => None,
            })
            .await
            .ok_or("robot did not report any scan result")?;
            print_list(&networks);
        }
        // The link pushes the time on every connect.
        DeviceAction::TimeSync => println!("time synced"),
    }
    Ok(())
}

pub fn run(action: DeviceAction, peer: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load()?;
    let peer = peer.unwrap_or_else(|| config.device_name());
    let link = device_link(&config);

    if remember_setting(&mut config, &action)? {
        println!("saved");
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        if !link.connect(&peer).await {
            println!("not connected");
            return Ok(());
        }
        let result = execute(&link, action).await;
        link.disconnect().await;
        result
    })
}

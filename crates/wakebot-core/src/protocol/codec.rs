//! Line encoding for outbound commands and decoding for inbound device lines.
//!
//! Every line is ASCII text terminated by `\n`, with fields separated by `|`.
//! Fields are written verbatim: values containing `|` or a newline would
//! corrupt the line, so callers must not pass them.

use serde::{Deserialize, Serialize};

/// Audio file suffixes the robot can play.
const AUDIO_SUFFIXES: [&str; 2] = [".wav", ".mp3"];

/// Movement direction for manual robot control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Direction {
    pub fn as_wire(self) -> &'static str {
        match self {
            Direction::Forward => "FORWARD",
            Direction::Backward => "BACKWARD",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
            Direction::Stop => "STOP",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "FORWARD" => Some(Direction::Forward),
            "BACKWARD" => Some(Direction::Backward),
            "LEFT" => Some(Direction::Left),
            "RIGHT" => Some(Direction::Right),
            "STOP" => Some(Direction::Stop),
            _ => None,
        }
    }
}

/// Settings carried by every start-challenge command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertProfile {
    pub speed: i32,
    pub volume: i32,
    pub song: String,
}

/// Outbound intent sent to the robot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    StartMusic { song: String },
    StopMusic { song: String },
    Move { direction: Direction },
    SetSong { name: String },
    SetSpeed { speed: i32 },
    SetVolume { volume: i32 },
    SetAlarmClock { hour: u32, minute: u32 },
    SyncTime { hour: u32, minute: u32, second: u32 },
    StartMultipleChoice {
        profile: AlertProfile,
        prompt: String,
        options: [String; 4],
        correct: String,
    },
    StartComputed {
        profile: AlertProfile,
        expression: String,
        result: i64,
    },
    WrongAnswer { value: String },
    StopAlarm { token: String },
    SetWifi { ssid: String, password: String },
    RequestSongList,
    RequestWifiScan,
}

impl Command {
    /// Encode as a single newline-terminated line.
    pub fn encode(&self) -> String {
        let mut line = self.to_line();
        line.push('\n');
        line
    }

    /// Encode without the terminator.
    pub fn to_line(&self) -> String {
        match self {
            Command::StartMusic { song } => format!("MUSIC:PLAY|{song}"),
            Command::StopMusic { song } => format!("MUSIC:STOP|{song}"),
            Command::Move { direction } => format!("MOVE:{}", direction.as_wire()),
            Command::SetSong { name } => format!("SET_SONG:{name}"),
            Command::SetSpeed { speed } => format!("SPEED:{speed}"),
            Command::SetVolume { volume } => format!("VOLUME:{volume}"),
            Command::SetAlarmClock { hour, minute } => format!("SET_ALARM:{hour}|{minute}"),
            Command::SyncTime { hour, minute, second } => format!("TIME:{hour}|{minute}|{second}"),
            Command::StartMultipleChoice {
                profile,
                prompt,
                options,
                correct,
            } => format!(
                "ALARM_START|{}|{}|{}|{prompt}|{}|{}|{}|{}|{}",
                profile.speed,
                profile.volume,
                profile.song,
                options[0],
                options[1],
                options[2],
                options[3],
                correct.to_lowercase()
            ),
            Command::StartComputed {
                profile,
                expression,
                result,
            } => format!(
                "MATH_START|{}|{}|{}|{expression}|{result}",
                profile.speed, profile.volume, profile.song
            ),
            Command::WrongAnswer { value } => format!("ALARM_WRONG|{}", value.to_lowercase()),
            Command::StopAlarm { token } => format!("ALARM_STOP|{}", token.to_lowercase()),
            Command::SetWifi { ssid, password } => format!("WIFI:{ssid}|{password}"),
            Command::RequestSongList => "GET_SONGS".to_string(),
            Command::RequestWifiScan => "SCAN_WIFI".to_string(),
        }
    }
}

/// Typed event decoded from an inbound line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEvent {
    BatteryLevel { percent: i32 },
    DevicePausePressed,
    WifiList { networks: Vec<String> },
    SongList { songs: Vec<String> },
}

/// Decode one inbound line. Unknown lines yield `None`; malformed payloads of
/// known prefixes degrade to defaults.
pub fn decode(line: &str) -> Option<DeviceEvent> {
    let line = line.trim();
    if line == "SNOOZE_PRESSED" {
        return Some(DeviceEvent::DevicePausePressed);
    }
    if let Some(payload) = line.strip_prefix("BAT:") {
        let percent = payload.trim().parse::<i32>().unwrap_or(0);
        return Some(DeviceEvent::BatteryLevel { percent });
    }
    if let Some(payload) = line.strip_prefix("WIFI_LIST:") {
        let networks = csv_tokens(payload).collect();
        return Some(DeviceEvent::WifiList { networks });
    }
    if let Some(payload) = line.strip_prefix("SONG_LIST:") {
        let songs = csv_tokens(payload).filter(|s| is_audio_file(s)).collect();
        return Some(DeviceEvent::SongList { songs });
    }
    None
}

fn csv_tokens(payload: &str) -> impl Iterator<Item = String> + '_ {
    payload
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn is_audio_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    AUDIO_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Parse a command line the way the robot does.
///
/// Used by the simulated peer and tests; the application itself never
/// receives commands.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim_end_matches(['\r', '\n']);
    match line {
        "GET_SONGS" => return Some(Command::RequestSongList),
        "SCAN_WIFI" => return Some(Command::RequestWifiScan),
        _ => {}
    }

    if let Some(rest) = line.strip_prefix("MUSIC:") {
        let (action, song) = rest.split_once('|')?;
        let song = song.to_string();
        return match action {
            "PLAY" => Some(Command::StartMusic { song }),
            "STOP" => Some(Command::StopMusic { song }),
            _ => None,
        };
    }
    if let Some(rest) = line.strip_prefix("MOVE:") {
        return Direction::parse(rest).map(|direction| Command::Move { direction });
    }
    if let Some(rest) = line.strip_prefix("SET_SONG:") {
        return Some(Command::SetSong { name: rest.to_string() });
    }
    if let Some(rest) = line.strip_prefix("SPEED:") {
        return rest.parse().ok().map(|speed| Command::SetSpeed { speed });
    }
    if let Some(rest) = line.strip_prefix("VOLUME:") {
        return rest.parse().ok().map(|volume| Command::SetVolume { volume });
    }
    if let Some(rest) = line.strip_prefix("SET_ALARM:") {
        let (hour, minute) = rest.split_once('|')?;
        return Some(Command::SetAlarmClock {
            hour: hour.parse().ok()?,
            minute: minute.parse().ok()?,
        });
    }
    if let Some(rest) = line.strip_prefix("TIME:") {
        let fields: Vec<&str> = rest.split('|').collect();
        let [hour, minute, second] = fields.as_slice() else {
            return None;
        };
        return Some(Command::SyncTime {
            hour: hour.parse().ok()?,
            minute: minute.parse().ok()?,
            second: second.parse().ok()?,
        });
    }
    if let Some(rest) = line.strip_prefix("WIFI:") {
        let (ssid, password) = rest.split_once('|')?;
        return Some(Command::SetWifi {
            ssid: ssid.to_string(),
            password: password.to_string(),
        });
    }

    let fields: Vec<&str> = line.split('|').collect();
    match fields.as_slice() {
        ["ALARM_START", speed, volume, song, prompt, a, b, c, d, correct] => {
            Some(Command::StartMultipleChoice {
                profile: parse_profile(speed, volume, song)?,
                prompt: prompt.to_string(),
                options: [a.to_string(), b.to_string(), c.to_string(), d.to_string()],
                correct: correct.to_string(),
            })
        }
        ["MATH_START", speed, volume, song, expression, result] => Some(Command::StartComputed {
            profile: parse_profile(speed, volume, song)?,
            expression: expression.to_string(),
            result: result.parse().ok()?,
        }),
        ["ALARM_WRONG", value] => Some(Command::WrongAnswer { value: value.to_string() }),
        ["ALARM_STOP", token] => Some(Command::StopAlarm { token: token.to_string() }),
        _ => None,
    }
}

fn parse_profile(speed: &str, volume: &str, song: &str) -> Option<AlertProfile> {
    Some(AlertProfile {
        speed: speed.parse().ok()?,
        volume: volume.parse().ok()?,
        song: song.to_string(),
    })
}

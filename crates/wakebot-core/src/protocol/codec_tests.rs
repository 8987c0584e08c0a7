//! Tests for the codec module.

#[cfg(test)]
mod tests {
    use super::super::codec::*;

    fn profile() -> AlertProfile {
        AlertProfile {
            speed: 5,
            volume: 50,
            song: "wake.wav".to_string(),
        }
    }

    fn every_command() -> Vec<Command> {
        vec![
            Command::StartMusic { song: "wake.wav".into() },
            Command::StopMusic { song: "wake.wav".into() },
            Command::Move { direction: Direction::Forward },
            Command::Move { direction: Direction::Stop },
            Command::SetSong { name: "morning.mp3".into() },
            Command::SetSpeed { speed: 7 },
            Command::SetVolume { volume: 80 },
            Command::SetAlarmClock { hour: 6, minute: 45 },
            Command::SyncTime { hour: 23, minute: 59, second: 1 },
            Command::StartMultipleChoice {
                profile: profile(),
                prompt: "What is 15 * 4?".into(),
                options: ["50", "60", "70", "65"].map(String::from),
                correct: "b".into(),
            },
            Command::StartComputed {
                profile: profile(),
                expression: "5 - 2 * 3".into(),
                result: -1,
            },
            Command::WrongAnswer { value: "timeout".into() },
            Command::StopAlarm { token: "fail".into() },
            Command::SetWifi { ssid: "home".into(), password: "s3cret pass".into() },
            Command::RequestSongList,
            Command::RequestWifiScan,
        ]
    }

    #[test]
    fn every_command_is_one_terminated_line() {
        for command in every_command() {
            let line = command.encode();
            assert!(line.ends_with('\n'), "{line:?}");
            assert_eq!(line.matches('\n').count(), 1, "{line:?}");
        }
    }

    #[test]
    fn peer_parser_reconstructs_every_command() {
        for command in every_command() {
            let parsed = parse_command(&command.encode());
            assert_eq!(parsed.as_ref(), Some(&command), "line: {}", command.to_line());
        }
    }

    #[test]
    fn multiple_choice_field_order_and_lowercased_label() {
        let command = Command::StartMultipleChoice {
            profile: profile(),
            prompt: "Capital?".into(),
            options: ["Krakow", "Gdansk", "Warsaw", "Wroclaw"].map(String::from),
            correct: "C".into(),
        };
        assert_eq!(
            command.to_line(),
            "ALARM_START|5|50|wake.wav|Capital?|Krakow|Gdansk|Warsaw|Wroclaw|c"
        );
    }

    #[test]
    fn computed_and_control_lines() {
        let command = Command::StartComputed {
            profile: profile(),
            expression: "1 + 2 * 3".into(),
            result: 7,
        };
        assert_eq!(command.to_line(), "MATH_START|5|50|wake.wav|1 + 2 * 3|7");
        assert_eq!(Command::StopAlarm { token: "LIMIT".into() }.to_line(), "ALARM_STOP|limit");
        assert_eq!(Command::WrongAnswer { value: "B".into() }.to_line(), "ALARM_WRONG|b");
        assert_eq!(Command::SyncTime { hour: 7, minute: 5, second: 9 }.to_line(), "TIME:7|5|9");
        assert_eq!(Command::Move { direction: Direction::Left }.to_line(), "MOVE:LEFT");
    }

    #[test]
    fn field_values_are_not_escaped() {
        let command = Command::SetWifi { ssid: "a|b".into(), password: "c".into() };
        assert_eq!(command.to_line(), "WIFI:a|b|c");
    }

    #[test]
    fn decodes_battery() {
        assert_eq!(decode("BAT:87"), Some(DeviceEvent::BatteryLevel { percent: 87 }));
        assert_eq!(decode("BAT: 12 \r"), Some(DeviceEvent::BatteryLevel { percent: 12 }));
    }

    #[test]
    fn malformed_battery_degrades_to_zero() {
        assert_eq!(decode("BAT:full"), Some(DeviceEvent::BatteryLevel { percent: 0 }));
        assert_eq!(decode("BAT:"), Some(DeviceEvent::BatteryLevel { percent: 0 }));
    }

    #[test]
    fn decodes_pause_press_literal_only() {
        assert_eq!(decode("SNOOZE_PRESSED"), Some(DeviceEvent::DevicePausePressed));
        assert_eq!(decode("SNOOZE_PRESSED\r\n"), Some(DeviceEvent::DevicePausePressed));
        assert_eq!(decode("SNOOZE_PRESSED_TWICE"), None);
    }

    #[test]
    fn wifi_list_drops_empty_tokens() {
        assert_eq!(
            decode("WIFI_LIST:home, ,office,,guest "),
            Some(DeviceEvent::WifiList {
                networks: vec!["home".into(), "office".into(), "guest".into()]
            })
        );
        assert_eq!(decode("WIFI_LIST:"), Some(DeviceEvent::WifiList { networks: vec![] }));
    }

    #[test]
    fn song_list_keeps_audio_files_only() {
        assert_eq!(
            decode("SONG_LIST:wake.wav,notes.txt,Morning.MP3,,readme"),
            Some(DeviceEvent::SongList {
                songs: vec!["wake.wav".into(), "Morning.MP3".into()]
            })
        );
    }

    #[test]
    fn unknown_lines_are_ignored() {
        assert_eq!(decode("HELLO"), None);
        assert_eq!(decode("TEMP:21"), None);
        assert_eq!(decode(""), None);
    }

    #[test]
    fn decode_is_deterministic() {
        for line in ["BAT:40", "SNOOZE_PRESSED", "WIFI_LIST:a,b", "SONG_LIST:x.wav", "???"] {
            assert_eq!(decode(line), decode(line));
        }
    }
}

//! In-memory robot for tests and `wakebot ring --simulate`.

use std::collections::HashMap;
use std::io;
use std::sync::{Mutex, PoisonError};

use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf,
};
use tracing::debug;

use super::peer::{BoxedStream, ConnectFuture, PeerDirectory};
use crate::protocol::{parse_command, Command};

const PIPE_CAPACITY: usize = 8 * 1024;

/// Directory of in-memory peers. Each peer can be opened once.
#[derive(Default)]
pub struct MemoryDirectory {
    peers: Mutex<HashMap<String, DuplexStream>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer under `name` and return the robot's end of the pipe.
    pub fn add_peer(&self, name: &str) -> SimulatedRobot {
        let (app_side, robot_side) = tokio::io::duplex(PIPE_CAPACITY);
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), app_side);
        SimulatedRobot::new(robot_side)
    }
}

impl PeerDirectory for MemoryDirectory {
    fn paired(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn open(&self, name: &str) -> Option<ConnectFuture> {
        let stream = self
            .peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)?;
        Some(Box::pin(async move { Ok(Box::new(stream) as BoxedStream) }))
    }
}

/// The robot's side of an in-memory link: reads commands, writes telemetry lines.
pub struct SimulatedRobot {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl SimulatedRobot {
    fn new(stream: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Next command the application sent. Unparseable lines are skipped;
    /// `None` once the application closes its end.
    pub async fn next_command(&mut self) -> Option<Command> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line).await {
                Ok(0) | Err(_) => return None,
                Ok(_) => {
                    if let Some(command) = parse_command(&line) {
                        return Some(command);
                    }
                    debug!(line = line.trim_end(), "simulated robot ignored line");
                }
            }
        }
    }

    /// Write one line (terminator appended).
    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    pub async fn press_pause(&mut self) -> io::Result<()> {
        self.send_line("SNOOZE_PRESSED").await
    }

    pub async fn report_battery(&mut self, percent: i32) -> io::Result<()> {
        self.send_line(&format!("BAT:{percent}")).await
    }

    /// Answer requests the way the firmware does and press the pause button
    /// whenever an alert starts. Returns when the application disconnects.
    pub async fn run_auto_pause(mut self, songs: Vec<String>) -> io::Result<()> {
        while let Some(command) = self.next_command().await {
            match command {
                Command::StartMultipleChoice { .. } | Command::StartComputed { .. } => {
                    self.press_pause().await?;
                }
                Command::RequestSongList => {
                    self.send_line(&format!("SONG_LIST:{}", songs.join(","))).await?;
                }
                Command::RequestWifiScan => self.send_line("WIFI_LIST:").await?,
                _ => {}
            }
        }
        Ok(())
    }
}

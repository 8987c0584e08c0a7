//! Persistent line-oriented link to the robot.
//!
//! A [`DeviceLink`] owns the byte stream to one peer. Outbound commands go
//! through a writer task fed by a channel; a reader task reassembles inbound
//! lines, decodes them and broadcasts [`DeviceEvent`]s in receive order. While
//! connected, a third task sends the wall-clock time right away and then once
//! per interval.
//!
//! Failures never escape: a peer that cannot be reached leaves the link
//! `Disconnected`, a failed write is logged, and EOF on the stream drops the
//! link back to `Disconnected` without reconnecting.

#[cfg(unix)]
mod device;
mod peer;
pub mod sim;

#[cfg(unix)]
pub use device::DeviceStream;
pub use peer::{BoxedStream, ByteStream, ConfigDirectory, ConnectFuture, PeerDirectory};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{Local, Timelike};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::{decode, Command, DeviceEvent, Direction, LineBuffer};
use crate::session::CommandSink;

/// Default spacing of time-sync commands.
pub const TIME_SYNC_INTERVAL: Duration = Duration::from_secs(3600);

const EVENT_CAPACITY: usize = 64;
const READ_CHUNK: usize = 512;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Last values reported by the robot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub battery: Option<i32>,
    pub songs: Vec<String>,
    pub wifi_networks: Vec<String>,
}

struct Connection {
    peer: String,
    generation: u64,
    outbound: mpsc::UnboundedSender<Command>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
    time_sync: JoinHandle<()>,
}

struct Inner {
    directory: Arc<dyn PeerDirectory>,
    time_sync_interval: Duration,
    state: watch::Sender<LinkState>,
    events: broadcast::Sender<DeviceEvent>,
    connection: Mutex<Option<Connection>>,
    telemetry: Mutex<Telemetry>,
    generation: AtomicU64,
}

/// Cloneable handle to the robot link. Clones share one connection.
#[derive(Clone)]
pub struct DeviceLink {
    inner: Arc<Inner>,
}

impl DeviceLink {
    pub fn new(directory: Arc<dyn PeerDirectory>) -> Self {
        Self::with_time_sync_interval(directory, TIME_SYNC_INTERVAL)
    }

    pub fn with_time_sync_interval(directory: Arc<dyn PeerDirectory>, interval: Duration) -> Self {
        let (state, _) = watch::channel(LinkState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                directory,
                time_sync_interval: interval,
                state,
                events,
                connection: Mutex::new(None),
                telemetry: Mutex::new(Telemetry::default()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Names the directory can connect to.
    pub fn paired(&self) -> Vec<String> {
        self.inner.directory.paired()
    }

    /// Connect to `name`, replacing any current connection.
    ///
    /// Returns false (and stays `Disconnected`) when the peer is unknown or
    /// the stream cannot be opened.
    pub async fn connect(&self, name: &str) -> bool {
        self.disconnect().await;

        let Some(opening) = self.inner.directory.open(name) else {
            warn!(peer = name, "peer is not paired");
            return false;
        };
        self.set_state(LinkState::Connecting);
        let stream = match opening.await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(peer = name, error = %e, "failed to open link");
                self.set_state(LinkState::Disconnected);
                return false;
            }
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound, commands) = mpsc::unbounded_channel();

        // The clock is synced before anything else goes out.
        let _ = outbound.send(time_sync_command());

        // Held until the connection is stored so a reader that hits EOF
        // immediately still finds its own generation.
        let mut slot = self.lock_connection();
        self.set_state(LinkState::Connected);
        let writer = tokio::spawn(write_loop(write_half, commands));
        let reader = tokio::spawn(read_loop(self.clone(), read_half, generation));
        let time_sync = tokio::spawn(time_sync_loop(
            outbound.clone(),
            self.inner.state.subscribe(),
            self.inner.time_sync_interval,
        ));
        *slot = Some(Connection {
            peer: name.to_string(),
            generation,
            outbound,
            writer,
            reader,
            time_sync,
        });
        drop(slot);
        info!(peer = name, "link connected");
        true
    }

    /// Close the link. Commands already queued are written before the stream closes.
    pub async fn disconnect(&self) {
        let connection = self.lock_connection().take();
        if let Some(mut conn) = connection {
            conn.time_sync.abort();
            conn.reader.abort();
            drop(conn.outbound);
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut conn.writer)
                .await
                .is_err()
            {
                warn!(peer = %conn.peer, "writer did not drain in time");
                conn.writer.abort();
            }
            info!(peer = %conn.peer, "link disconnected");
        }
        self.set_state(LinkState::Disconnected);
    }

    /// Queue a command. Fire-and-forget: a no-op (logged) when not connected.
    pub fn send(&self, command: Command) {
        let guard = self.lock_connection();
        match guard.as_ref() {
            Some(conn) if self.state() == LinkState::Connected => {
                if conn.outbound.send(command).is_err() {
                    warn!(peer = %conn.peer, "writer task is gone, command dropped");
                }
            }
            _ => debug!(command = %command.to_line(), "not connected, command dropped"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> LinkState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Name of the connected peer.
    pub fn peer(&self) -> Option<String> {
        self.lock_connection().as_ref().map(|c| c.peer.clone())
    }

    pub fn telemetry(&self) -> Telemetry {
        self.inner
            .telemetry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_volume(&self, volume: i32) {
        self.send(Command::SetVolume { volume });
    }

    pub fn set_speed(&self, speed: i32) {
        self.send(Command::SetSpeed { speed });
    }

    pub fn set_song(&self, name: &str) {
        self.send(Command::SetSong { name: name.to_string() });
    }

    pub fn start_music(&self, song: &str) {
        self.send(Command::StartMusic { song: song.to_string() });
    }

    pub fn stop_music(&self, song: &str) {
        self.send(Command::StopMusic { song: song.to_string() });
    }

    pub fn move_robot(&self, direction: Direction) {
        self.send(Command::Move { direction });
    }

    pub fn set_alarm_clock(&self, hour: u32, minute: u32) {
        self.send(Command::SetAlarmClock { hour, minute });
    }

    pub fn set_wifi(&self, ssid: &str, password: &str) {
        self.send(Command::SetWifi {
            ssid: ssid.to_string(),
            password: password.to_string(),
        });
    }

    pub fn request_song_list(&self) {
        self.send(Command::RequestSongList);
    }

    pub fn request_wifi_scan(&self) {
        self.send(Command::RequestWifiScan);
    }

    fn lock_connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.inner
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Watchers are only woken by an actual transition.
    fn set_state(&self, state: LinkState) {
        self.inner.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(previous = ?*current, ?state, "link state changed");
            *current = state;
            true
        });
    }

    fn dispatch(&self, event: DeviceEvent) {
        {
            let mut telemetry = self
                .inner
                .telemetry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match &event {
                DeviceEvent::BatteryLevel { percent } => telemetry.battery = Some(*percent),
                DeviceEvent::SongList { songs } => telemetry.songs = songs.clone(),
                DeviceEvent::WifiList { networks } => telemetry.wifi_networks = networks.clone(),
                DeviceEvent::DevicePausePressed => {}
            }
        }
        debug!(?event, "device event");
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    /// Called by the reader task when its stream ends.
    fn connection_lost(&self, generation: u64) {
        let lost = {
            let mut guard = self.lock_connection();
            match guard.as_ref() {
                Some(conn) if conn.generation == generation => guard.take(),
                _ => None,
            }
        };
        if let Some(conn) = lost {
            conn.time_sync.abort();
            info!(peer = %conn.peer, "link lost");
            self.set_state(LinkState::Disconnected);
        }
    }
}

impl CommandSink for DeviceLink {
    fn send(&self, command: Command) {
        DeviceLink::send(self, command);
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    while let Some(command) = commands.recv().await {
        let line = command.encode();
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        match written {
            Ok(()) => debug!(line = line.trim_end(), "sent"),
            Err(e) => warn!(error = %e, line = line.trim_end(), "write failed"),
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop<R: AsyncRead + Unpin>(link: DeviceLink, mut reader: R, generation: u64) {
    let mut chunk = [0u8; READ_CHUNK];
    let mut lines = LineBuffer::new();
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                debug!("peer closed the stream");
                break;
            }
            Ok(n) => {
                for line in lines.push(&chunk[..n]) {
                    match decode(&line) {
                        Some(event) => link.dispatch(event),
                        None => debug!(line = %line, "ignored unknown line"),
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "read failed");
                break;
            }
        }
    }
    link.connection_lost(generation);
}

fn time_sync_command() -> Command {
    let now = Local::now();
    Command::SyncTime {
        hour: now.hour(),
        minute: now.minute(),
        second: now.second(),
    }
}

async fn time_sync_loop(
    outbound: mpsc::UnboundedSender<Command>,
    mut state: watch::Receiver<LinkState>,
    every: Duration,
) {
    let mut next_sync = tokio::time::Instant::now() + every;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(next_sync) => {
                if outbound.send(time_sync_command()).is_err() {
                    break;
                }
                next_sync += every;
            }
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() != LinkState::Connected {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::sim::MemoryDirectory;
    use super::*;

    fn link_with_peer(name: &str) -> (DeviceLink, sim::SimulatedRobot) {
        let directory = MemoryDirectory::new();
        let robot = directory.add_peer(name);
        (DeviceLink::new(Arc::new(directory)), robot)
    }

    async fn wait_for_state(link: &DeviceLink, wanted: LinkState) {
        let mut rx = link.watch_state();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == wanted))
            .await
            .expect("state change timed out")
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_peer_stays_disconnected() {
        let (link, _robot) = link_with_peer("desk");
        let states = link.watch_state();
        assert!(!link.connect("X").await);
        assert!(!states.has_changed().unwrap());
        assert_eq!(link.state(), LinkState::Disconnected);
        assert!(link.peer().is_none());
    }

    #[tokio::test]
    async fn connect_sends_time_sync_first() {
        let (link, mut robot) = link_with_peer("desk");
        assert!(link.connect("desk").await);
        assert_eq!(link.state(), LinkState::Connected);
        assert_eq!(link.peer().as_deref(), Some("desk"));

        link.set_volume(70);
        assert!(matches!(robot.next_command().await, Some(Command::SyncTime { .. })));
        assert_eq!(robot.next_command().await, Some(Command::SetVolume { volume: 70 }));
    }

    #[tokio::test(start_paused = true)]
    async fn time_sync_repeats_while_connected() {
        let directory = MemoryDirectory::new();
        let mut robot = directory.add_peer("desk");
        let link = DeviceLink::with_time_sync_interval(Arc::new(directory), Duration::from_secs(60));
        assert!(link.connect("desk").await);

        for _ in 0..3 {
            assert!(matches!(robot.next_command().await, Some(Command::SyncTime { .. })));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn time_sync_stops_after_disconnect() {
        let directory = MemoryDirectory::new();
        let mut robot = directory.add_peer("desk");
        let link = DeviceLink::with_time_sync_interval(Arc::new(directory), Duration::from_secs(60));
        assert!(link.connect("desk").await);
        assert!(matches!(robot.next_command().await, Some(Command::SyncTime { .. })));

        link.disconnect().await;
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(robot.next_command().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn time_sync_loop_ends_when_the_link_leaves_connected() {
        let (outbound, mut queued) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(LinkState::Connected);
        let task = tokio::spawn(time_sync_loop(outbound, state_rx, Duration::from_secs(60)));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(matches!(queued.try_recv(), Ok(Command::SyncTime { .. })));

        state.send_replace(LinkState::Disconnected);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(task.is_finished());
        assert!(queued.try_recv().is_err());
    }

    #[tokio::test]
    async fn inbound_events_arrive_in_order_and_update_telemetry() {
        let (link, mut robot) = link_with_peer("desk");
        let mut events = link.subscribe();
        assert!(link.connect("desk").await);

        robot.report_battery(81).await.unwrap();
        robot.send_line("HELLO").await.unwrap();
        robot.press_pause().await.unwrap();
        robot.send_line("SONG_LIST:a.wav,b.txt,c.MP3").await.unwrap();

        assert_eq!(events.recv().await.unwrap(), DeviceEvent::BatteryLevel { percent: 81 });
        assert_eq!(events.recv().await.unwrap(), DeviceEvent::DevicePausePressed);
        assert_eq!(
            events.recv().await.unwrap(),
            DeviceEvent::SongList {
                songs: vec!["a.wav".into(), "c.MP3".into()]
            }
        );

        let telemetry = link.telemetry();
        assert_eq!(telemetry.battery, Some(81));
        assert_eq!(telemetry.songs.len(), 2);
    }

    #[tokio::test]
    async fn peer_hangup_drops_to_disconnected() {
        let (link, robot) = link_with_peer("desk");
        assert!(link.connect("desk").await);
        drop(robot);

        wait_for_state(&link, LinkState::Disconnected).await;
        assert!(link.peer().is_none());
        // Sending afterwards is a silent no-op.
        link.request_song_list();
    }

    #[tokio::test]
    async fn disconnect_flushes_queued_commands_then_closes() {
        let (link, mut robot) = link_with_peer("desk");
        assert!(link.connect("desk").await);
        link.move_robot(Direction::Left);
        link.stop_music("wake.wav");
        link.disconnect().await;
        assert_eq!(link.state(), LinkState::Disconnected);

        let mut received = Vec::new();
        while let Some(command) = robot.next_command().await {
            received.push(command);
        }
        assert!(matches!(received[0], Command::SyncTime { .. }));
        assert_eq!(
            &received[1..],
            &[
                Command::Move { direction: Direction::Left },
                Command::StopMusic { song: "wake.wav".into() },
            ]
        );
    }

    #[tokio::test]
    async fn sending_while_disconnected_is_ignored() {
        let (link, _robot) = link_with_peer("desk");
        link.set_alarm_clock(7, 30);
        link.set_wifi("home", "pw");
        assert_eq!(link.state(), LinkState::Disconnected);
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// The external capability that wakes the process at an instant.
///
/// The alarm id doubles as the handle: arming an id that is already armed
/// replaces it, and disarming an id that is not armed does nothing.
pub trait WakeArming {
    fn arm(&mut self, id: i64, at: DateTime<Utc>);
    fn disarm(&mut self, id: i64);

    /// The wake for `id` is due: deliver it now unless it already fired.
    fn fire_due(&mut self, id: i64);
}

struct PendingWake {
    task: JoinHandle<()>,
    at: DateTime<Utc>,
    delivered: Arc<AtomicBool>,
}

/// In-process wakes: one sleeping task per id that sends the id when due.
pub struct TokioWakeArming {
    fired: mpsc::UnboundedSender<i64>,
    pending: HashMap<i64, PendingWake>,
}

impl TokioWakeArming {
    /// The receiver yields the id of every wake that fires.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<i64>) {
        let (fired, fired_rx) = mpsc::unbounded_channel();
        (
            Self {
                fired,
                pending: HashMap::new(),
            },
            fired_rx,
        )
    }

    pub fn armed_at(&self, id: i64) -> Option<DateTime<Utc>> {
        self.pending
            .get(&id)
            .filter(|wake| !wake.task.is_finished())
            .map(|wake| wake.at)
    }
}

impl WakeArming for TokioWakeArming {
    fn arm(&mut self, id: i64, at: DateTime<Utc>) {
        self.disarm(id);
        let delay = (at - Utc::now()).to_std().unwrap_or_default();
        let fired = self.fired.clone();
        let delivered = Arc::new(AtomicBool::new(false));
        let once = delivered.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !once.swap(true, Ordering::SeqCst) {
                debug!(alarm_id = id, "wake fired");
                let _ = fired.send(id);
            }
        });
        debug!(alarm_id = id, %at, "wake armed");
        self.pending.insert(
            id,
            PendingWake {
                task,
                at,
                delivered,
            },
        );
    }

    fn disarm(&mut self, id: i64) {
        if let Some(wake) = self.pending.remove(&id) {
            wake.task.abort();
            debug!(alarm_id = id, "wake disarmed");
        }
    }

    fn fire_due(&mut self, id: i64) {
        if let Some(wake) = self.pending.remove(&id) {
            wake.task.abort();
            if !wake.delivered.swap(true, Ordering::SeqCst) {
                debug!(alarm_id = id, "due wake delivered early");
                let _ = self.fired.send(id);
            }
        }
    }
}

impl Drop for TokioWakeArming {
    fn drop(&mut self) {
        for wake in self.pending.values() {
            wake.task.abort();
        }
    }
}

//! Keeps exactly one wake armed for the next alarm.
//!
//! [`SchedulerDriver::refresh`] re-evaluates the recurrence rules and only
//! touches the wake facility when the (instant, alarm id) pair changes.
//! [`run_scheduler`] calls it once a second and whenever the alarm list
//! changes, reporting a [`Projection`] each time.

mod wake;

pub use wake::{TokioWakeArming, WakeArming};

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::alarm::{next_fire_time, weekday_symbol, AlarmDefinition};
use crate::events::Event;

/// Time left until the next alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Countdown {
    /// Split a non-negative span; negative spans clamp to zero.
    pub fn from_seconds(total: i64) -> Self {
        let total = total.max(0);
        Self {
            days: total / 86_400,
            hours: total % 86_400 / 3_600,
            minutes: total % 3_600 / 60,
            seconds: total % 60,
        }
    }
}

impl std::fmt::Display for Countdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.days > 0 {
            write!(f, "{}d ", self.days)?;
        }
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextAlarmSummary {
    pub alarm_id: i64,
    pub fires_at: DateTime<FixedOffset>,
    /// Weekday symbol of the firing day, e.g. `wed`.
    pub weekday: String,
    /// `HH:MM`.
    pub time: String,
    pub countdown: Countdown,
}

/// What the UI shows about the next alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Projection {
    Scheduled(NextAlarmSummary),
    NoActiveAlarms,
}

/// Render the next alarm relative to `now`.
pub fn projection<Tz: TimeZone>(definitions: &[AlarmDefinition], now: &DateTime<Tz>) -> Projection {
    match next_fire_time(definitions, now) {
        Some((fires_at, def)) => {
            let countdown = Countdown::from_seconds((fires_at.clone() - now.clone()).num_seconds());
            Projection::Scheduled(NextAlarmSummary {
                alarm_id: def.id,
                weekday: weekday_symbol(fires_at.weekday()).to_string(),
                time: def.time_label(),
                countdown,
                fires_at: fires_at.fixed_offset(),
            })
        }
        None => Projection::NoActiveAlarms,
    }
}

/// Arms the wake for the next firing alarm and keeps it current.
pub struct SchedulerDriver<W> {
    arming: W,
    armed: Option<(i64, DateTime<Utc>)>,
}

impl<W: WakeArming> SchedulerDriver<W> {
    pub fn new(arming: W) -> Self {
        Self {
            arming,
            armed: None,
        }
    }

    /// Currently armed (alarm id, instant).
    pub fn armed(&self) -> Option<(i64, DateTime<Utc>)> {
        self.armed
    }

    pub fn arming(&self) -> &W {
        &self.arming
    }

    /// Re-evaluate and re-arm if the next (instant, id) pair changed.
    pub fn refresh<Tz: TimeZone>(
        &mut self,
        definitions: &[AlarmDefinition],
        now: &DateTime<Tz>,
    ) -> Option<Event> {
        let next = next_fire_time(definitions, now).map(|(at, def)| (def.id, at.with_timezone(&Utc)));
        if next == self.armed {
            return None;
        }

        let at = now.with_timezone(&Utc);
        let previous = self.armed.take();
        if let Some((old_id, old_at)) = previous {
            // The clock may pass the instant before the wake task runs; that
            // firing is still owed.
            if old_at <= at {
                self.arming.fire_due(old_id);
            } else {
                self.arming.disarm(old_id);
            }
        }
        match (next, previous) {
            (Some((alarm_id, fires_at)), _) => {
                self.arming.arm(alarm_id, fires_at);
                self.armed = Some((alarm_id, fires_at));
                info!(alarm_id, %fires_at, "next alarm armed");
                Some(Event::WakeArmed {
                    alarm_id,
                    fires_at,
                    at,
                })
            }
            (None, Some((alarm_id, _))) => {
                info!(alarm_id, "no active alarms, wake disarmed");
                Some(Event::WakeDisarmed { alarm_id, at })
            }
            (None, None) => None,
        }
    }

    /// A definition was deleted: drop any wake armed for it.
    pub fn forget(&mut self, id: i64) -> Option<Event> {
        self.arming.disarm(id);
        match self.armed {
            Some((armed_id, _)) if armed_id == id => {
                self.armed = None;
                Some(Event::WakeDisarmed {
                    alarm_id: id,
                    at: Utc::now(),
                })
            }
            _ => None,
        }
    }
}

/// Refresh once per `every` and on every new definition snapshot until the
/// sender side of `definitions` is dropped. Returns the driver.
pub async fn run_scheduler<W, F>(
    mut driver: SchedulerDriver<W>,
    mut definitions: watch::Receiver<Vec<AlarmDefinition>>,
    every: Duration,
    mut on_update: F,
) -> SchedulerDriver<W>
where
    W: WakeArming,
    F: FnMut(&Projection, Option<&Event>),
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut known_ids: HashSet<i64> = HashSet::new();

    loop {
        let snapshot = definitions.borrow_and_update().clone();
        let ids: HashSet<i64> = snapshot.iter().map(|d| d.id).collect();
        for removed in known_ids.difference(&ids) {
            if let Some(event) = driver.forget(*removed) {
                on_update(&Projection::NoActiveAlarms, Some(&event));
            }
        }
        known_ids = ids;

        let now = Local::now();
        let event = driver.refresh(&snapshot, &now);
        on_update(&projection(&snapshot, &now), event.as_ref());

        tokio::select! {
            _ = ticker.tick() => {}
            changed = definitions.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    driver
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{DaySet, Recurrence};
    use chrono::Weekday;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct RecordingArming {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingArming {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl WakeArming for RecordingArming {
        fn arm(&mut self, id: i64, at: DateTime<Utc>) {
            self.calls.lock().unwrap().push(format!("arm {id} {}", at.format("%a %H:%M")));
        }

        fn disarm(&mut self, id: i64) {
            self.calls.lock().unwrap().push(format!("disarm {id}"));
        }

        fn fire_due(&mut self, id: i64) {
            self.calls.lock().unwrap().push(format!("fire {id}"));
        }
    }

    fn tuesday(hour: u32, minute: u32) -> DateTime<Utc> {
        // 2024-01-02 is a Tuesday.
        Utc.with_ymd_and_hms(2024, 1, 2, hour, minute, 0).unwrap()
    }

    fn mwf(id: i64) -> AlarmDefinition {
        let days: DaySet = [Weekday::Mon, Weekday::Wed, Weekday::Fri].into_iter().collect();
        AlarmDefinition::new(7, 0, Recurrence::from_days(days))
            .unwrap()
            .with_id(id)
    }

    #[test]
    fn countdown_splits_seconds() {
        let c = Countdown::from_seconds(86_400 + 2 * 3_600 + 3 * 60 + 4);
        assert_eq!(
            c,
            Countdown {
                days: 1,
                hours: 2,
                minutes: 3,
                seconds: 4
            }
        );
        assert_eq!(c.to_string(), "1d 02:03:04");
        assert_eq!(Countdown::from_seconds(-5).to_string(), "00:00:00");
    }

    #[test]
    fn projection_names_weekday_time_and_countdown() {
        let Projection::Scheduled(summary) = projection(&[mwf(1)], &tuesday(8, 0)) else {
            panic!("expected a scheduled alarm");
        };
        assert_eq!(summary.alarm_id, 1);
        assert_eq!(summary.weekday, "wed");
        assert_eq!(summary.time, "07:00");
        assert_eq!(
            summary.countdown,
            Countdown {
                days: 0,
                hours: 23,
                minutes: 0,
                seconds: 0
            }
        );
    }

    #[test]
    fn projection_without_active_alarms() {
        let mut off = mwf(1);
        off.active = false;
        assert_eq!(projection(&[off], &tuesday(8, 0)), Projection::NoActiveAlarms);
        let json = serde_json::to_value(Projection::NoActiveAlarms).unwrap();
        assert_eq!(json["status"], "no_active_alarms");
    }

    #[test]
    fn refresh_arms_once_per_distinct_pair() {
        let arming = RecordingArming::default();
        let mut driver = SchedulerDriver::new(arming.clone());
        let defs = vec![mwf(1)];

        assert!(matches!(
            driver.refresh(&defs, &tuesday(8, 0)),
            Some(Event::WakeArmed { alarm_id: 1, .. })
        ));
        assert!(driver.refresh(&defs, &tuesday(8, 0)).is_none());
        assert!(driver.refresh(&defs, &tuesday(9, 30)).is_none());
        assert_eq!(arming.calls(), vec!["arm 1 Wed 07:00"]);
    }

    #[test]
    fn earlier_alarm_replaces_armed_one() {
        let arming = RecordingArming::default();
        let mut driver = SchedulerDriver::new(arming.clone());
        driver.refresh(&[mwf(1)], &tuesday(8, 0));

        let soon = AlarmDefinition::new(9, 0, Recurrence::OneShot).unwrap().with_id(2);
        let event = driver.refresh(&[mwf(1), soon], &tuesday(8, 0));
        assert!(matches!(event, Some(Event::WakeArmed { alarm_id: 2, .. })));
        assert_eq!(
            arming.calls(),
            vec!["arm 1 Wed 07:00", "disarm 1", "arm 2 Tue 09:00"]
        );
    }

    #[test]
    fn passing_the_armed_instant_fires_before_rearming() {
        let arming = RecordingArming::default();
        let mut driver = SchedulerDriver::new(arming.clone());
        let daily = AlarmDefinition::new(9, 0, Recurrence::OneShot).unwrap().with_id(1);
        let defs = vec![daily];
        driver.refresh(&defs, &tuesday(8, 0));

        let late = tuesday(9, 0) + chrono::Duration::seconds(1);
        let event = driver.refresh(&defs, &late);
        assert!(matches!(event, Some(Event::WakeArmed { alarm_id: 1, .. })));
        assert_eq!(
            arming.calls(),
            vec!["arm 1 Tue 09:00", "fire 1", "arm 1 Wed 09:00"]
        );
    }

    #[test]
    fn deactivating_everything_disarms() {
        let arming = RecordingArming::default();
        let mut driver = SchedulerDriver::new(arming.clone());
        let mut def = mwf(1);
        driver.refresh(std::slice::from_ref(&def), &tuesday(8, 0));
        def.active = false;

        let event = driver.refresh(&[def], &tuesday(8, 0));
        assert!(matches!(event, Some(Event::WakeDisarmed { alarm_id: 1, .. })));
        assert!(driver.armed().is_none());
        assert_eq!(arming.calls(), vec!["arm 1 Wed 07:00", "disarm 1"]);
    }

    #[test]
    fn forget_disarms_only_known_ids() {
        let arming = RecordingArming::default();
        let mut driver = SchedulerDriver::new(arming.clone());
        driver.refresh(&[mwf(1)], &tuesday(8, 0));

        assert!(driver.forget(7).is_none());
        assert!(driver.forget(1).is_some());
        assert!(driver.armed().is_none());
        assert_eq!(arming.calls(), vec!["arm 1 Wed 07:00", "disarm 7", "disarm 1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn runner_reacts_to_snapshots_and_stops_with_the_sender() {
        let arming = RecordingArming::default();
        let (tx, rx) = watch::channel(Vec::new());
        let updates = Arc::new(Mutex::new(Vec::new()));
        let seen = updates.clone();

        let runner = tokio::spawn(run_scheduler(
            SchedulerDriver::new(arming.clone()),
            rx,
            Duration::from_secs(1),
            move |projection, _event| seen.lock().unwrap().push(projection.clone()),
        ));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        tx.send(vec![AlarmDefinition::new(6, 30, Recurrence::OneShot).unwrap().with_id(5)])
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        tx.send(Vec::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(tx);

        let driver = runner.await.unwrap();
        assert!(driver.armed().is_none());

        let updates = updates.lock().unwrap();
        assert_eq!(updates.first(), Some(&Projection::NoActiveAlarms));
        assert!(updates
            .iter()
            .any(|p| matches!(p, Projection::Scheduled(s) if s.alarm_id == 5)));
        assert_eq!(updates.last(), Some(&Projection::NoActiveAlarms));

        let calls = arming.calls();
        assert!(calls[0].starts_with("arm 5"));
        assert!(calls.contains(&"disarm 5".to_string()));
    }
}

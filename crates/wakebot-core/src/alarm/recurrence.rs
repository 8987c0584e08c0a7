//! Next-fire computation.
//!
//! Pure functions: no I/O, no clock reads. The caller passes `now` in the
//! timezone the alarms are defined in (normally `chrono::Local`).

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Weekday};

use super::{AlarmDefinition, Recurrence};

/// Upper bound on day advances when searching for a weekday match.
const MAX_DAY_ADVANCES: usize = 7;

/// Earliest firing instant strictly after `now` across all active definitions.
///
/// Returns the instant together with the owning definition, or `None` when no
/// definition is active. On an exact tie the definition that comes first in
/// `definitions` wins.
pub fn next_fire_time<'a, Tz: TimeZone>(
    definitions: &'a [AlarmDefinition],
    now: &DateTime<Tz>,
) -> Option<(DateTime<Tz>, &'a AlarmDefinition)> {
    let mut best: Option<(DateTime<Tz>, &'a AlarmDefinition)> = None;
    for def in definitions.iter().filter(|d| d.active) {
        let Some(at) = next_fire_for(def, now) else {
            continue;
        };
        let earlier = match &best {
            Some((current, _)) => at < *current,
            None => true,
        };
        if earlier {
            best = Some((at, def));
        }
    }
    best
}

/// Earliest instant strictly after `now` at which `def` matches its schedule.
///
/// Ignores the `active` flag. `None` only if the local time never exists on
/// any candidate day.
pub fn next_fire_for<Tz: TimeZone>(def: &AlarmDefinition, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    match def.recurrence.normalized() {
        Recurrence::OneShot => {
            let today = now.date_naive();
            local_instant(&now.timezone(), today, def.hour, def.minute)
                .filter(|at| at > now)
                .or_else(|| {
                    let tomorrow = today.succ_opt()?;
                    local_instant(&now.timezone(), tomorrow, def.hour, def.minute)
                })
        }
        Recurrence::Weekly { days } => days
            .iter()
            .filter_map(|day| next_on_weekday(def, day, now))
            .min(),
    }
}

fn next_on_weekday<Tz: TimeZone>(
    def: &AlarmDefinition,
    target: Weekday,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let mut date = now.date_naive();
    for _ in 0..=MAX_DAY_ADVANCES {
        if date.weekday() == target {
            if let Some(at) = local_instant(&tz, date, def.hour, def.minute) {
                if at > *now {
                    return Some(at);
                }
            }
        }
        date = date.succ_opt()?;
    }
    None
}

/// `date` at `hour:minute:00` in `tz`. Ambiguous times take the earlier mapping;
/// times skipped by a DST jump give `None`.
fn local_instant<Tz: TimeZone>(tz: &Tz, date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Tz>> {
    let naive = date.and_hms_opt(hour, minute, 0)?;
    tz.from_local_datetime(&naive).earliest()
}

//! Alarm definitions and their recurrence rules.
//!
//! An alarm fires at `hour:minute` local time, either once (the next time the
//! clock reaches that time) or on a set of weekdays. The weekday set is never
//! empty: an empty selection is normalized to [`Recurrence::OneShot`].

mod recurrence;

pub use recurrence::{next_fire_for, next_fire_time};

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const ALL_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Short lowercase symbol used in storage and on the command line.
pub fn weekday_symbol(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

/// Parse a weekday symbol ("mon", "Monday", "TUE", ...). Unknown symbols give `None`.
pub fn parse_weekday(symbol: &str) -> Option<Weekday> {
    symbol.trim().parse::<Weekday>().ok()
}

/// A set of weekdays stored as a 7-bit mask (bit 0 = Monday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "Vec<String>", from = "Vec<String>")]
pub struct DaySet(u8);

impl DaySet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day.num_days_from_monday();
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Days in Monday-first order.
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        ALL_DAYS.iter().copied().filter(move |d| self.contains(*d))
    }

    /// Parse a `, `-separated symbol list, skipping anything unrecognized.
    pub fn parse_lossy(text: &str) -> Self {
        text.split(',').filter_map(parse_weekday).collect()
    }

    /// Render as the stored form, e.g. `"mon, wed, fri"`.
    pub fn to_symbols(&self) -> String {
        self.iter()
            .map(weekday_symbol)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromIterator<Weekday> for DaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = DaySet::empty();
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl From<DaySet> for Vec<String> {
    fn from(set: DaySet) -> Self {
        set.iter().map(|d| weekday_symbol(d).to_string()).collect()
    }
}

impl From<Vec<String>> for DaySet {
    fn from(symbols: Vec<String>) -> Self {
        symbols.iter().filter_map(|s| parse_weekday(s)).collect()
    }
}

/// When an alarm repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recurrence {
    /// Fires the next time the clock reaches hour:minute, today or tomorrow.
    OneShot,
    /// Fires on each selected weekday. Never empty once built through [`Recurrence::from_days`].
    Weekly { days: DaySet },
}

impl Recurrence {
    /// Build a recurrence from a day set, normalizing an empty set to `OneShot`.
    pub fn from_days(days: DaySet) -> Self {
        if days.is_empty() {
            Recurrence::OneShot
        } else {
            Recurrence::Weekly { days }
        }
    }

    /// Parse the stored form. Empty text or text with no recognizable day is `OneShot`.
    pub fn parse_lossy(text: &str) -> Self {
        Self::from_days(DaySet::parse_lossy(text))
    }

    /// Stored form: empty string for `OneShot`, a symbol list otherwise.
    pub fn to_stored(&self) -> String {
        match self {
            Recurrence::OneShot => String::new(),
            Recurrence::Weekly { days } => days.to_symbols(),
        }
    }

    /// Same rule, with a deserialized empty weekly set folded back to `OneShot`.
    pub fn normalized(self) -> Self {
        match self {
            Recurrence::Weekly { days } => Self::from_days(days),
            other => other,
        }
    }
}

impl std::fmt::Display for Recurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.normalized() {
            Recurrence::OneShot => write!(f, "once"),
            Recurrence::Weekly { days } => write!(f, "{}", days.to_symbols()),
        }
    }
}

/// A user-defined alarm.
///
/// `id` is assigned by the alarm store and doubles as the wake-handle key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmDefinition {
    pub id: i64,
    pub hour: u32,
    pub minute: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    pub recurrence: Recurrence,
}

fn default_active() -> bool {
    true
}

impl AlarmDefinition {
    /// Create an active, not-yet-stored alarm (id 0).
    ///
    /// # Errors
    /// Returns an error if `hour` or `minute` is outside the clock range.
    pub fn new(hour: u32, minute: u32, recurrence: Recurrence) -> Result<Self, ValidationError> {
        validate_time(hour, minute)?;
        Ok(Self {
            id: 0,
            hour,
            minute,
            active: true,
            recurrence: recurrence.normalized(),
        })
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// `HH:MM` rendering.
    pub fn time_label(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }
}

/// Check an hour/minute pair against the 24h clock.
pub fn validate_time(hour: u32, minute: u32) -> Result<(), ValidationError> {
    if hour > 23 || minute > 59 {
        return Err(ValidationError::InvalidTime { hour, minute });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selection_normalizes_to_one_shot() {
        assert_eq!(Recurrence::parse_lossy(""), Recurrence::OneShot);
        assert_eq!(Recurrence::from_days(DaySet::empty()), Recurrence::OneShot);
        let weekly = Recurrence::Weekly { days: DaySet::empty() };
        assert_eq!(weekly.normalized(), Recurrence::OneShot);
    }

    #[test]
    fn unknown_symbols_are_skipped() {
        let rec = Recurrence::parse_lossy("mon, xyz, Friday");
        match rec {
            Recurrence::Weekly { days } => {
                assert_eq!(days.len(), 2);
                assert!(days.contains(Weekday::Mon));
                assert!(days.contains(Weekday::Fri));
            }
            other => panic!("expected weekly, got {other:?}"),
        }
        assert_eq!(Recurrence::parse_lossy("nope, never"), Recurrence::OneShot);
    }

    #[test]
    fn stored_form_is_monday_first() {
        let days: DaySet = [Weekday::Sun, Weekday::Wed, Weekday::Mon].into_iter().collect();
        assert_eq!(Recurrence::from_days(days).to_stored(), "mon, wed, sun");
        assert_eq!(Recurrence::OneShot.to_stored(), "");
    }

    #[test]
    fn serde_uses_symbol_lists() {
        let def = AlarmDefinition::new(
            7,
            30,
            Recurrence::from_days([Weekday::Tue, Weekday::Thu].into_iter().collect()),
        )
        .unwrap();
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["recurrence"]["kind"], "weekly");
        assert_eq!(json["recurrence"]["days"], serde_json::json!(["tue", "thu"]));
        let back: AlarmDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(back, def);
    }

    #[test]
    fn new_rejects_out_of_range_time() {
        assert!(AlarmDefinition::new(24, 0, Recurrence::OneShot).is_err());
        assert!(AlarmDefinition::new(23, 60, Recurrence::OneShot).is_err());
        assert!(AlarmDefinition::new(23, 59, Recurrence::OneShot).is_ok());
    }
}

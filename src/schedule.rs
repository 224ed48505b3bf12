//! Schedule rules
//!
//! A rule is a set of weekdays plus a time-of-day window. Windows whose end lies before their
//! start wrap past midnight; the part after midnight belongs to the previous day's rule.
//!
//! Rules persist as `"<d1>|<d2>…,<HH:MM>,<HH:MM>"` with ISO day numbers (Monday = 1). An empty
//! day list means every day.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike, Weekday};

use crate::error::EngineError;
use crate::store::{KeyValueStore, Property, StoreCodec, StoreValue};

/// Time formats accepted when parsing, most common first
const TIME_FORMATS: [&str; 3] = ["%H:%M", "%H:%M:%S", "%H:%M:%S%.f"];

/// A day-of-week and time-of-day activation window
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduleRule {
    days_of_week: Vec<Weekday>,
    start: NaiveTime,
    end: NaiveTime,
}

impl ScheduleRule {
    /// Create a rule. Days are deduplicated and kept in Monday-first order.
    pub fn new(days: impl IntoIterator<Item = Weekday>, start: NaiveTime, end: NaiveTime) -> Self {
        let mut days_of_week: Vec<Weekday> = days.into_iter().collect();
        days_of_week.sort_by_key(|d| d.num_days_from_monday());
        days_of_week.dedup();
        Self {
            days_of_week,
            start,
            end,
        }
    }

    /// Parse a persisted rule, returning `None` for malformed input.
    pub fn parse(s: &str) -> Option<Self> {
        s.parse().ok()
    }

    pub fn days_of_week(&self) -> &[Weekday] {
        &self.days_of_week
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// Whether this rule covers `at`.
    pub fn is_active(&self, at: NaiveDateTime) -> bool {
        let mut day = at.weekday();
        let time = at.time();
        let mut from = self.start;
        let mut to = self.end;

        if to < from {
            if time < to {
                // after midnight: the window belongs to yesterday's rule
                from = NaiveTime::MIN;
                day = day.pred();
            } else if time > from {
                to = end_of_day();
            }
        }

        let day_matches = self.days_of_week.is_empty() || self.days_of_week.contains(&day);
        let time_matches = from == to || (time > from && time < to);
        day_matches && time_matches
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN)
}

fn format_time(time: NaiveTime) -> String {
    if time.nanosecond() != 0 {
        time.format("%H:%M:%S%.9f").to_string()
    } else if time.second() != 0 {
        time.format("%H:%M:%S").to_string()
    } else {
        time.format("%H:%M").to_string()
    }
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

fn parse_day(s: &str) -> Option<Weekday> {
    match s.parse::<u8>().ok()? {
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        7 => Some(Weekday::Sun),
        _ => None,
    }
}

impl fmt::Display for ScheduleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days: Vec<String> = self
            .days_of_week
            .iter()
            .map(|d| d.number_from_monday().to_string())
            .collect();
        write!(
            f,
            "{},{},{}",
            days.join("|"),
            format_time(self.start),
            format_time(self.end)
        )
    }
}

impl FromStr for ScheduleRule {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidScheduleRule(s.to_string());
        // fields after the end time are reserved and ignored
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() < 3 {
            return Err(invalid());
        }

        let days = if parts[0].trim().is_empty() {
            Vec::new()
        } else {
            parts[0]
                .split('|')
                .map(|d| parse_day(d.trim()))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(invalid)?
        };
        let start = parse_time(parts[1].trim()).ok_or_else(invalid)?;
        let end = parse_time(parts[2].trim()).ok_or_else(invalid)?;

        Ok(Self::new(days, start, end))
    }
}

/// Whether a rule set allows activity at `at`. An empty set always does.
pub fn is_scheduled(rules: &[ScheduleRule], at: NaiveDateTime) -> bool {
    rules.is_empty() || rules.iter().any(|rule| rule.is_active(at))
}

impl StoreCodec for Vec<ScheduleRule> {
    fn encode(&self) -> StoreValue {
        StoreValue::StringSet(self.iter().map(ToString::to_string).collect())
    }

    fn decode(value: StoreValue) -> Option<Self> {
        match value {
            StoreValue::StringSet(set) => Some(
                set.iter()
                    .filter_map(|s| {
                        let rule = ScheduleRule::parse(s);
                        if rule.is_none() {
                            log::warn!("dropping malformed schedule rule {:?}", s);
                        }
                        rule
                    })
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// Persisted schedule of a feature
#[derive(Debug)]
pub struct FeatureSchedule {
    rules: Property<Vec<ScheduleRule>>,
}

impl FeatureSchedule {
    pub fn load(store: Arc<dyn KeyValueStore>, feature_id: &str) -> Self {
        Self {
            rules: Property::load(store, feature_id, "scheduleRules", Vec::new()),
        }
    }

    pub fn rules(&self) -> Vec<ScheduleRule> {
        self.rules.get()
    }

    pub fn set_rules(&self, rules: Vec<ScheduleRule>) {
        self.rules.set(rules);
    }

    pub fn is_scheduled(&self, at: NaiveDateTime) -> bool {
        is_scheduled(&self.rules.get(), at)
    }
}

/// Parse a list of serialized rules, skipping malformed entries.
pub fn parse_rules<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<ScheduleRule> {
    items.into_iter().filter_map(ScheduleRule::parse).collect()
}

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveTime, Timelike, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::hhmm;
use crate::errors::AppError;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Upper bound on the bookable horizon; the window is rebuilt on every read.
const MAX_WEEKS_FORWARD: u32 = 52;

/// Opening hours for one ISO weekday (1 = Monday .. 7 = Sunday).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeekdayRule {
    pub weekday: u8,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl WeekdayRule {
    pub fn new(weekday: u8, start: NaiveTime, end: NaiveTime) -> Self {
        Self { weekday, start, end }
    }

    pub fn start_minutes(&self) -> u32 {
        minutes_since_midnight(&self.start)
    }

    pub fn end_minutes(&self) -> u32 {
        minutes_since_midnight(&self.end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub timezone: Tz,
    pub session_minutes: u32,
    pub buffer_minutes: u32,
    pub weeks_forward: u32,
}

impl SessionConfig {
    /// Minutes between consecutive slot starts.
    pub fn step_minutes(&self) -> u32 {
        self.session_minutes.saturating_add(self.buffer_minutes)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::Fortaleza,
            session_minutes: 50,
            buffer_minutes: 10,
            weeks_forward: 4,
        }
    }
}

/// The provider's full bookable schedule: session shape plus weekday rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub session: SessionConfig,
    pub rules: Vec<WeekdayRule>,
}

impl Schedule {
    pub fn new(session: SessionConfig, rules: Vec<WeekdayRule>) -> Result<Self, AppError> {
        let schedule = Self { session, rules };
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn rules_from_json(s: &str) -> Result<Vec<WeekdayRule>, AppError> {
        serde_json::from_str(s).map_err(|e| AppError::Config(format!("invalid weekday rules: {e}")))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.session.session_minutes == 0 {
            return Err(AppError::Config(
                "session minutes must be greater than zero".to_string(),
            ));
        }
        match self
            .session
            .session_minutes
            .checked_add(self.session.buffer_minutes)
        {
            Some(step) if step <= MINUTES_PER_DAY => {}
            _ => {
                return Err(AppError::Config(format!(
                    "session plus buffer must fit in one day ({MINUTES_PER_DAY} minutes)"
                )))
            }
        }
        if self.session.weeks_forward == 0 {
            return Err(AppError::Config(
                "weeks forward must be greater than zero".to_string(),
            ));
        }
        if self.session.weeks_forward > MAX_WEEKS_FORWARD {
            return Err(AppError::Config(format!(
                "weeks forward must be at most {MAX_WEEKS_FORWARD}"
            )));
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !(1..=7).contains(&rule.weekday) {
                return Err(AppError::Config(format!(
                    "invalid weekday {} (expected 1-7)",
                    rule.weekday
                )));
            }
            if rule.start >= rule.end {
                return Err(AppError::Config(format!(
                    "rule for weekday {} starts at {} but ends at {}",
                    rule.weekday,
                    hhmm::format(&rule.start),
                    hhmm::format(&rule.end)
                )));
            }
            if !seen.insert(rule.weekday) {
                return Err(AppError::Config(format!(
                    "more than one rule for weekday {}",
                    rule.weekday
                )));
            }
        }
        Ok(())
    }

    pub fn rule_for(&self, weekday: Weekday) -> Option<&WeekdayRule> {
        let iso = weekday.number_from_monday() as u8;
        self.rules.iter().find(|r| r.weekday == iso)
    }

    pub fn to_human_readable(&self) -> String {
        let mut sorted: Vec<&WeekdayRule> = self.rules.iter().collect();
        sorted.sort_by_key(|r| r.weekday);

        sorted
            .iter()
            .map(|r| {
                format!(
                    "{}: {}-{}",
                    weekday_label(r.weekday),
                    hhmm::format(&r.start),
                    hhmm::format(&r.end)
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for Schedule {
    /// Monday to Friday, 09:00-18:00.
    fn default() -> Self {
        let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default();
        let end = NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default();
        Self {
            session: SessionConfig::default(),
            rules: (1..=5).map(|d| WeekdayRule::new(d, start, end)).collect(),
        }
    }
}

fn weekday_label(weekday: u8) -> &'static str {
    match weekday {
        1 => "Mon",
        2 => "Tue",
        3 => "Wed",
        4 => "Thu",
        5 => "Fri",
        6 => "Sat",
        _ => "Sun",
    }
}

pub fn minutes_since_midnight(time: &NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSlot {
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaySlots {
    pub date: NaiveDate,
    pub slots: Vec<TimeSlot>,
}

/// A (date, start) pair pointing at one slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotRef {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct DayStats {
    pub total: usize,
    pub available: usize,
    pub occupied: usize,
}

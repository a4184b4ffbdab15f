//! Local "HH:MM" time-of-day handling for draw windows
//!
//! Windows never wrap midnight; both bounds are inclusive at minute resolution.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Minute-resolution local time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HourMinute {
    hour: u8,
    minute: u8,
}

impl HourMinute {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn minutes_of_day(&self) -> u32 {
        self.hour as u32 * 60 + self.minute as u32
    }

    pub fn plus_minutes(&self, minutes: u32) -> u32 {
        self.minutes_of_day() + minutes
    }

    pub fn is_at_or_after(&self, now: &NaiveDateTime) -> bool {
        minutes_of_day(now) >= self.minutes_of_day()
    }
}

/// Minutes since local midnight, seconds truncated
pub fn minutes_of_day(now: &NaiveDateTime) -> u32 {
    now.hour() * 60 + now.minute()
}

impl FromStr for HourMinute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (h, m) = raw
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got '{}'", s))?;

        let digits = |part: &str, max_len: usize| {
            !part.is_empty() && part.len() <= max_len && part.bytes().all(|b| b.is_ascii_digit())
        };
        if !digits(h, 2) || !digits(m, 2) || m.len() != 2 {
            return Err(format!("expected HH:MM, got '{}'", s));
        }

        let hour: u8 = h.parse().map_err(|_| format!("bad hour in '{}'", s))?;
        let minute: u8 = m.parse().map_err(|_| format!("bad minute in '{}'", s))?;
        HourMinute::new(hour, minute).ok_or_else(|| format!("time out of range: '{}'", s))
    }
}

impl TryFrom<String> for HourMinute {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<HourMinute> for String {
    fn from(hm: HourMinute) -> Self {
        hm.to_string()
    }
}

impl fmt::Display for HourMinute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Inclusive local window within a single day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: HourMinute,
    pub end: HourMinute,
}

impl TimeWindow {
    pub fn new(start: HourMinute, end: HourMinute) -> Result<Self, String> {
        if start > end {
            return Err(format!("window start {} is after end {}", start, end));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, now: &NaiveDateTime) -> bool {
        let m = minutes_of_day(now);
        m >= self.start.minutes_of_day() && m <= self.end.minutes_of_day()
    }

    pub fn contains_time(&self, hm: HourMinute) -> bool {
        hm >= self.start && hm <= self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}–{}", self.start, self.end)
    }
}

use std::{fmt, str::FromStr};

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeOfDayError {
    #[error("`{0}` is not a HH:MM:SS time")]
    Format(String),
    #[error("{0} seconds is outside a single day")]
    OutOfRange(u32),
}

/// Wall-clock time normalized to seconds since midnight, always `< 86400`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u32);

impl TimeOfDay {
    pub const MIDNIGHT: Self = Self(0);

    pub fn from_seconds(seconds: u32) -> Result<Self, TimeOfDayError> {
        if seconds < SECONDS_PER_DAY {
            Ok(Self(seconds))
        } else {
            Err(TimeOfDayError::OutOfRange(seconds))
        }
    }

    pub fn seconds(self) -> u32 {
        self.0
    }

    pub fn hour(self) -> u32 {
        self.0 / 3600
    }

    pub fn minute(self) -> u32 {
        (self.0 / 60) % 60
    }

    pub fn second(self) -> u32 {
        self.0 % 60
    }
}

impl From<NaiveTime> for TimeOfDay {
    fn from(time: NaiveTime) -> Self {
        // Leap seconds fold into the preceding second.
        Self(time.num_seconds_from_midnight())
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeOfDayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
            .map(Self::from)
            .map_err(|_| TimeOfDayError::Format(trimmed.to_string()))
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = TimeOfDayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(time: TimeOfDay) -> Self {
        time.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

/// Half-open `[start, end)` check. `start > end` wraps across midnight. A
/// degenerate `start == end` window covers every second except `start` itself.
pub fn in_window(now: TimeOfDay, start: TimeOfDay, end: TimeOfDay) -> bool {
    if start < end {
        now >= start && now < end
    } else if start == end {
        now != start
    } else {
        now >= start || now < end
    }
}

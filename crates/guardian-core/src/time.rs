//! Daily wall-clock times in `HH:MM:SS` form.

use crate::error::{CoreError, Result};
use chrono::NaiveTime;

const TIME_FORMAT: &str = "%H:%M:%S";

/// Parse an `HH:MM:SS` string. An empty (or blank) string means "disabled".
pub fn parse_time_of_day(raw: &str) -> Result<Option<NaiveTime>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .map(Some)
        .map_err(|_| CoreError::InvalidTime(raw.to_string()))
}

/// Daily window `[start, end]`. Wraps past midnight when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DailyWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse both bounds; both must be present.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = parse_time_of_day(start)?
            .ok_or_else(|| CoreError::InvalidTime(start.to_string()))?;
        let end =
            parse_time_of_day(end)?.ok_or_else(|| CoreError::InvalidTime(end.to_string()))?;
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= at && at <= self.end
        } else {
            at >= self.start || at <= self.end
        }
    }
}

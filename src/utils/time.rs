//! Time helpers for rule evaluation
//!
//! Start windows are authored as `"HHMM-HHMM"` or `"HH:MM-HH:MM"` and
//! evaluated in minutes from local midnight. A window may cross midnight.

use chrono::{DateTime, Datelike, Local, Timelike};
use thiserror::Error;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("window must contain exactly one '-': {0}")]
    MissingSeparator(String),

    #[error("window bound is not a valid HHMM time: {0}")]
    InvalidBound(String),
}

/// A parsed start window in minutes-from-midnight.
///
/// Start-inclusive, end-exclusive. `start > end` wraps midnight;
/// `start == end` never matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartWindow {
    start_min: u16,
    end_min: u16,
}

impl StartWindow {
    pub fn parse(raw: &str) -> Result<Self, WindowError> {
        let compact: String = raw.chars().filter(|c| *c != ':').collect();
        let mut parts = compact.splitn(2, '-');
        let (start, end) = match (parts.next(), parts.next()) {
            (Some(s), Some(e)) if !s.is_empty() && !e.is_empty() => (s, e),
            _ => return Err(WindowError::MissingSeparator(raw.to_string())),
        };

        Ok(Self {
            start_min: parse_hhmm(start)?,
            end_min: parse_hhmm(end)?,
        })
    }

    /// Whether a local minute-of-day falls inside the window.
    pub fn contains(&self, minute_of_day: u16) -> bool {
        let t = minute_of_day;
        if self.start_min < self.end_min {
            t >= self.start_min && t < self.end_min
        } else if self.start_min > self.end_min {
            // Crosses midnight
            t >= self.start_min || t < self.end_min
        } else {
            false
        }
    }
}

fn parse_hhmm(bound: &str) -> Result<u16, WindowError> {
    if bound.len() < 3 || bound.len() > 4 || !bound.chars().all(|c| c.is_ascii_digit()) {
        return Err(WindowError::InvalidBound(bound.to_string()));
    }
    let (hh, mm) = bound.split_at(bound.len() - 2);
    let hours: u16 = hh
        .parse()
        .map_err(|_| WindowError::InvalidBound(bound.to_string()))?;
    let minutes: u16 = mm
        .parse()
        .map_err(|_| WindowError::InvalidBound(bound.to_string()))?;
    if hours > 23 || minutes > 59 {
        return Err(WindowError::InvalidBound(bound.to_string()));
    }
    Ok(hours * 60 + minutes)
}

/// Minute of the local day (0..1440).
pub fn minute_of_day(dt: &DateTime<Local>) -> u16 {
    (dt.hour() * 60 + dt.minute()) as u16
}

/// Weekday with Sunday=0 .. Saturday=6, as rules store them.
pub fn weekday_sunday0(dt: &DateTime<Local>) -> u8 {
    dt.weekday().num_days_from_sunday() as u8
}

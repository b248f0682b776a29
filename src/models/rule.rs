//! Series recording rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::StartWindow;

/// A user-authored recording intent: "record everything on this channel
/// whose title contains this keyword, on these days, in this time window".
///
/// `last_run_*` fields are server-managed; the store preserves them across
/// caller updates that omit them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRule {
    /// Opaque unique identifier, immutable after creation
    #[serde(default)]
    pub id: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Case-insensitive title substring; empty matches any title
    #[serde(default)]
    pub keyword: String,

    /// Upstream service reference; empty matches any channel
    #[serde(default)]
    pub channel_ref: String,

    /// Weekday numbers, Sunday=0 .. Saturday=6; empty matches any day
    #[serde(default)]
    pub days: Vec<u8>,

    /// "HHMM-HHMM" or "HH:MM-HH:MM", may cross midnight; empty matches any time
    #[serde(default)]
    pub start_window: String,

    /// Higher priority rules are evaluated first
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_run_status: String,

    #[serde(default)]
    pub last_run_summary: String,
}

fn default_enabled() -> bool {
    true
}

impl SeriesRule {
    /// Validate user-editable fields at the store boundary.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(day) = self.days.iter().find(|d| **d > 6) {
            return Err(format!("invalid weekday {day}, expected 0 (Sunday) to 6"));
        }
        if !self.start_window.is_empty() {
            StartWindow::parse(&self.start_window)
                .map_err(|e| format!("invalid start_window: {e}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> SeriesRule {
        serde_json::from_str(r#"{"id": "r1", "keyword": "news"}"#).unwrap()
    }

    #[test]
    fn deserializes_with_defaults() {
        let r = rule();
        assert!(r.enabled);
        assert!(r.days.is_empty());
        assert_eq!(r.priority, 0);
        assert!(r.last_run_at.is_none());
    }

    #[test]
    fn validate_rejects_bad_days_and_windows() {
        let mut r = rule();
        r.days = vec![0, 7];
        assert!(r.validate().is_err());

        let mut r = rule();
        r.start_window = "2500-0100".into();
        assert!(r.validate().is_err());

        let mut r = rule();
        r.start_window = "22:00-02:00".into();
        assert!(r.validate().is_ok());
    }
}

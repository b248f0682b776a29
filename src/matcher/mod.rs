//! Rule-vs-event matching
//!
//! A pure function: one rule against one EPG event, evaluated in a fixed
//! order (channel, keyword, day, window) with short-circuit on the first
//! mismatch. Day and window checks run in the process's local time zone;
//! callers convert the event's UTC begin before calling in.

use chrono::{DateTime, Local};

use crate::models::SeriesRule;
use crate::utils::time::{StartWindow, minute_of_day, weekday_sunday0};

/// Reason tag emitted when the rule's window string does not parse.
pub const REASON_WINDOW_CONFIG_ERROR: &str = "window_config_error";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub matched: bool,
    /// Machine-readable tags: which filters applied on a match, or the
    /// single mismatch reason otherwise
    pub reasons: Vec<String>,
}

impl MatchOutcome {
    fn matched(reasons: Vec<String>) -> Self {
        Self {
            matched: true,
            reasons,
        }
    }

    fn mismatch(reason: &str) -> Self {
        Self {
            matched: false,
            reasons: vec![reason.to_string()],
        }
    }
}

/// Evaluate `rule` against one programme.
///
/// Empty rule fields are wildcards. The keyword check is a case-insensitive
/// substring via Unicode lowercasing, so non-ASCII titles compare correctly.
pub fn matches(
    rule: &SeriesRule,
    title: &str,
    service_ref: &str,
    start_local: DateTime<Local>,
) -> MatchOutcome {
    let mut reasons = Vec::new();

    if !rule.channel_ref.is_empty() {
        if !rule.channel_ref.eq_ignore_ascii_case(service_ref) {
            return MatchOutcome::mismatch("channel_mismatch");
        }
        reasons.push("channel_match".to_string());
    }

    if !rule.keyword.is_empty() {
        if !title
            .to_lowercase()
            .contains(&rule.keyword.to_lowercase())
        {
            return MatchOutcome::mismatch("keyword_mismatch");
        }
        reasons.push("keyword_match".to_string());
    }

    if !rule.days.is_empty() {
        let weekday = weekday_sunday0(&start_local);
        if !rule.days.contains(&weekday) {
            return MatchOutcome::mismatch("day_mismatch");
        }
        reasons.push("day_match".to_string());
    }

    if !rule.start_window.is_empty() {
        let window = match StartWindow::parse(&rule.start_window) {
            Ok(w) => w,
            Err(_) => return MatchOutcome::mismatch(REASON_WINDOW_CONFIG_ERROR),
        };
        if !window.contains(minute_of_day(&start_local)) {
            return MatchOutcome::mismatch("window_mismatch");
        }
        reasons.push("window_match".to_string());
    }

    MatchOutcome::matched(reasons)
}

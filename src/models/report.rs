//! Per-run, per-rule decision reports
//!
//! A report is produced once per rule per pass and handed to the report
//! store; the engine keeps no report state between runs. The three decision
//! lists are ring buffers with a drop-oldest policy so a pathological pass
//! cannot grow a report without bound.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::VecDeque;
use uuid::Uuid;

use super::SeriesRule;

pub const DECISIONS_CAP: usize = 200;
pub const ERRORS_CAP: usize = 50;
pub const CONFLICTS_CAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Manual,
    Auto,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Created,
    Skipped,
    Conflict,
    Error,
}

/// Counters for one rule evaluation, including guardrail-hit flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub epg_items_scanned: u64,
    pub epg_items_matched: u64,
    pub timers_attempted: u64,
    pub timers_created: u64,
    pub timers_skipped: u64,
    pub timers_errored: u64,
    pub receiver_unreachable: bool,
    pub max_timers_per_rule_hit: bool,
    pub max_matches_scanned_per_rule_hit: bool,
    pub max_timers_global_per_run_hit: bool,
}

/// One engine decision about one candidate timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    /// Machine-readable reason tag, e.g. `match`, `duplicate`, `global_limit_hit`
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begin: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_reasons: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportError {
    /// Which stage failed: `timers_fetch`, `epg_fetch`, `epg_parse`, `timer_add`
    pub stage: String,
    pub message: String,
    pub retryable: bool,
}

/// An overlap between a candidate timer and a pre-existing receiver timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConflict {
    pub service_ref: String,
    pub event_id: Option<u64>,
    pub candidate_begin: i64,
    pub candidate_end: i64,
    pub existing_begin: i64,
    pub existing_end: i64,
    pub existing_name: String,
}

/// Fixed-capacity log; pushing past capacity drops the oldest entry.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedLog<T> {
    cap: usize,
    items: VecDeque<T>,
}

impl<T> BoundedLog<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            items: VecDeque::with_capacity(cap.min(64)),
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() == self.cap {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Serialize> Serialize for BoundedLog<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.items.iter())
    }
}

/// The artifact of one rule evaluation in one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub rule_id: String,
    pub run_id: Uuid,
    pub trigger: Trigger,
    /// Scanning window, epoch seconds
    pub window_from: i64,
    pub window_to: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: RunStatus,
    pub summary: RunSummary,
    /// The rule exactly as seen at evaluation time
    pub rule: SeriesRule,
    pub decisions: BoundedLog<Decision>,
    pub errors: BoundedLog<ReportError>,
    pub conflicts: BoundedLog<ReportConflict>,
}

impl RunReport {
    pub fn new(
        rule: &SeriesRule,
        run_id: Uuid,
        trigger: Trigger,
        window_from: i64,
        window_to: i64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            rule_id: rule.id.clone(),
            run_id,
            trigger,
            window_from,
            window_to,
            started_at,
            finished_at: started_at,
            duration_ms: 0,
            status: RunStatus::Success,
            summary: RunSummary::default(),
            rule: rule.clone(),
            decisions: BoundedLog::new(DECISIONS_CAP),
            errors: BoundedLog::new(ERRORS_CAP),
            conflicts: BoundedLog::new(CONFLICTS_CAP),
        }
    }

    pub fn push_error(&mut self, stage: &str, message: String, retryable: bool) {
        self.errors.push(ReportError {
            stage: stage.to_string(),
            message,
            retryable,
        });
    }

    /// Stamp the exit-path fields.
    pub fn finish(&mut self, status: RunStatus, finished_at: DateTime<Utc>, duration_ms: u64) {
        self.status = status;
        self.finished_at = finished_at;
        self.duration_ms = duration_ms;
    }

    /// Single-line digest stored into the rule's `last_run_summary`.
    pub fn summary_line(&self) -> String {
        let s = &self.summary;
        format!(
            "scanned {}, matched {}, created {}, skipped {}, errored {}",
            s.epg_items_scanned,
            s.epg_items_matched,
            s.timers_created,
            s.timers_skipped,
            s.timers_errored
        )
    }

    /// Whether this pass did anything worth an Info-level log line.
    pub fn had_activity(&self) -> bool {
        let s = &self.summary;
        s.timers_created + s.timers_skipped + s.timers_errored > 0
    }
}

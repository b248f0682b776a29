//! The run engine: one pass of rule evaluation against the receiver
//!
//! `run_once` orchestrates a pass: load rules, fetch the receiver's current
//! timers, fetch EPG per rule, match, dedupe, create timers under the
//! guardrail caps, and emit one report per rule. Concurrent run requests
//! coalesce through a keyed single-flight; the pass itself is single-writer
//! behind an exclusive lock.
//!
//! Determinism contract: for a fixed `(rules, timers, epg, now)` the
//! decision sequence is identical across runs. Rules are totally ordered by
//! `(priority desc, id asc)`, events are window-filtered and sorted before
//! scan-counting, matches are sorted by `(begin, id)`, and cap policies are
//! positional.

use chrono::{DateTime, Local, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::config::defaults::LOOKBACK_SECS;
use crate::errors::{EngineError, ReceiverError};
use crate::matcher;
use crate::models::{
    Decision, DecisionAction, EpgEvent, ReportConflict, RunReport, RunStatus, SeriesRule,
    TimerEntry, Trigger,
};
use crate::receiver::ReceiverApi;
use crate::rules::RuleStore;
use crate::scheduler::Clock;
use crate::utils::singleflight::SingleFlight;

pub mod report_store;

pub use report_store::ReportStore;

pub type RunOutcome = Result<Vec<RunReport>, EngineError>;

/// Mutable state threaded through one pass: the dedupe sets, the per-run EPG
/// cache, and the remaining global timer budget.
struct PassState {
    dedupe: HashSet<(String, i64, i64)>,
    begin_dedupe: HashSet<(String, i64)>,
    existing_timers: Vec<TimerEntry>,
    epg_cache: HashMap<String, Result<Vec<EpgEvent>, ReceiverError>>,
    remaining_global: u64,
}

pub struct RunEngine {
    rules: Arc<RuleStore>,
    receiver: Arc<dyn ReceiverApi>,
    reports: Arc<ReportStore>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    flight: SingleFlight<RunOutcome>,
    run_lock: Mutex<()>,
}

impl RunEngine {
    pub fn new(
        rules: Arc<RuleStore>,
        receiver: Arc<dyn ReceiverApi>,
        reports: Arc<ReportStore>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rules,
            receiver,
            reports,
            config,
            clock,
            flight: SingleFlight::new(),
            run_lock: Mutex::new(()),
        }
    }

    /// Run one pass. Concurrent callers with the same key (`"run"` globally
    /// or `"run:<rule_id>"`) receive the same report set and error.
    pub async fn run_once(self: Arc<Self>, trigger: Trigger, rule_id: Option<String>) -> RunOutcome {
        let key = match &rule_id {
            Some(id) => format!("run:{id}"),
            None => "run".to_string(),
        };
        let engine = self.clone();
        self.flight
            .run(&key, move || {
                Box::pin(async move { engine.execute_pass(trigger, rule_id).await })
            })
            .await
    }

    async fn execute_pass(&self, trigger: Trigger, rule_id: Option<String>) -> RunOutcome {
        let _guard = self.run_lock.lock().await;

        let now = self.clock.now_utc();
        let run_id = Uuid::new_v4();

        let mut rules: Vec<SeriesRule> = match &rule_id {
            Some(id) => {
                let rule = self
                    .rules
                    .get(id)
                    .ok_or_else(|| EngineError::RuleNotFound(id.clone()))?;
                vec![rule]
            }
            None => self.rules.list().into_iter().filter(|r| r.enabled).collect(),
        };
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));

        let window_from = now.timestamp() - LOOKBACK_SECS;
        let window_to = now.timestamp() + i64::from(self.config.horizon_days) * 86_400;

        info!(
            run_id = %run_id,
            trigger = trigger.as_str(),
            rules = rules.len(),
            "starting series pass"
        );

        // The receiver's current timers are the dedupe baseline; without
        // them nothing may be created.
        let timers = match self.receiver.timers().await {
            Ok(timers) => timers,
            Err(e) => {
                warn!(error = %e, "timer list fetch failed, aborting pass");
                let finished = self.clock.now_utc();
                let reports: Vec<RunReport> = rules
                    .iter()
                    .map(|rule| {
                        let mut report =
                            RunReport::new(rule, run_id, trigger, window_from, window_to, now);
                        report.summary.receiver_unreachable = true;
                        report.push_error("timers_fetch", e.to_string(), e.retryable());
                        report.finish(RunStatus::Failed, finished, 0);
                        report
                    })
                    .collect();
                self.finalize(&reports);
                return Ok(reports);
            }
        };

        let mut state = PassState {
            dedupe: timers.iter().map(TimerEntry::dedupe_key).collect(),
            begin_dedupe: if self.config.dedupe_on_begin {
                timers
                    .iter()
                    .map(|t| (t.service_ref.clone(), t.begin))
                    .collect()
            } else {
                HashSet::new()
            },
            existing_timers: timers,
            epg_cache: HashMap::new(),
            remaining_global: self.config.max_timers_global_per_run,
        };

        let mut reports = Vec::with_capacity(rules.len());
        for rule in &rules {
            let report = self
                .evaluate_rule(rule, trigger, run_id, now, window_from, window_to, &mut state)
                .await;
            reports.push(report);
        }

        self.finalize(&reports);
        Ok(reports)
    }

    #[allow(clippy::too_many_arguments)]
    async fn evaluate_rule(
        &self,
        rule: &SeriesRule,
        trigger: Trigger,
        run_id: Uuid,
        now: DateTime<Utc>,
        window_from: i64,
        window_to: i64,
        state: &mut PassState,
    ) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::new(rule, run_id, trigger, window_from, window_to, now);

        let events = match self.epg_for_rule(rule, state).await {
            Ok(events) => events,
            Err(e) => {
                let stage = match &e {
                    ReceiverError::BadResponse { .. } => "epg_parse",
                    _ => "epg_fetch",
                };
                report.push_error(stage, e.to_string(), e.retryable());
                report.finish(
                    RunStatus::Failed,
                    self.clock.now_utc(),
                    started.elapsed().as_millis() as u64,
                );
                return report;
            }
        };

        // Window-filter before scan-counting; out-of-window events are
        // invisible to the scan cap.
        let mut in_window: Vec<&EpgEvent> = events
            .iter()
            .filter(|e| e.begin >= window_from && e.begin <= window_to)
            .collect();
        in_window.sort_by(|a, b| a.begin.cmp(&b.begin).then_with(|| a.id.cmp(&b.id)));

        let scan_cap = self.config.max_matches_scanned_per_rule;
        let mut matched: Vec<(&EpgEvent, Vec<String>)> = Vec::new();
        for event in in_window {
            if report.summary.epg_items_scanned >= scan_cap {
                report.summary.max_matches_scanned_per_rule_hit = true;
                break;
            }
            report.summary.epg_items_scanned += 1;

            let start_local = match DateTime::from_timestamp(event.begin, 0) {
                Some(utc) => utc.with_timezone(&Local),
                None => continue,
            };
            let outcome = matcher::matches(rule, &event.title, &event.service_ref, start_local);
            if outcome.matched {
                report.summary.epg_items_matched += 1;
                matched.push((event, outcome.reasons));
            }
        }
        matched.sort_by(|a, b| a.0.begin.cmp(&b.0.begin).then_with(|| a.0.id.cmp(&b.0.id)));

        let per_rule_cap = self.config.max_timers_per_rule;
        if matched.len() > per_rule_cap {
            report.summary.max_timers_per_rule_hit = true;
        }

        let pad_before = i64::from(self.config.pad_before_minutes) * 60;
        let pad_after = i64::from(self.config.pad_after_minutes) * 60;

        for (event, match_reasons) in matched.into_iter().take(per_rule_cap) {
            let t_begin = event.begin - pad_before;
            let t_end = event.end() + pad_after;

            if state.remaining_global == 0 {
                report.summary.max_timers_global_per_run_hit = true;
                report.summary.timers_skipped += 1;
                report.decisions.push(decision(
                    DecisionAction::Skipped,
                    "global_limit_hit",
                    event,
                    t_begin,
                    t_end,
                    None,
                    None,
                ));
                continue;
            }

            let key = (event.service_ref.clone(), t_begin, t_end);
            let begin_key = (event.service_ref.clone(), event.begin);
            if state.dedupe.contains(&key)
                || (self.config.dedupe_on_begin && state.begin_dedupe.contains(&begin_key))
            {
                report.summary.timers_skipped += 1;
                report.decisions.push(decision(
                    DecisionAction::Skipped,
                    "duplicate",
                    event,
                    t_begin,
                    t_end,
                    None,
                    None,
                ));
                continue;
            }

            // Overlap with a pre-existing timer is reported, not resolved;
            // the booking still goes ahead.
            if let Some(existing) = state.existing_timers.iter().find(|existing| {
                existing.service_ref == event.service_ref
                    && t_begin < existing.end
                    && existing.begin < t_end
            }) {
                report.conflicts.push(ReportConflict {
                    service_ref: event.service_ref.clone(),
                    event_id: Some(event.id),
                    candidate_begin: t_begin,
                    candidate_end: t_end,
                    existing_begin: existing.begin,
                    existing_end: existing.end,
                    existing_name: existing.name.clone(),
                });
                report.decisions.push(decision(
                    DecisionAction::Conflict,
                    "overlap_existing",
                    event,
                    t_begin,
                    t_end,
                    None,
                    None,
                ));
            }

            report.summary.timers_attempted += 1;
            match self
                .receiver
                .add_timer(
                    &event.service_ref,
                    t_begin,
                    t_end,
                    &event.title,
                    &event.short_description,
                )
                .await
            {
                Ok(()) => {
                    state.dedupe.insert(key);
                    if self.config.dedupe_on_begin {
                        state.begin_dedupe.insert(begin_key);
                    }
                    state.remaining_global -= 1;
                    report.summary.timers_created += 1;
                    report.decisions.push(decision(
                        DecisionAction::Created,
                        "match",
                        event,
                        t_begin,
                        t_end,
                        None,
                        Some(match_reasons),
                    ));
                }
                Err(ReceiverError::Conflict { .. }) => {
                    report.summary.timers_errored += 1;
                    report.decisions.push(decision(
                        DecisionAction::Conflict,
                        "receiver_conflict",
                        event,
                        t_begin,
                        t_end,
                        Some(false),
                        None,
                    ));
                }
                Err(e) => {
                    report.summary.timers_errored += 1;
                    report.push_error("timer_add", e.to_string(), true);
                    report.decisions.push(decision(
                        DecisionAction::Error,
                        "receiver_error",
                        event,
                        t_begin,
                        t_end,
                        Some(true),
                        None,
                    ));
                }
            }
        }

        let status = if report.summary.max_timers_global_per_run_hit
            || report.summary.timers_errored > 0
        {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };
        report.finish(
            status,
            self.clock.now_utc(),
            started.elapsed().as_millis() as u64,
        );
        report
    }

    /// EPG for a rule, fetched once per distinct channel (or bouquet-wide
    /// under the `"*"` key) and cached for the rest of the pass, including
    /// the failure outcome.
    async fn epg_for_rule(
        &self,
        rule: &SeriesRule,
        state: &mut PassState,
    ) -> Result<Vec<EpgEvent>, ReceiverError> {
        let key = if rule.channel_ref.is_empty() {
            "*".to_string()
        } else {
            rule.channel_ref.clone()
        };
        if let Some(cached) = state.epg_cache.get(&key) {
            return cached.clone();
        }

        let fetched = if rule.channel_ref.is_empty() {
            self.epg_all_bouquets().await
        } else {
            self.receiver
                .epg_for_service(&rule.channel_ref, self.config.horizon_days)
                .await
        };
        state.epg_cache.insert(key, fetched.clone());
        fetched
    }

    async fn epg_all_bouquets(&self) -> Result<Vec<EpgEvent>, ReceiverError> {
        let bouquets = self.receiver.bouquets().await?;
        let mut all = Vec::new();
        for bouquet in &bouquets {
            let mut events = self
                .receiver
                .epg_for_bouquet(&bouquet.service_ref, self.config.horizon_days)
                .await?;
            all.append(&mut events);
        }
        Ok(all)
    }

    /// Persist each report and write the rule's `last_run_*` fields back.
    /// Neither failure aborts the pass; the reports were already produced.
    fn finalize(&self, reports: &[RunReport]) {
        for report in reports {
            if let Err(e) = self.reports.persist(report) {
                warn!(rule_id = %report.rule_id, error = %e, "failed to persist run report");
            }
            if let Err(e) = self.rules.record_run_outcome(
                &report.rule_id,
                report.finished_at,
                report.status.as_str(),
                report.summary_line(),
            ) {
                warn!(rule_id = %report.rule_id, error = %e, "failed to record run outcome");
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn decision(
    action: DecisionAction,
    reason: &str,
    event: &EpgEvent,
    begin: i64,
    end: i64,
    retryable: Option<bool>,
    match_reasons: Option<Vec<String>>,
) -> Decision {
    Decision {
        action,
        reason: reason.to_string(),
        event_id: Some(event.id),
        title: Some(event.title.clone()),
        service_ref: Some(event.service_ref.clone()),
        begin: Some(begin),
        end: Some(end),
        retryable,
        match_reasons,
    }
}

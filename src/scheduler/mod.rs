//! Periodic, jittered, backoff-aware scheduler
//!
//! One long-lived task invokes the run engine at `base_interval`, doubling
//! up to `max_interval` while the receiver is unreachable or a pass errors,
//! and snapping back to `base_interval` on the next clean pass. Additive
//! jitter de-synchronises fleets of installations. The loop exits cleanly on
//! cancellation; an in-flight tick is honoured but not restarted.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::engine::RunEngine;
use crate::models::{RunReport, RunStatus, Trigger};
use crate::utils::jitter::signed_jitter_ms;

pub mod clock;

pub use clock::{Clock, TokioClock};

pub struct Scheduler {
    engine: Arc<RunEngine>,
    clock: Arc<dyn Clock>,
    base_interval: Duration,
    max_interval: Duration,
    jitter: Duration,
    startup_delay: Duration,
    current_interval: Mutex<Duration>,
}

impl Scheduler {
    pub fn new(engine: Arc<RunEngine>, config: &SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        let base_interval = config.base_interval_duration();
        Self {
            engine,
            clock,
            base_interval,
            max_interval: config.max_interval_duration(),
            jitter: config.jitter_duration(),
            startup_delay: config.startup_delay_duration(),
            current_interval: Mutex::new(base_interval),
        }
    }

    /// The interval the next tick will be scheduled at (before jitter).
    pub fn current_interval(&self) -> Duration {
        *self
            .current_interval
            .lock()
            .expect("scheduler interval lock poisoned")
    }

    fn increase_backoff(&self) -> Duration {
        let mut current = self
            .current_interval
            .lock()
            .expect("scheduler interval lock poisoned");
        *current = current.saturating_mul(2).min(self.max_interval);
        *current
    }

    fn reset_backoff(&self) {
        *self
            .current_interval
            .lock()
            .expect("scheduler interval lock poisoned") = self.base_interval;
    }

    fn jittered(&self, base: Duration) -> Duration {
        let jitter_ms = signed_jitter_ms(self.jitter.as_millis() as u64);
        let delayed = base.as_millis() as i64 + jitter_ms;
        Duration::from_millis(delayed.max(0) as u64)
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            base_interval = ?self.base_interval,
            max_interval = ?self.max_interval,
            "starting series scheduler"
        );

        let first = self.jittered(self.startup_delay);
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("scheduler cancelled before first tick");
                return;
            }
            _ = self.clock.sleep(first) => {}
        }

        loop {
            self.tick().await;

            if cancel.is_cancelled() {
                break;
            }
            let delay = self.jittered(self.current_interval());
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.clock.sleep(delay) => {}
            }
        }

        info!("scheduler stopped");
    }

    async fn tick(&self) {
        debug!("scheduler tick");
        match self.engine.clone().run_once(Trigger::Auto, None).await {
            Ok(reports) => {
                for report in &reports {
                    self.log_report(report);
                }
                let unreachable = reports.iter().any(|r| r.summary.receiver_unreachable);
                if unreachable {
                    let interval = self.increase_backoff();
                    warn!(next_interval = ?interval, "receiver unreachable, backing off");
                } else {
                    self.reset_backoff();
                }
            }
            Err(e) => {
                let interval = self.increase_backoff();
                error!(error = %e, next_interval = ?interval, "series pass failed");
            }
        }
    }

    fn log_report(&self, report: &RunReport) {
        let s = &report.summary;
        if report.had_activity() || report.status != RunStatus::Success {
            info!(
                rule_id = %report.rule_id,
                status = report.status.as_str(),
                created = s.timers_created,
                skipped = s.timers_skipped,
                errored = s.timers_errored,
                scanned = s.epg_items_scanned,
                matched = s.epg_items_matched,
                "series rule evaluated"
            );
        } else {
            debug!(
                rule_id = %report.rule_id,
                status = report.status.as_str(),
                scanned = s.epg_items_scanned,
                "series rule evaluated"
            );
        }
    }
}

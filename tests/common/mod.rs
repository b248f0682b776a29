//! Shared test fixtures: an in-memory receiver fake and a fixed clock.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use autorec::config::EngineConfig;
use autorec::engine::{ReportStore, RunEngine};
use autorec::errors::ReceiverError;
use autorec::models::{Bouquet, EpgEvent, SeriesRule, ServiceEntry, TimerEntry};
use autorec::receiver::ReceiverApi;
use autorec::rules::RuleStore;
use autorec::scheduler::Clock;

/// In-memory receiver. Created timers land in `timers` so a second pass
/// observes them, unless `record_adds` is disabled.
#[derive(Default)]
pub struct FakeReceiver {
    pub timers: std::sync::Mutex<Vec<TimerEntry>>,
    pub epg_by_service: HashMap<String, Vec<EpgEvent>>,
    pub bouquet_epg: Vec<EpgEvent>,
    /// Service refs whose EPG fetch fails
    pub fail_epg_for: Vec<String>,
    pub fail_timers: AtomicBool,
    pub fail_add: AtomicBool,
    pub record_adds: AtomicBool,
    pub timers_calls: AtomicU32,
    pub add_calls: AtomicU32,
    /// Artificial latency on timers(), to force overlap of concurrent runs
    pub timers_delay: Option<Duration>,
}

impl FakeReceiver {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.record_adds.store(true, Ordering::SeqCst);
        fake
    }

    pub fn with_service_epg(mut self, service_ref: &str, events: Vec<EpgEvent>) -> Self {
        self.epg_by_service.insert(service_ref.to_string(), events);
        self
    }

    pub fn with_timers(self, timers: Vec<TimerEntry>) -> Self {
        *self.timers.lock().unwrap() = timers;
        self
    }
}

#[async_trait]
impl ReceiverApi for FakeReceiver {
    async fn bouquets(&self) -> Result<Vec<Bouquet>, ReceiverError> {
        Ok(vec![Bouquet {
            service_ref: "1:7:1:0:0:0:0:0:0:0:FROM BOUQUET".to_string(),
            name: "All".to_string(),
        }])
    }

    async fn services(&self, _bouquet_ref: &str) -> Result<Vec<ServiceEntry>, ReceiverError> {
        Ok(self
            .epg_by_service
            .keys()
            .map(|service_ref| ServiceEntry {
                service_ref: service_ref.clone(),
                name: service_ref.clone(),
            })
            .collect())
    }

    async fn epg_for_service(
        &self,
        service_ref: &str,
        _days: u32,
    ) -> Result<Vec<EpgEvent>, ReceiverError> {
        if self.fail_epg_for.iter().any(|s| s == service_ref) {
            return Err(ReceiverError::Upstream {
                operation: "epg_service".to_string(),
                status: 500,
                snippet: "boom".to_string(),
            });
        }
        Ok(self
            .epg_by_service
            .get(service_ref)
            .cloned()
            .unwrap_or_default())
    }

    async fn epg_for_bouquet(
        &self,
        _bouquet_ref: &str,
        _days: u32,
    ) -> Result<Vec<EpgEvent>, ReceiverError> {
        Ok(self.bouquet_epg.clone())
    }

    async fn timers(&self) -> Result<Vec<TimerEntry>, ReceiverError> {
        self.timers_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.timers_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_timers.load(Ordering::SeqCst) {
            return Err(ReceiverError::Timeout {
                operation: "timers".to_string(),
                attempts: 4,
            });
        }
        Ok(self.timers.lock().unwrap().clone())
    }

    async fn add_timer(
        &self,
        service_ref: &str,
        begin: i64,
        end: i64,
        name: &str,
        _description: &str,
    ) -> Result<(), ReceiverError> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(ReceiverError::Upstream {
                operation: "timer_add".to_string(),
                status: 500,
                snippet: "boom".to_string(),
            });
        }
        if self.record_adds.load(Ordering::SeqCst) {
            self.timers.lock().unwrap().push(TimerEntry {
                service_ref: service_ref.to_string(),
                name: name.to_string(),
                begin,
                end,
                state: Some(0),
                disabled: Some(0),
            });
        }
        Ok(())
    }

    async fn delete_timer(
        &self,
        service_ref: &str,
        begin: i64,
        end: i64,
    ) -> Result<(), ReceiverError> {
        self.timers
            .lock()
            .unwrap()
            .retain(|t| !(t.service_ref == service_ref && t.begin == begin && t.end == end));
        Ok(())
    }

    fn stream_url(&self, service_ref: &str, _name: &str) -> String {
        format!("http://fake:8001/{service_ref}")
    }
}

/// Clock with a pinned `now`; sleeps still go through tokio so paused-time
/// tests can drive them.
pub struct FixedClock {
    pub now: DateTime<Utc>,
}

#[async_trait]
impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.now
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub struct TestEnv {
    pub engine: Arc<RunEngine>,
    pub receiver: Arc<FakeReceiver>,
    pub rules: Arc<RuleStore>,
    pub dir: TempDir,
}

pub fn engine_env(
    receiver: FakeReceiver,
    rules: Vec<SeriesRule>,
    config: EngineConfig,
    now: DateTime<Utc>,
) -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RuleStore::load(dir.path()).unwrap());
    for rule in rules {
        store.add(rule).unwrap();
    }

    let receiver = Arc::new(receiver);
    let engine = Arc::new(RunEngine::new(
        store.clone(),
        receiver.clone(),
        Arc::new(ReportStore::new(dir.path())),
        config,
        Arc::new(FixedClock { now }),
    ));

    TestEnv {
        engine,
        receiver,
        rules: store,
        dir,
    }
}

pub fn rule(id: &str) -> SeriesRule {
    serde_json::from_str(&format!(r#"{{"id": "{id}"}}"#)).unwrap()
}

pub fn event(id: u64, title: &str, service_ref: &str, begin: i64, duration: i64) -> EpgEvent {
    EpgEvent {
        id,
        title: title.to_string(),
        short_description: format!("{title} description"),
        long_description: String::new(),
        begin,
        duration,
        service_ref: service_ref.to_string(),
    }
}

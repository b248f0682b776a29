//! Clock capability for the scheduler and engine
//!
//! The single seam through which wall-clock time enters the system: the
//! scheduler sleeps through it and the engine reads its pass `now` from it.
//! Tests swap in a fixed clock; production uses tokio's timer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by the tokio timer (which also honours paused
/// time under `tokio::test(start_paused)`).
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

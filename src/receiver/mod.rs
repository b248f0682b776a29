//! Upstream receiver access
//!
//! `ReceiverApi` is the seam between the run engine and the actual
//! set-top box: the engine only ever talks to this trait, which the HTTP
//! client implements and tests replace with an in-memory fake.

use async_trait::async_trait;

use crate::errors::ReceiverError;
use crate::models::{Bouquet, EpgEvent, ServiceEntry, TimerEntry};

pub mod client;
pub mod decode;
pub mod rate_limit;

pub use client::ReceiverClient;
pub use decode::ServicesShape;
pub use rate_limit::RateLimiter;

#[async_trait]
pub trait ReceiverApi: Send + Sync {
    async fn bouquets(&self) -> Result<Vec<Bouquet>, ReceiverError>;

    async fn services(&self, bouquet_ref: &str) -> Result<Vec<ServiceEntry>, ReceiverError>;

    /// EPG for one service. `days` is advisory; callers window-filter by
    /// event begin regardless of how much the receiver returns.
    async fn epg_for_service(
        &self,
        service_ref: &str,
        days: u32,
    ) -> Result<Vec<EpgEvent>, ReceiverError>;

    async fn epg_for_bouquet(
        &self,
        bouquet_ref: &str,
        days: u32,
    ) -> Result<Vec<EpgEvent>, ReceiverError>;

    async fn timers(&self) -> Result<Vec<TimerEntry>, ReceiverError>;

    async fn add_timer(
        &self,
        service_ref: &str,
        begin: i64,
        end: i64,
        name: &str,
        description: &str,
    ) -> Result<(), ReceiverError>;

    async fn delete_timer(
        &self,
        service_ref: &str,
        begin: i64,
        end: i64,
    ) -> Result<(), ReceiverError>;

    /// Playable stream URL for a service; never touches the network.
    fn stream_url(&self, service_ref: &str, name: &str) -> String;
}

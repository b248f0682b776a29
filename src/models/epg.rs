//! Receiver-side entities: bouquets, services, EPG events, timers

use serde::{Deserialize, Serialize};

/// An upstream grouping of services; its reference carries the `1:7:` prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bouquet {
    pub service_ref: String,
    pub name: String,
}

/// A single channel inside a bouquet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub service_ref: String,
    pub name: String,
}

/// One programme from the receiver's EPG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpgEvent {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub long_description: String,
    /// Absolute start, seconds since epoch (UTC)
    pub begin: i64,
    /// Duration in seconds
    pub duration: i64,
    pub service_ref: String,
}

impl EpgEvent {
    pub fn end(&self) -> i64 {
        self.begin + self.duration
    }
}

/// A recording booking on the receiver.
///
/// Upstream state beyond the dedupe key `(service_ref, begin, end)` is
/// carried opaquely and never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerEntry {
    pub service_ref: String,
    pub name: String,
    pub begin: i64,
    pub end: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<i64>,
}

impl TimerEntry {
    pub fn dedupe_key(&self) -> (String, i64, i64) {
        (self.service_ref.clone(), self.begin, self.end)
    }
}

/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Receiver defaults
pub const DEFAULT_RECEIVER_BASE_URL: &str = "http://127.0.0.1";
pub const DEFAULT_RECEIVER_TIMEOUT: &str = "10s";
pub const DEFAULT_RESPONSE_HEADER_TIMEOUT: &str = "5s";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF: &str = "500ms";
pub const DEFAULT_MAX_BACKOFF: &str = "5s";
pub const DEFAULT_MAX_IDLE_CONNS_PER_HOST: usize = 8;
pub const DEFAULT_IDLE_TIMEOUT: &str = "90s";
pub const DEFAULT_RECEIVER_RATE_LIMIT: f64 = 5.0;
pub const DEFAULT_RECEIVER_BURST: u32 = 5;
pub const DEFAULT_STREAM_PORT: u16 = 8001;

/// Hard ceiling for the per-attempt deadline
pub const MAX_RECEIVER_TIMEOUT_SECS: u64 = 60;
/// Hard ceiling for additional attempts after the first
pub const MAX_MAX_RETRIES: u32 = 10;

// Engine defaults
pub const DEFAULT_HORIZON_DAYS: u32 = 7;
/// The scanning window starts this far in the past so a running programme
/// can still be booked
pub const LOOKBACK_SECS: i64 = 2 * 3600;
pub const DEFAULT_MAX_TIMERS_PER_RULE: usize = 25;
pub const DEFAULT_MAX_MATCHES_SCANNED_PER_RULE: u64 = 500;
pub const DEFAULT_MAX_TIMERS_GLOBAL_PER_RUN: u64 = 100;

// Scheduler defaults
pub const DEFAULT_BASE_INTERVAL: &str = "10m";
pub const DEFAULT_MAX_INTERVAL: &str = "60m";
pub const DEFAULT_JITTER: &str = "60s";
pub const DEFAULT_STARTUP_DELAY: &str = "10s";

// Circuit breaker defaults
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_RESET_TIMEOUT: &str = "60s";
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 1;

// Storage defaults
pub const DEFAULT_DATA_DIR: &str = "./data";

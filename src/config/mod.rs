use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

pub mod defaults;

use defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub receiver: ReceiverConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub circuitbreaker: CircuitBreakerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Transport and endpoint configuration for the upstream receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,

    /// Per-attempt deadline covering headers and body; clamped to 60s
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Sub-deadline for response headers only
    #[serde(default = "default_response_header_timeout")]
    pub response_header_timeout: String,
    /// Additional attempts after the first; clamped to 10
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Exponential backoff base for inter-attempt sleeps
    #[serde(default = "default_backoff")]
    pub backoff: String,
    #[serde(default = "default_max_backoff")]
    pub max_backoff: String,

    #[serde(default = "default_max_idle_conns_per_host")]
    pub max_idle_conns_per_host: usize,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: String,
    #[serde(default)]
    pub enable_http2: bool,

    /// Token-bucket refill rate against the receiver host, tokens/second;
    /// 0 disables rate limiting
    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,
    #[serde(default = "default_burst")]
    pub burst: u32,

    #[serde(default = "default_stream_port")]
    pub stream_port: u16,
    /// Build stream URLs through the WebIF m3u endpoint instead of the
    /// direct MPEG-TS port
    #[serde(default)]
    pub use_webif_streams: bool,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            username: String::new(),
            password: String::new(),
            timeout: default_timeout(),
            response_header_timeout: default_response_header_timeout(),
            max_retries: default_max_retries(),
            backoff: default_backoff(),
            max_backoff: default_max_backoff(),
            max_idle_conns_per_host: default_max_idle_conns_per_host(),
            idle_timeout: default_idle_timeout(),
            enable_http2: false,
            rate_limit: default_rate_limit(),
            burst: default_burst(),
            stream_port: default_stream_port(),
            use_webif_streams: false,
        }
    }
}

impl ReceiverConfig {
    pub fn timeout_duration(&self) -> Duration {
        let d = parse_duration_or(&self.timeout, "receiver.timeout", DEFAULT_RECEIVER_TIMEOUT);
        d.min(Duration::from_secs(MAX_RECEIVER_TIMEOUT_SECS))
    }

    pub fn response_header_timeout_duration(&self) -> Duration {
        parse_duration_or(
            &self.response_header_timeout,
            "receiver.response_header_timeout",
            DEFAULT_RESPONSE_HEADER_TIMEOUT,
        )
    }

    pub fn effective_max_retries(&self) -> u32 {
        self.max_retries.min(MAX_MAX_RETRIES)
    }

    pub fn backoff_duration(&self) -> Duration {
        parse_duration_or(&self.backoff, "receiver.backoff", DEFAULT_BACKOFF)
    }

    pub fn max_backoff_duration(&self) -> Duration {
        parse_duration_or(&self.max_backoff, "receiver.max_backoff", DEFAULT_MAX_BACKOFF)
    }

    pub fn idle_timeout_duration(&self) -> Duration {
        parse_duration_or(&self.idle_timeout, "receiver.idle_timeout", DEFAULT_IDLE_TIMEOUT)
    }
}

/// Guardrails and padding for the run engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How many days of EPG ahead of now are scanned
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    /// Minutes of recording lead-in before the programme start
    #[serde(default)]
    pub pad_before_minutes: u32,
    /// Minutes of recording tail after the programme end
    #[serde(default)]
    pub pad_after_minutes: u32,
    #[serde(default = "default_max_timers_per_rule")]
    pub max_timers_per_rule: usize,
    #[serde(default = "default_max_matches_scanned_per_rule")]
    pub max_matches_scanned_per_rule: u64,
    #[serde(default = "default_max_timers_global_per_run")]
    pub max_timers_global_per_run: u64,
    /// Additionally dedupe on `(service_ref, begin)` so timers the receiver
    /// itself padded are still recognised
    #[serde(default)]
    pub dedupe_on_begin: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            pad_before_minutes: 0,
            pad_after_minutes: 0,
            max_timers_per_rule: default_max_timers_per_rule(),
            max_matches_scanned_per_rule: default_max_matches_scanned_per_rule(),
            max_timers_global_per_run: default_max_timers_global_per_run(),
            dedupe_on_begin: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_base_interval")]
    pub base_interval: String,
    #[serde(default = "default_max_interval")]
    pub max_interval: String,
    /// Additive jitter applied to every tick, drawn from [-jitter, +jitter]
    #[serde(default = "default_jitter")]
    pub jitter: String,
    #[serde(default = "default_startup_delay")]
    pub startup_delay: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_interval: default_base_interval(),
            max_interval: default_max_interval(),
            jitter: default_jitter(),
            startup_delay: default_startup_delay(),
        }
    }
}

impl SchedulerConfig {
    pub fn base_interval_duration(&self) -> Duration {
        parse_duration_or(&self.base_interval, "scheduler.base_interval", DEFAULT_BASE_INTERVAL)
    }

    pub fn max_interval_duration(&self) -> Duration {
        parse_duration_or(&self.max_interval, "scheduler.max_interval", DEFAULT_MAX_INTERVAL)
    }

    pub fn jitter_duration(&self) -> Duration {
        parse_duration_or(&self.jitter, "scheduler.jitter", DEFAULT_JITTER)
    }

    pub fn startup_delay_duration(&self) -> Duration {
        parse_duration_or(&self.startup_delay, "scheduler.startup_delay", DEFAULT_STARTUP_DELAY)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout: String,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout: default_reset_timeout(),
            success_threshold: default_success_threshold(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn reset_timeout_duration(&self) -> Duration {
        parse_duration_or(&self.reset_timeout, "circuitbreaker.reset_timeout", DEFAULT_RESET_TIMEOUT)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for `series_rules.json` and `series_reports/`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

// Serde default hooks

fn default_base_url() -> String {
    DEFAULT_RECEIVER_BASE_URL.to_string()
}
fn default_timeout() -> String {
    DEFAULT_RECEIVER_TIMEOUT.to_string()
}
fn default_response_header_timeout() -> String {
    DEFAULT_RESPONSE_HEADER_TIMEOUT.to_string()
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_backoff() -> String {
    DEFAULT_BACKOFF.to_string()
}
fn default_max_backoff() -> String {
    DEFAULT_MAX_BACKOFF.to_string()
}
fn default_max_idle_conns_per_host() -> usize {
    DEFAULT_MAX_IDLE_CONNS_PER_HOST
}
fn default_idle_timeout() -> String {
    DEFAULT_IDLE_TIMEOUT.to_string()
}
fn default_rate_limit() -> f64 {
    DEFAULT_RECEIVER_RATE_LIMIT
}
fn default_burst() -> u32 {
    DEFAULT_RECEIVER_BURST
}
fn default_stream_port() -> u16 {
    DEFAULT_STREAM_PORT
}
fn default_horizon_days() -> u32 {
    DEFAULT_HORIZON_DAYS
}
fn default_max_timers_per_rule() -> usize {
    DEFAULT_MAX_TIMERS_PER_RULE
}
fn default_max_matches_scanned_per_rule() -> u64 {
    DEFAULT_MAX_MATCHES_SCANNED_PER_RULE
}
fn default_max_timers_global_per_run() -> u64 {
    DEFAULT_MAX_TIMERS_GLOBAL_PER_RUN
}
fn default_base_interval() -> String {
    DEFAULT_BASE_INTERVAL.to_string()
}
fn default_max_interval() -> String {
    DEFAULT_MAX_INTERVAL.to_string()
}
fn default_jitter() -> String {
    DEFAULT_JITTER.to_string()
}
fn default_startup_delay() -> String {
    DEFAULT_STARTUP_DELAY.to_string()
}
fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}
fn default_reset_timeout() -> String {
    DEFAULT_RESET_TIMEOUT.to_string()
}
fn default_success_threshold() -> u32 {
    DEFAULT_SUCCESS_THRESHOLD
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn parse_duration_or(raw: &str, field: &str, fallback: &str) -> Duration {
    match humantime::parse_duration(raw) {
        Ok(d) => d,
        Err(e) => {
            warn!("invalid duration '{raw}' for {field}: {e}, using {fallback}");
            humantime::parse_duration(fallback).unwrap_or(Duration::from_secs(10))
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let mut config: Config = if std::path::Path::new(config_file).exists() {
            Figment::new()
                .merge(Toml::file(config_file))
                .merge(Env::prefixed("AUTOREC_").split("__"))
                .extract()?
        } else {
            warn!("config file '{config_file}' not found, using default configuration values");
            Figment::new()
                .merge(figment::providers::Serialized::defaults(Config::default()))
                .merge(Env::prefixed("AUTOREC_").split("__"))
                .extract()?
        };

        config.apply_legacy_env_overrides();
        Ok(config)
    }

    /// Boundary environment variables shared with the wider deployment;
    /// these override whatever the config file says.
    fn apply_legacy_env_overrides(&mut self) {
        if let Some(v) = env_parse::<usize>("HTTP_MAX_IDLE_CONNS_PER_HOST")
            .or_else(|| env_parse::<usize>("HTTP_MAX_IDLE_CONNS"))
        {
            self.receiver.max_idle_conns_per_host = v;
        }
        if let Ok(v) = std::env::var("HTTP_IDLE_TIMEOUT") {
            self.receiver.idle_timeout = v;
        }
        if let Some(v) = env_parse::<bool>("HTTP_ENABLE_HTTP2") {
            self.receiver.enable_http2 = v;
        }
        if std::env::var("HTTP_MAX_CONNS_PER_HOST").is_ok() {
            // Accepted for compatibility; reqwest's pool has no such knob.
            debug!("HTTP_MAX_CONNS_PER_HOST is set but not supported, ignoring");
        }
        if let Some(v) = env_parse::<u16>("STREAM_PORT") {
            self.receiver.stream_port = v;
        }
        if let Some(v) = env_parse::<bool>("USE_WEBIF_STREAMS") {
            self.receiver.use_webif_streams = v;
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

//! Utility modules for the autorec engine
//!
//! This module contains reusable utilities that can be used
//! across different parts of the system.

pub mod atomic_file;
pub mod circuit_breaker;
pub mod encoding;
pub mod jitter;
pub mod redact;
pub mod singleflight;
pub mod time;

// Re-export commonly used types for convenience
pub use atomic_file::write_atomic;
pub use circuit_breaker::{BreakerConfig, BreakerError, BreakerState, CircuitBreaker};
pub use encoding::decode_body;
pub use redact::{redact, snippet};
pub use singleflight::SingleFlight;
pub use time::{StartWindow, minute_of_day, weekday_sunday0};

//! Error handling for the autorec engine
//!
//! Re-exports the concrete error types so callers can use
//! `crate::errors::ReceiverError` directly.

mod types;

pub use types::{AppError, EngineError, ReceiverError, StoreError};

/// Convenience alias used at application boundaries
pub type AppResult<T> = Result<T, AppError>;

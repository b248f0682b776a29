//! Error type definitions for the autorec engine
//!
//! This module defines all error types used throughout the application,
//! providing a hierarchical error system that makes debugging and error
//! handling more straightforward.

use thiserror::Error;

/// Errors surfaced by the receiver client.
///
/// This is a closed taxonomy: every upstream outcome is classified into one
/// of these variants so that callers (retry loop, circuit breaker accounting,
/// report classification) can pattern-match instead of comparing strings.
/// Body snippets are redacted before they are stored here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiverError {
    /// The receiver answered 404 for this resource
    #[error("{operation}: not found on receiver")]
    NotFound { operation: String },

    /// The receiver rejected our credentials (401/403)
    #[error("{operation}: forbidden by receiver")]
    Forbidden { operation: String },

    /// The per-attempt deadline elapsed, or the transport reported a timeout
    #[error("{operation}: timed out after {attempts} attempt(s)")]
    Timeout { operation: String, attempts: u32 },

    /// Network-level failure or receiver shedding load (connect errors, 429)
    #[error("{operation}: receiver unavailable: {message}")]
    Unavailable { operation: String, message: String },

    /// The receiver answered with a 5xx status
    #[error("{operation}: upstream error (HTTP {status}): {snippet}")]
    Upstream {
        operation: String,
        status: u16,
        snippet: String,
    },

    /// The receiver answered, but the body could not be decoded
    #[error("{operation}: bad response: {message}")]
    BadResponse { operation: String, message: String },

    /// The receiver refused a timer because it clashes with an existing one
    #[error("{operation}: timer conflict: {message}")]
    Conflict { operation: String, message: String },

    /// The circuit breaker is open; the call never reached the receiver
    #[error("{operation}: circuit open")]
    CircuitOpen { operation: String },
}

impl ReceiverError {
    /// Classification label used for the failure counter and the per-attempt
    /// duration histogram (`ok | timeout | network | http_4xx | http_5xx | error`).
    pub fn class(&self) -> &'static str {
        match self {
            ReceiverError::Timeout { .. } => "timeout",
            ReceiverError::Unavailable { .. } => "network",
            ReceiverError::NotFound { .. }
            | ReceiverError::Forbidden { .. }
            | ReceiverError::Conflict { .. } => "http_4xx",
            ReceiverError::Upstream { .. } => "http_5xx",
            ReceiverError::BadResponse { .. } | ReceiverError::CircuitOpen { .. } => "error",
        }
    }

    /// Whether the retry loop may try this operation again.
    ///
    /// Timeouts, network errors and 5xx/429 answers are transient; everything
    /// else (4xx, decode failures, conflicts, open circuit) is not.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ReceiverError::Timeout { .. }
                | ReceiverError::Unavailable { .. }
                | ReceiverError::Upstream { .. }
        )
    }

    pub fn operation(&self) -> &str {
        match self {
            ReceiverError::NotFound { operation }
            | ReceiverError::Forbidden { operation }
            | ReceiverError::Timeout { operation, .. }
            | ReceiverError::Unavailable { operation, .. }
            | ReceiverError::Upstream { operation, .. }
            | ReceiverError::BadResponse { operation, .. }
            | ReceiverError::Conflict { operation, .. }
            | ReceiverError::CircuitOpen { operation } => operation,
        }
    }
}

/// Rule / report persistence errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("rule not found: {0}")]
    NotFound(String),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run orchestration errors.
///
/// Cloneable so that a single-flight leader can hand the same error to every
/// coalesced waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("rule not found: {0}")]
    RuleNotFound(String),

    #[error("run aborted: {0}")]
    Aborted(String),
}

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("receiver error: {0}")]
    Receiver(#[from] ReceiverError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

//! Circuit breaker guarding the receiver client
//!
//! Tri-state machine: `closed` admits calls and counts consecutive failures;
//! at the threshold it opens. While `open`, calls are rejected immediately
//! without touching the receiver. After `reset_timeout` the next call is
//! admitted as a half-open probe; its success closes the circuit, its
//! failure re-opens it.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    /// Gauge encoding: 0 closed, 1 half-open, 2 open.
    pub fn as_gauge(&self) -> u64 {
        match self {
            BreakerState::Closed => 0,
            BreakerState::HalfOpen => 1,
            BreakerState::Open => 2,
        }
    }
}

/// Outcome of an admission attempt.
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The circuit is open; the operation was never invoked
    CircuitOpen,
    /// The operation ran and failed
    Inner(E),
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a probe
    pub reset_timeout: Duration,
    /// Successes required in half-open before closing
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            success_threshold: 1,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    total_calls: u64,
    failed_calls: u64,
}

impl Default for BreakerInner {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            total_calls: 0,
            failed_calls: 0,
        }
    }
}

/// Read-only view of the breaker for observers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BreakerStats {
    pub state: BreakerState,
    pub failure_count: u32,
    pub total_calls: u64,
    pub failed_calls: u64,
}

type TransitionHook = Arc<dyn Fn(BreakerState) + Send + Sync>;

pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: RwLock<BreakerInner>,
    on_transition: Option<TransitionHook>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(BreakerInner::default()),
            on_transition: None,
        }
    }

    /// Install a hook fired with the new state on every transition.
    /// The receiver client uses this to publish the state gauge.
    pub fn with_transition_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(BreakerState) + Send + Sync + 'static,
    {
        self.on_transition = Some(Arc::new(hook));
        self
    }

    /// Execute `op` if the circuit admits it.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.admit().await {
            debug!("circuit breaker open, rejecting call");
            return Err(BreakerError::CircuitOpen);
        }

        match op().await {
            Ok(value) => {
                self.record(true).await;
                Ok(value)
            }
            Err(error) => {
                self.record(false).await;
                Err(BreakerError::Inner(error))
            }
        }
    }

    /// Whether a call may proceed, transitioning open -> half-open when the
    /// reset timeout has elapsed since the last failure.
    async fn admit(&self) -> bool {
        let mut inner = self.inner.write().await;
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = inner.last_failure.map(|at| at.elapsed());
                if elapsed.is_some_and(|e| e >= self.config.reset_timeout) {
                    info!("circuit breaker transitioning from open to half-open");
                    inner.state = BreakerState::HalfOpen;
                    inner.success_count = 0;
                    self.fire_transition(BreakerState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    async fn record(&self, success: bool) {
        let mut inner = self.inner.write().await;
        inner.total_calls += 1;

        if success {
            inner.failure_count = 0;
            inner.success_count += 1;
            if inner.state == BreakerState::HalfOpen
                && inner.success_count >= self.config.success_threshold
            {
                info!("circuit breaker closing after successful probe");
                inner.state = BreakerState::Closed;
                inner.success_count = 0;
                self.fire_transition(BreakerState::Closed);
            }
        } else {
            inner.failed_calls += 1;
            inner.success_count = 0;
            inner.failure_count += 1;
            inner.last_failure = Some(Instant::now());

            let should_open = match inner.state {
                BreakerState::HalfOpen => true,
                BreakerState::Closed => inner.failure_count >= self.config.failure_threshold,
                BreakerState::Open => false,
            };
            if should_open {
                warn!(
                    failures = inner.failure_count,
                    "circuit breaker opening after consecutive failures"
                );
                inner.state = BreakerState::Open;
                self.fire_transition(BreakerState::Open);
            }
        }
    }

    fn fire_transition(&self, state: BreakerState) {
        if let Some(hook) = &self.on_transition {
            hook(state);
        }
    }

    pub async fn state(&self) -> BreakerState {
        self.inner.read().await.state
    }

    pub async fn stats(&self) -> BreakerStats {
        let inner = self.inner.read().await;
        BreakerStats {
            state: inner.state,
            failure_count: inner.failure_count,
            total_calls: inner.total_calls,
            failed_calls: inner.failed_calls,
        }
    }

    /// Force the circuit open (for tests).
    pub async fn force_open(&self) {
        let mut inner = self.inner.write().await;
        inner.state = BreakerState::Open;
        inner.last_failure = Some(Instant::now());
        self.fire_transition(BreakerState::Open);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(threshold: u32, reset: Duration) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: threshold,
            reset_timeout: reset,
            success_threshold: 1,
        }
    }

    async fn fail(cb: &CircuitBreaker) {
        let _ = cb
            .execute::<(), &str, _, _>(|| async { Err("boom") })
            .await;
    }

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let cb = CircuitBreaker::new(config(3, Duration::from_secs(60)));

        for _ in 0..2 {
            fail(&cb).await;
        }
        assert_eq!(cb.state().await, BreakerState::Closed);

        fail(&cb).await;
        assert_eq!(cb.state().await, BreakerState::Open);
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_invoking() {
        let cb = CircuitBreaker::new(config(1, Duration::from_secs(60)));
        fail(&cb).await;

        let invoked = AtomicU32::new(0);
        let result = cb
            .execute::<(), &str, _, _>(|| {
                invoked.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(BreakerError::CircuitOpen)));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_probe_closes_on_success() {
        let cb = CircuitBreaker::new(config(1, Duration::from_secs(30)));
        fail(&cb).await;
        assert_eq!(cb.state().await, BreakerState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;

        let result = cb.execute::<u32, &str, _, _>(|| async { Ok(7) }).await;
        assert!(matches!(result, Ok(7)));
        assert_eq!(cb.state().await, BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_probe_reopens_on_failure() {
        let cb = CircuitBreaker::new(config(1, Duration::from_secs(30)));
        fail(&cb).await;
        tokio::time::advance(Duration::from_secs(31)).await;

        fail(&cb).await;
        assert_eq!(cb.state().await, BreakerState::Open);
    }

    #[tokio::test]
    async fn success_resets_failure_counter() {
        let cb = CircuitBreaker::new(config(3, Duration::from_secs(60)));
        fail(&cb).await;
        fail(&cb).await;
        let _ = cb.execute::<(), &str, _, _>(|| async { Ok(()) }).await;
        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn transition_hook_fires() {
        let transitions = Arc::new(AtomicU32::new(0));
        let seen = transitions.clone();
        let cb = CircuitBreaker::new(config(1, Duration::from_secs(60)))
            .with_transition_hook(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        fail(&cb).await;
        assert_eq!(transitions.load(Ordering::SeqCst), 1);
    }
}

use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Gauge, Histogram, Meter, MeterProvider},
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use tracing::info;

/// Main observability interface providing the engine's metric instruments.
///
/// Metrics are registered on an SDK meter provider installed globally;
/// deployments attach an exporter out of process. Instruments are pre-built
/// here so call sites stay allocation-free on the hot path.
#[derive(Clone)]
pub struct AppObservability {
    pub meter: Meter,

    /// Per-attempt request duration (operation, status, attempt)
    pub request_duration: Histogram<f64>,
    /// Retries performed beyond the first attempt (operation)
    pub request_retries: Counter<u64>,
    /// Failed attempts (operation, error_class)
    pub request_failures: Counter<u64>,
    /// Successful operations (operation)
    pub request_success: Counter<u64>,
    /// Circuit breaker state: 0 closed, 1 half-open, 2 open
    pub circuit_state: Gauge<u64>,
    /// Timer create/delete outcomes (result, reason)
    pub timer_updates: Counter<u64>,
}

impl AppObservability {
    /// Install a global meter provider and build the instrument set.
    pub fn new() -> Self {
        let provider = SdkMeterProvider::builder().build();
        global::set_meter_provider(provider.clone());
        let meter = provider.meter("autorec");
        info!("metrics meter provider installed");
        Self::with_meter(meter)
    }

    fn with_meter(meter: Meter) -> Self {
        let request_duration = meter
            .f64_histogram("receiver_request_duration_seconds")
            .with_description("Duration of receiver HTTP attempts")
            .build();
        let request_retries = meter
            .u64_counter("receiver_retries_total")
            .with_description("Retries performed against the receiver")
            .build();
        let request_failures = meter
            .u64_counter("receiver_failures_total")
            .with_description("Failed receiver attempts by error class")
            .build();
        let request_success = meter
            .u64_counter("receiver_success_total")
            .with_description("Successful receiver operations")
            .build();
        let circuit_state = meter
            .u64_gauge("circuit_breaker_state")
            .with_description("Receiver circuit breaker state (0 closed, 1 half-open, 2 open)")
            .build();
        let timer_updates = meter
            .u64_counter("timer_update_outcome_total")
            .with_description("Timer create/delete outcomes on the receiver")
            .build();

        Self {
            meter,
            request_duration,
            request_retries,
            request_failures,
            request_success,
            circuit_state,
            timer_updates,
        }
    }

    pub fn record_attempt(&self, operation: &'static str, status: &'static str, attempt: u32, seconds: f64) {
        self.request_duration.record(
            seconds,
            &[
                KeyValue::new("operation", operation),
                KeyValue::new("status", status),
                KeyValue::new("attempt", attempt as i64),
            ],
        );
    }

    pub fn record_timer_update(&self, result: &'static str, reason: &'static str) {
        self.timer_updates.add(
            1,
            &[
                KeyValue::new("result", result),
                KeyValue::new("reason", reason),
            ],
        );
    }
}

impl Default for AppObservability {
    fn default() -> Self {
        Self::new()
    }
}

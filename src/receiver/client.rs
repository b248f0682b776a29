//! HTTP client for the receiver's OpenWebif-style API
//!
//! Single point of contact with the set-top box. One connection-pooled
//! reqwest client per process; every call flows through the shared rate
//! limiter and the circuit breaker, then a retry loop with exponential
//! backoff. Transient failures (timeouts, network errors, 429/5xx) are
//! retried; everything else surfaces immediately as a classified
//! `ReceiverError`.

use async_trait::async_trait;
use opentelemetry::KeyValue;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::config::ReceiverConfig;
use crate::errors::{AppError, ReceiverError};
use crate::models::{Bouquet, EpgEvent, ServiceEntry, TimerEntry};
use crate::observability::AppObservability;
use crate::utils::circuit_breaker::{BreakerError, CircuitBreaker};
use crate::utils::encoding::decode_body;
use crate::utils::redact::{redact, snippet};

use super::ReceiverApi;
use super::decode::{
    self, ServicesShape, decode_bouquets, decode_epg, decode_timer_result, decode_timers,
};
use super::rate_limit::RateLimiter;

const BODY_SNIPPET_LEN: usize = 200;

pub struct ReceiverClient {
    http: reqwest::Client,
    base: Url,
    config: ReceiverConfig,
    breaker: Arc<CircuitBreaker>,
    limiter: RateLimiter,
    metrics: Arc<AppObservability>,
    cancel: CancellationToken,
    services_shape: RwLock<Option<ServicesShape>>,
}

impl ReceiverClient {
    pub fn new(
        config: ReceiverConfig,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<AppObservability>,
        cancel: CancellationToken,
    ) -> Result<Self, AppError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| AppError::configuration(format!("invalid receiver.base_url: {e}")))?;

        // reqwest has no header-only deadline; read_timeout is the closest
        // bound on time-to-first-byte.
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout_duration())
            .connect_timeout(config.response_header_timeout_duration())
            .read_timeout(config.response_header_timeout_duration())
            .pool_max_idle_per_host(config.max_idle_conns_per_host)
            .pool_idle_timeout(config.idle_timeout_duration())
            .user_agent(concat!("autorec/", env!("CARGO_PKG_VERSION")));
        if !config.enable_http2 {
            builder = builder.http1_only();
        }
        let http = builder.build().expect("failed to create HTTP client");

        let limiter = RateLimiter::new(config.rate_limit, config.burst);

        Ok(Self {
            http,
            base,
            config,
            breaker,
            limiter,
            metrics,
            cancel,
            services_shape: RwLock::new(None),
        })
    }

    /// One breaker-gated, retried GET returning the decoded body text.
    async fn fetch(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<String, ReceiverError> {
        let result = self
            .breaker
            .execute(|| self.fetch_with_retry(operation, path, query))
            .await;

        match result {
            Ok(body) => {
                self.metrics
                    .request_success
                    .add(1, &[KeyValue::new("operation", operation)]);
                Ok(body)
            }
            Err(BreakerError::CircuitOpen) => Err(ReceiverError::CircuitOpen {
                operation: operation.to_string(),
            }),
            Err(BreakerError::Inner(e)) => Err(e),
        }
    }

    async fn fetch_with_retry(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<String, ReceiverError> {
        let max_attempts = self.config.effective_max_retries() + 1;
        let base_backoff = self.config.backoff_duration();
        let max_backoff = self.config.max_backoff_duration();

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            self.limiter
                .acquire(&self.cancel)
                .await
                .map_err(|_| ReceiverError::Timeout {
                    operation: operation.to_string(),
                    attempts: attempt,
                })?;

            let started = Instant::now();
            let outcome = self.attempt(operation, path, query).await;
            let status = match &outcome {
                Ok(_) => "ok",
                Err(e) => e.class(),
            };
            self.metrics
                .record_attempt(operation, status, attempt, started.elapsed().as_secs_f64());

            match outcome {
                Ok(body) => return Ok(body),
                Err(e) => {
                    self.metrics.request_failures.add(
                        1,
                        &[
                            KeyValue::new("operation", operation),
                            KeyValue::new("error_class", e.class()),
                        ],
                    );

                    if !e.retryable() || attempt >= max_attempts {
                        return Err(match e {
                            ReceiverError::Timeout { operation, .. } => ReceiverError::Timeout {
                                operation,
                                attempts: attempt,
                            },
                            other => other,
                        });
                    }

                    let delay = base_backoff
                        .saturating_mul(2u32.saturating_pow(attempt - 1))
                        .min(max_backoff);
                    self.metrics
                        .request_retries
                        .add(1, &[KeyValue::new("operation", operation)]);
                    debug!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying receiver call"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One HTTP attempt: send, read the body under the per-attempt deadline,
    /// decode the charset, classify the status.
    async fn attempt(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<String, ReceiverError> {
        let url = self.base.join(path).map_err(|e| ReceiverError::BadResponse {
            operation: operation.to_string(),
            message: format!("invalid request path: {e}"),
        })?;

        let mut request = self.http.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if !self.config.username.is_empty() && !self.config.password.is_empty() {
            request = request.basic_auth(&self.config.username, Some(&self.config.password));
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(ReceiverError::Timeout {
                    operation: operation.to_string(),
                    attempts: 1,
                });
            }
            Err(e) => {
                return Err(ReceiverError::Unavailable {
                    operation: operation.to_string(),
                    message: redact(&e.to_string()),
                });
            }
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) if e.is_timeout() => {
                return Err(ReceiverError::Timeout {
                    operation: operation.to_string(),
                    attempts: 1,
                });
            }
            Err(e) => {
                return Err(ReceiverError::Unavailable {
                    operation: operation.to_string(),
                    message: redact(&e.to_string()),
                });
            }
        };

        let body = decode_body(&bytes, content_type.as_deref());
        classify(operation, status.as_u16(), body)
    }

    fn bad_response(operation: &'static str, message: String) -> ReceiverError {
        ReceiverError::BadResponse {
            operation: operation.to_string(),
            message: redact(&message),
        }
    }

    async fn services_nested(&self, bouquet_ref: &str) -> Result<Vec<ServiceEntry>, ReceiverError> {
        let body = self
            .fetch(
                "services",
                "/api/getservices",
                &[("sRef", bouquet_ref.to_string())],
            )
            .await?;
        decode::decode_services_nested(&body).map_err(|m| Self::bad_response("services", m))
    }

    async fn services_flat(&self, bouquet_ref: &str) -> Result<Vec<ServiceEntry>, ReceiverError> {
        let body = self
            .fetch(
                "services",
                "/api/getallservices",
                &[("sRef", bouquet_ref.to_string())],
            )
            .await?;
        decode::decode_services_flat(&body).map_err(|m| Self::bad_response("services", m))
    }
}

fn classify(operation: &'static str, status: u16, body: String) -> Result<String, ReceiverError> {
    if (200..300).contains(&status) {
        return Ok(body);
    }
    let operation = operation.to_string();
    match status {
        404 => Err(ReceiverError::NotFound { operation }),
        401 | 403 => Err(ReceiverError::Forbidden { operation }),
        409 => Err(ReceiverError::Conflict {
            operation,
            message: snippet(&body, BODY_SNIPPET_LEN),
        }),
        429 => Err(ReceiverError::Unavailable {
            operation,
            message: "rate limited (HTTP 429)".to_string(),
        }),
        s if s >= 500 => Err(ReceiverError::Upstream {
            operation,
            status: s,
            snippet: snippet(&body, BODY_SNIPPET_LEN),
        }),
        s => Err(ReceiverError::BadResponse {
            operation,
            message: format!("unexpected HTTP {s}: {}", snippet(&body, BODY_SNIPPET_LEN)),
        }),
    }
}

#[async_trait]
impl ReceiverApi for ReceiverClient {
    async fn bouquets(&self) -> Result<Vec<Bouquet>, ReceiverError> {
        let body = self.fetch("bouquets", "/api/bouquets", &[]).await?;
        decode_bouquets(&body).map_err(|m| Self::bad_response("bouquets", m))
    }

    /// Services of one bouquet. The first successful decode pins which shape
    /// this host speaks; later calls skip the probing.
    async fn services(&self, bouquet_ref: &str) -> Result<Vec<ServiceEntry>, ReceiverError> {
        let cached = *self.services_shape.read().await;
        match cached {
            Some(ServicesShape::Nested) => self.services_nested(bouquet_ref).await,
            Some(ServicesShape::Flat) => self.services_flat(bouquet_ref).await,
            None => match self.services_nested(bouquet_ref).await {
                Ok(list) => {
                    *self.services_shape.write().await = Some(ServicesShape::Nested);
                    Ok(list)
                }
                Err(ReceiverError::BadResponse { .. }) => {
                    debug!("nested services decode failed, falling back to flat shape");
                    let list = self.services_flat(bouquet_ref).await?;
                    *self.services_shape.write().await = Some(ServicesShape::Flat);
                    Ok(list)
                }
                Err(e) => Err(e),
            },
        }
    }

    async fn epg_for_service(
        &self,
        service_ref: &str,
        _days: u32,
    ) -> Result<Vec<EpgEvent>, ReceiverError> {
        let query = [
            ("sRef", service_ref.to_string()),
            ("time", "-1".to_string()),
        ];
        match self.fetch("epg_service", "/api/epgservice", &query).await {
            Ok(body) => decode_epg(&body).map_err(|m| Self::bad_response("epg_service", m)),
            Err(ReceiverError::NotFound { .. }) => {
                // Older WebIF builds only expose the XML endpoint.
                let body = self
                    .fetch(
                        "epg_service",
                        "/web/epgservice",
                        &[("sRef", service_ref.to_string())],
                    )
                    .await?;
                decode_epg(&body).map_err(|m| Self::bad_response("epg_service", m))
            }
            Err(e) => Err(e),
        }
    }

    async fn epg_for_bouquet(
        &self,
        bouquet_ref: &str,
        _days: u32,
    ) -> Result<Vec<EpgEvent>, ReceiverError> {
        let body = self
            .fetch(
                "epg_bouquet",
                "/api/epgbouquet",
                &[("bRef", bouquet_ref.to_string())],
            )
            .await?;
        decode_epg(&body).map_err(|m| Self::bad_response("epg_bouquet", m))
    }

    async fn timers(&self) -> Result<Vec<TimerEntry>, ReceiverError> {
        let body = self.fetch("timers", "/api/timerlist", &[]).await?;
        decode_timers(&body).map_err(|m| Self::bad_response("timers", m))
    }

    async fn add_timer(
        &self,
        service_ref: &str,
        begin: i64,
        end: i64,
        name: &str,
        description: &str,
    ) -> Result<(), ReceiverError> {
        let query = [
            ("sRef", service_ref.to_string()),
            ("begin", begin.to_string()),
            ("end", end.to_string()),
            ("name", name.to_string()),
            ("description", description.to_string()),
        ];
        let body = match self.fetch("timer_add", "/api/timeradd", &query).await {
            Ok(body) => body,
            Err(e) => {
                self.metrics.record_timer_update("failed", "receiver_call");
                return Err(e);
            }
        };

        let outcome = decode_timer_result(&body).map_err(|m| {
            self.metrics.record_timer_update("failed", "bad_response");
            Self::bad_response("timer_add", m)
        })?;

        if outcome.result {
            self.metrics.record_timer_update("created", "ok");
            return Ok(());
        }
        if outcome.message.to_lowercase().contains("conflict") {
            self.metrics.record_timer_update("failed", "conflict");
            return Err(ReceiverError::Conflict {
                operation: "timer_add".to_string(),
                message: redact(&outcome.message),
            });
        }
        self.metrics.record_timer_update("failed", "refused");
        Err(Self::bad_response("timer_add", outcome.message))
    }

    async fn delete_timer(
        &self,
        service_ref: &str,
        begin: i64,
        end: i64,
    ) -> Result<(), ReceiverError> {
        let query = [
            ("sRef", service_ref.to_string()),
            ("begin", begin.to_string()),
            ("end", end.to_string()),
        ];
        let body = match self.fetch("timer_delete", "/api/timerdelete", &query).await {
            Ok(body) => body,
            Err(e) => {
                self.metrics.record_timer_update("failed", "receiver_call");
                return Err(e);
            }
        };

        let outcome = decode_timer_result(&body).map_err(|m| {
            self.metrics.record_timer_update("failed", "bad_response");
            Self::bad_response("timer_delete", m)
        })?;

        if outcome.result {
            self.metrics.record_timer_update("deleted", "ok");
            Ok(())
        } else {
            self.metrics.record_timer_update("failed", "refused");
            Err(Self::bad_response("timer_delete", outcome.message))
        }
    }

    /// Direct MPEG-TS port by default, WebIF m3u endpoint when configured.
    fn stream_url(&self, service_ref: &str, name: &str) -> String {
        if self.config.use_webif_streams {
            let mut url = self.base.clone();
            url.set_path("/web/stream.m3u");
            url.query_pairs_mut()
                .clear()
                .append_pair("ref", service_ref)
                .append_pair("name", name);
            url.to_string()
        } else {
            let host = self.base.host_str().unwrap_or("localhost");
            format!(
                "http://{}:{}/{}",
                host, self.config.stream_port, service_ref
            )
        }
    }
}

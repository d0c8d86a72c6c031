use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use crate::api_error::ApiError;
use crate::http_client::{HttpClient, HttpResponse, TransportFailure};
use crate::request::RequestDescriptor;
use crate::retry::RetryConfig;
use crate::telemetry::{emit, TelemetrySink};

/// Performs one logical service call: fixed timeout per attempt, linear
/// backoff between retries of transient failures.
pub struct RequestExecutor {
    transport: Arc<dyn HttpClient>,
    retry: RetryConfig,
    timeout: Duration,
    telemetry: Arc<dyn TelemetrySink>,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn HttpClient>,
        retry: RetryConfig,
        timeout: Duration,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            transport,
            retry,
            timeout,
            telemetry,
        }
    }

    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Result<HttpResponse, ApiError> {
        let started = Instant::now();
        let mut attempt: u32 = 1;

        loop {
            match self.attempt(descriptor).await {
                Ok(response) => {
                    self.report(descriptor, started, attempt, None);
                    return Ok(response);
                }
                Err(error) if error.retryable() && attempt <= self.retry.max_retries => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        method = %descriptor.method(),
                        path = descriptor.path(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying service call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    let error = error.with_attempts(attempt);
                    self.report(descriptor, started, attempt, Some(&error));
                    return Err(error);
                }
            }
        }
    }

    async fn attempt(&self, descriptor: &RequestDescriptor) -> Result<HttpResponse, ApiError> {
        let timeout_ms = self.timeout.as_millis() as u64;
        let request = descriptor.to_http_request(timeout_ms);

        let response =
            match tokio::time::timeout(self.timeout, self.transport.execute(request)).await {
                Err(_) => {
                    return Err(ApiError::timeout(format!(
                        "{} {} timed out after {} ms",
                        descriptor.method(),
                        descriptor.path(),
                        timeout_ms
                    ))
                    .with_retryable(self.retry.retry_on_timeout));
                }
                Ok(Err(error)) => {
                    let retryable = match error.kind() {
                        TransportFailure::Timeout => self.retry.retry_on_timeout,
                        TransportFailure::Connect | TransportFailure::Other => {
                            self.retry.retry_on_connect
                        }
                    };
                    return Err(ApiError::from(error).with_retryable(retryable));
                }
                Ok(Ok(response)) => response,
            };

        if response.is_success() {
            return Ok(response);
        }

        Err(ApiError::http_status(
            response.status,
            format!(
                "{} {} returned status {}",
                descriptor.method(),
                descriptor.path(),
                response.status
            ),
            self.retry.should_retry_status(response.status),
        ))
    }

    fn report(
        &self,
        descriptor: &RequestDescriptor,
        started: Instant,
        attempts: u32,
        error: Option<&ApiError>,
    ) {
        let latency_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            method = %descriptor.method(),
            path = descriptor.path(),
            latency_ms,
            attempts,
            success = error.is_none(),
            "service call finished"
        );
        emit(
            self.telemetry.as_ref(),
            "api_performance",
            json!({
                "path": descriptor.path(),
                "method": descriptor.method().as_str(),
                "latency_ms": latency_ms,
                "attempts": attempts,
                "success": error.is_none(),
                "error_type": error.map(|error| error.kind().as_str()),
            }),
        );
    }
}

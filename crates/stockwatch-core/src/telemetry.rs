//! Telemetry sinks.
//!
//! The core reports three events: `api_performance`, `cache_hit_rate` and
//! `favorites_sync`. Sink failures are logged and otherwise ignored.

use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;

/// Failure reported by a telemetry sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("telemetry sink rejected event '{event}': {message}")]
pub struct TelemetryError {
    pub event: String,
    pub message: String,
}

/// Destination for telemetry events. `attributes` is a JSON object.
pub trait TelemetrySink: Send + Sync {
    fn report(&self, event: &str, attributes: &Value) -> Result<(), TelemetryError>;
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn report(&self, _event: &str, _attributes: &Value) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Forwards events to `tracing` at debug level under the `stockwatch::telemetry` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn report(&self, event: &str, attributes: &Value) -> Result<(), TelemetryError> {
        tracing::debug!(target: "stockwatch::telemetry", event, %attributes, "telemetry");
        Ok(())
    }
}

/// Keeps every event in memory. Useful in tests.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events
            .lock()
            .expect("telemetry lock is not poisoned")
            .clone()
    }

    /// Attributes of every recorded event named `event`.
    pub fn named(&self, event: &str) -> Vec<Value> {
        self.events
            .lock()
            .expect("telemetry lock is not poisoned")
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, attributes)| attributes.clone())
            .collect()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn report(&self, event: &str, attributes: &Value) -> Result<(), TelemetryError> {
        self.events
            .lock()
            .expect("telemetry lock is not poisoned")
            .push((event.to_owned(), attributes.clone()));
        Ok(())
    }
}

pub(crate) fn emit(sink: &dyn TelemetrySink, event: &str, attributes: Value) {
    if let Err(error) = sink.report(event, &attributes) {
        tracing::warn!(%error, "dropping telemetry event");
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct FailingSink;

    impl TelemetrySink for FailingSink {
        fn report(&self, event: &str, _attributes: &Value) -> Result<(), TelemetryError> {
            Err(TelemetryError {
                event: event.to_owned(),
                message: "offline".to_owned(),
            })
        }
    }

    #[test]
    fn emit_swallows_sink_failures() {
        emit(&FailingSink, "api_performance", json!({"path": "/hot"}));
    }

    #[test]
    fn recording_sink_filters_by_name() {
        let sink = RecordingTelemetry::new();
        emit(&sink, "cache_hit_rate", json!({"hit": true}));
        emit(&sink, "api_performance", json!({"success": true}));

        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.named("cache_hit_rate"), vec![json!({"hit": true})]);
    }
}

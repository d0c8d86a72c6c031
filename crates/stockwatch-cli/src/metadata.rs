use serde::Serialize;
use serde_json::Value;
use stockwatch_core::CacheStats;

/// Per-command metadata printed alongside every payload.
///
/// Field order is fixed to keep JSON output stable between runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub command: &'static str,
    pub latency_ms: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Metadata {
    pub fn new(command: &'static str, latency_ms: u64, cache: CacheStats) -> Self {
        Self {
            command,
            latency_ms,
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            warnings: Vec::new(),
        }
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// Output document: `{"meta": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub meta: Metadata,
    pub data: Value,
}

//! Benchmark counters for the `/benchmark/metrics` endpoint.

use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use fluxa_x402_odp::chain::OdpChainOps;
use fluxa_x402_odp::facilitator::OdpDeferredFacilitator;

/// Anything that contributes counters to the metrics endpoint.
pub trait MetricsSource: Send + Sync {
    /// A flat JSON object of counter names to values.
    fn snapshot(&self) -> Value;
}

impl<C: OdpChainOps> MetricsSource for OdpDeferredFacilitator<C> {
    fn snapshot(&self) -> Value {
        let metrics = self.metrics();
        json!({
            "receiptsVerified": metrics.receipts_verified.load(Ordering::Relaxed),
            "receiptsSettled": metrics.receipts_settled.load(Ordering::Relaxed),
            "settlementTransactions": metrics.settlement_transactions.load(Ordering::Relaxed),
            "pendingSessions": self.pending_sessions(),
        })
    }
}

/// Merged view over the registered sources.
#[derive(Clone, Default)]
pub struct BenchmarkMetrics {
    sources: Vec<Arc<dyn MetricsSource>>,
}

impl BenchmarkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Collects all counters into one JSON object.
    pub fn snapshot(&self) -> Value {
        let mut merged = serde_json::Map::new();
        for source in &self.sources {
            if let Value::Object(map) = source.snapshot() {
                merged.extend(map);
            }
        }
        Value::Object(merged)
    }
}

//! Prometheus metrics
//!
//! Service-owned registry; counters are incremented at the points where
//! the pipeline decides an outcome, and a text-exposition endpoint is
//! mounted at the configured metrics path.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

/// Lookup latency buckets (seconds): cache hits sit in the first few,
/// store fallbacks in the tail.
const LOOKUP_LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0,
];

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    /// Consumed messages by outcome: `persisted`, `dlq`.
    pub orders_consumed: IntCounterVec,
    /// DLQ routings by stage: `unmarshal`, `validation`, `db`.
    pub dlq_messages: IntCounterVec,
    /// Cache lookups by result: `hit`, `miss`.
    pub cache_requests: IntCounterVec,
    /// Read-through populations after a store hit.
    pub cache_populations: IntCounterVec,
    /// Order lookup latency by source: `cache`, `store`.
    pub lookup_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let orders_consumed = IntCounterVec::new(
            Opts::new("orders_consumed_total", "Messages consumed, by outcome"),
            &["outcome"],
        )?;
        let dlq_messages = IntCounterVec::new(
            Opts::new("dlq_messages_total", "Messages routed to the DLQ, by stage"),
            &["stage"],
        )?;
        let cache_requests = IntCounterVec::new(
            Opts::new("cache_requests_total", "Cache lookups, by result"),
            &["result"],
        )?;
        let cache_populations = IntCounterVec::new(
            Opts::new(
                "cache_populations_total",
                "Cache fills after a store read, by source",
            ),
            &["source"],
        )?;
        let lookup_duration = HistogramVec::new(
            HistogramOpts::new("order_lookup_duration_seconds", "Order lookup latency")
                .buckets(LOOKUP_LATENCY_BUCKETS.to_vec()),
            &["source"],
        )?;

        registry.register(Box::new(orders_consumed.clone()))?;
        registry.register(Box::new(dlq_messages.clone()))?;
        registry.register(Box::new(cache_requests.clone()))?;
        registry.register(Box::new(cache_populations.clone()))?;
        registry.register(Box::new(lookup_duration.clone()))?;

        Ok(Self {
            registry,
            orders_consumed,
            dlq_messages,
            cache_requests,
            cache_populations,
            lookup_duration,
        })
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

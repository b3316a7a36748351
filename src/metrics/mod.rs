//! Prometheus metrics for script runs
//!
//! Exposes metrics for:
//! - Transactions submitted, by kind
//! - Settled outcomes and rejections
//! - Confirmation latency
//!
//! Each execution context owns its registry, so parallel test contexts and
//! embedding applications never share counters.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

const LATENCY_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Metrics recorded by one execution context
pub struct ScriptMetrics {
    registry: Registry,
    transactions_submitted: IntCounterVec,
    transaction_outcomes: IntCounterVec,
    rejections: IntCounterVec,
    confirmation_latency: Histogram,
}

impl ScriptMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let transactions_submitted = IntCounterVec::new(
            Opts::new(
                "starkscript_transactions_submitted_total",
                "Total transactions broadcast by kind",
            ),
            &["kind"],
        )?;
        let transaction_outcomes = IntCounterVec::new(
            Opts::new(
                "starkscript_transaction_outcomes_total",
                "Settled transaction outcomes",
            ),
            &["outcome"],
        )?;
        let rejections = IntCounterVec::new(
            Opts::new(
                "starkscript_rejections_total",
                "Transactions refused by the node",
            ),
            &["reason"],
        )?;
        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "starkscript_confirmation_latency_seconds",
                "Time from broadcast to a settled outcome",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(transactions_submitted.clone()))?;
        registry.register(Box::new(transaction_outcomes.clone()))?;
        registry.register(Box::new(rejections.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;

        Ok(Self {
            registry,
            transactions_submitted,
            transaction_outcomes,
            rejections,
            confirmation_latency,
        })
    }

    pub fn record_submitted(&self, kind: &str) {
        self.transactions_submitted.with_label_values(&[kind]).inc();
    }

    pub fn record_outcome(&self, outcome: &str) {
        self.transaction_outcomes.with_label_values(&[outcome]).inc();
    }

    pub fn record_rejection(&self, reason: &str) {
        self.rejections.with_label_values(&[reason]).inc();
    }

    pub fn record_confirmation_latency(&self, elapsed: Duration) {
        self.confirmation_latency.observe(elapsed.as_secs_f64());
    }

    /// Prometheus text exposition of everything recorded so far
    pub fn gather_text(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

//! Metrics and logging for the anchoring and proof engine
//!
//! Prometheus counters for batches, anchors, proofs and intents, and the
//! tracing subscriber setup the binaries and tests share.
//!
//! # Example
//!
//! ```no_run
//! use anchor_proofs_metrics::{init_tracing_with_metrics, MetricsCollector};
//! use std::sync::Arc;
//!
//! let collector = Arc::new(MetricsCollector::new());
//! init_tracing_with_metrics("info", collector.clone()).unwrap();
//! collector.record_transaction_appended();
//! println!("{}", collector.gather_text().unwrap());
//! ```

pub mod collector;
pub mod metrics;
pub mod tracing;

pub use collector::{MetricsCollector, MetricsError};
pub use self::tracing::{
    init_tracing, init_tracing_with_metrics, intent_span, CorrelationId, ErrorCountingLayer,
    TracingError,
};

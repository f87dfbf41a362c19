use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::collector::MetricsCollector;

/// Engine crates whose verbosity follows the configured level; everything
/// else stays at `warn` unless `RUST_LOG` says otherwise.
const ENGINE_TARGETS: &[&str] = &[
    "anchor_proofs",
    "anchor_proofs_anchoring",
    "anchor_proofs_chain",
    "anchor_proofs_merkle",
    "anchor_proofs_orchestrator",
    "anchor_proofs_proof",
    "anchor_proofs_retry",
    "anchor_proofs_store",
];

fn engine_filter(level: &str) -> Result<EnvFilter, TracingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = ENGINE_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .fold("warn".to_string(), |acc, d| format!("{acc},{d}"));
    EnvFilter::try_new(directives).map_err(|e| TracingError::Filter(e.to_string()))
}

/// JSON logs at `level` for the engine crates
pub fn init_tracing(level: &str) -> Result<(), TracingError> {
    tracing_subscriber::registry()
        .with(engine_filter(level)?)
        .with(tracing_subscriber::fmt::layer().with_target(true).json())
        .try_init()
        .map_err(|e| TracingError::AlreadyInstalled(e.to_string()))
}

/// Like [`init_tracing`], and every `ERROR` event also bumps the error
/// counter of the component that logged it.
pub fn init_tracing_with_metrics(
    level: &str,
    collector: Arc<MetricsCollector>,
) -> Result<(), TracingError> {
    let json = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .json();

    tracing_subscriber::registry()
        .with(engine_filter(level)?)
        .with(json)
        .with(ErrorCountingLayer::new(collector))
        .try_init()
        .map_err(|e| TracingError::AlreadyInstalled(e.to_string()))
}

pub struct ErrorCountingLayer {
    collector: Arc<MetricsCollector>,
}

impl ErrorCountingLayer {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }
}

impl<S> Layer<S> for ErrorCountingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() != Level::ERROR {
            return;
        }

        let mut explicit = ComponentField(None);
        event.record(&mut explicit);
        match explicit.0 {
            Some(component) => self.collector.record_error(&component),
            None => self.collector.record_error(component_of(metadata.target())),
        }
    }
}

/// `anchor_proofs_anchoring::tracker` -> `anchoring`
fn component_of(target: &str) -> &str {
    let krate = target.split("::").next().unwrap_or(target);
    krate.strip_prefix("anchor_proofs_").unwrap_or(krate)
}

/// An explicit `component = ".."` field overrides the target's crate
struct ComponentField(Option<String>);

impl Visit for ComponentField {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "component" {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "component" && self.0.is_none() {
            self.0 = Some(format!("{value:?}").trim_matches('"').to_string());
        }
    }
}

/// Ties together every log line of one intent run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(uuid::Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

pub fn intent_span(intent_id: &str, correlation_id: CorrelationId) -> tracing::Span {
    tracing::info_span!(
        "intent",
        intent_id = %intent_id,
        correlation_id = %correlation_id,
    )
}

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("invalid log filter: {0}")]
    Filter(String),

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInstalled(String),
}

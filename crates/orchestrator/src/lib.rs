//! Intent orchestration
//!
//! An intent is a set of legs on one or more target chains, linked by a
//! dependency DAG and run under a sequential, parallel or atomic execution
//! mode. Each leg's commitment is batched and anchored on its chain, legs
//! sharing a chain are coalesced into one batch, and the leg's action runs
//! once the anchor is final and a proof of the commitment exists.

pub mod aggregate;
pub mod error;
pub mod executor;
pub mod graph;
pub mod orchestrator;
mod pipeline;
mod scheduler;

pub use aggregate::{running_status, settled_status, LegCounters};
pub use error::OrchestratorError;
pub use executor::{ExecutionReceipt, LegExecutionError, LegExecutor, MockLegExecutor};
pub use graph::{Edge, GraphError, LegGraph};
pub use orchestrator::{
    BuilderError, IntentOrchestrator, IntentOrchestratorBuilder, OrchestratorConfig,
};

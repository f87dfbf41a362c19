//! Batch lifecycle and anchoring
//!
//! [`BatchManager`] owns the `pending → closed → anchoring → anchored →
//! confirmed` state machine, [`AnchorSubmitter`] writes closed roots to
//! target chains, and [`ConfirmationTracker`] turns observer messages into
//! finality or reorg transitions.

pub mod batch;
pub mod error;
mod locks;
pub mod submitter;
pub mod tracker;

pub use batch::{BatchManager, BatchPolicy};
pub use error::AnchoringError;
pub use submitter::{AnchorSubmitter, ChainPolicy};
pub use tracker::{AnchorEvent, ConfirmationTracker, UpdateOutcome};

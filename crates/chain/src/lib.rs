//! Chain observer boundary
//!
//! External chains are reached only through [`ChainObserver`]. Observers
//! that can push report [`ObserverMessage`]s into the confirmation tracker;
//! the rest are polled through an [`ObserverPool`].

pub mod mock;
pub mod observer;
pub mod pool;

pub use mock::MockChainObserver;
pub use observer::{
    ChainError, ChainObserver, ConfirmationStatus, ConfirmationUpdate, ObserverMessage,
    ReorgNotice,
};
pub use pool::ObserverPool;

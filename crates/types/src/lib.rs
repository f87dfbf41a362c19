pub mod anchor;
pub mod attestation;
pub mod batch;
pub mod hash;
pub mod intent;
pub mod proof;
pub mod request;
pub mod timeline;

pub use anchor::*;
pub use attestation::*;
pub use batch::*;
pub use hash::{Hash32, ZERO_HASH};
pub use intent::*;
pub use proof::*;
pub use request::*;
pub use timeline::*;

/// Current unix time in seconds
pub fn current_timestamp() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

//! Proof assembly and verification
//!
//! A proof packages four components for one batch transaction: Merkle
//! inclusion, the anchor reference, an optional chained state proof and an
//! optional governance proof (G0 to G2). Verification re-checks each present
//! component; `valid` is their conjunction and is only ever an output.

pub mod assembler;
pub mod attestation;
pub mod error;
pub mod query;
pub mod requests;
pub mod validators;
pub mod verifier;

pub use assembler::ProofAssembler;
pub use attestation::{attests_to, verify_attestation, AttestationService};
pub use error::ProofError;
pub use query::{BundleComponents, ProofBundle, ProofQuery};
pub use requests::{NewProofRequest, ProofRequestService};
pub use validators::{
    ChainedProof, ChainedStateProofValidator, GovernanceValidator, SignatureGovernanceValidator,
    StateProofValidator, ValidatorVerdict,
};
pub use verifier::{ProofVerifier, REORG_DETAIL};

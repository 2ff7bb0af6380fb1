//! Greenlight persistence abstractions.
//!
//! This crate defines the storage contract consumed by the control plane:
//! - pipeline instance records with compare-and-swap stage transitions
//! - contracts with the frozen-after-approval invariant enforced at the
//!   storage boundary
//! - append-only verification attempts
//! - an append-only, hash-linked audit log per pipeline
//!
//! The in-memory adapter is the deterministic reference implementation;
//! production deployments put a transactional backend behind the same
//! traits.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod model;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use model::AuditRecord;
pub use traits::{
    AttemptStore, AuditLog, ContractStore, ControlPlaneStore, PipelineStore, QueryWindow,
};

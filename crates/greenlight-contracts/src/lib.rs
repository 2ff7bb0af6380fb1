//! Content-addressed contract model.
//!
//! Every stage artifact in a pipeline is a contract: a typed payload that
//! is drafted, reviewed, and approved. Approval computes and freezes a
//! BLAKE3 hash over the canonical content (volatile fields excluded), and
//! every downstream contract declares the exact upstream hashes it was
//! derived from. Broken links are surfaced as hash-chain or context
//! isolation errors before generation, not discovered at the end.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod attempt;
mod canonical;
mod contract;
mod error;
mod hash;
mod kind;
mod payload;

pub use attempt::{CheckKind, CheckSpec, StepExit, StepRecord, VerificationAttempt};
pub use canonical::canonical_json_bytes;
pub use contract::{validate_upstream_refs, Contract, ContractStatus};
pub use error::{ContractError, ContractResult};
pub use hash::{ContentHash, ContentHashError};
pub use kind::ContractKind;
pub use payload::{
    ensure_relative_path, BasePromptPayload, BuildCapability, BuildInstructionPayload,
    CompletionReportPayload, ContractPayload, DesignSetPayload, DesignSpec, ExecutionPlanPayload,
    FlowMapPayload, FlowSpec, PatchRecord, RepairPlanPayload, RuleSetPayload, ScreenSetPayload,
    ScreenSpec, VerificationReportPayload,
};

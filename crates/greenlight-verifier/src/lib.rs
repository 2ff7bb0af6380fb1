//! Verification and self-healing repair loop.
//!
//! Runs the ordered checks declared in the approved execution plan
//! against the generated workspace. A failing step ends the attempt and
//! its evidence goes to the repair collaborator, whose full-file patches
//! are applied before the next attempt. Attempts are bounded; the final
//! verdict walks the pipeline down the plan's passed or failed path and
//! every attempt is persisted for the completion auditor.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod checker;
mod config;
mod error;
pub mod mocks;
mod repair;
mod runner;
mod workspace;

pub use checker::{CheckOutcome, Checker};
pub use config::VerifierConfig;
pub use error::{VerifierError, VerifierResult};
pub use mocks::{ScriptedChecker, ScriptedRepair};
pub use repair::{RepairOutcome, RepairPatch, RepairRequest, RepairService};
pub use runner::{VerificationLoop, VerificationOutcome};
pub use workspace::Workspace;

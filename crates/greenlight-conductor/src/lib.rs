//! The Greenlight conductor.
//!
//! Owns the stage state machine for a generative build pipeline. Every
//! stage transition goes through the [`Conductor`], which enforces the
//! declared [`StagePlan`](greenlight_types::StagePlan), refuses to act on
//! a locked or human-gated pipeline, and appends an audit event for each
//! state change. The [`ContractGate`] sits next to it and runs the
//! draft / approve / reject lifecycle for pipeline contracts, including
//! upstream hash validation and capability checks.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod conductor;
mod error;
mod gate;
mod lock;

pub use conductor::{AbortOutcome, Conductor};
pub use error::{ConductorError, ConductorResult};
pub use gate::ContractGate;
pub use lock::{LockRegistry, PipelineLock};

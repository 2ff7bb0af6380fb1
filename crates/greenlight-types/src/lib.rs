//! Greenlight shared types.
//!
//! Vocabulary used across the control plane: pipeline and contract
//! identifiers, the stage plan (declared legal transitions with human
//! gates), persisted pipeline records, and append-only audit events.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod event;
mod ids;
mod pipeline;
mod stage;

pub use event::{AuditEvent, AuditEventKind};
pub use ids::{ApproverId, ContractId, PipelineId};
pub use pipeline::{PipelineRecord, StateSnapshot};
pub use stage::{StageEdge, StagePlan, StagePlanBuilder, StagePlanError, StageStatus};

use greenlight_contracts::ContractError;
use greenlight_storage::StorageError;
use greenlight_types::{ContractId, PipelineId, StageStatus};
use thiserror::Error;

pub type ConductorResult<T> = Result<T, ConductorError>;

/// Errors raised by the conductor and the contract gate.
#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("pipeline {0} is already initialized")]
    AlreadyInitialized(PipelineId),

    #[error("pipeline {0} not found")]
    NotFound(PipelineId),

    #[error("contract {0} not found")]
    ContractNotFound(ContractId),

    #[error("transition from {from} to {to} is not in the stage plan")]
    StateViolation { from: StageStatus, to: StageStatus },

    #[error("pipeline {0} is locked by another stage")]
    LockViolation(PipelineId),

    #[error("pipeline is awaiting human review: {reason}")]
    AwaitingHuman { reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("contract error: {0}")]
    Contract(#[from] ContractError),
}

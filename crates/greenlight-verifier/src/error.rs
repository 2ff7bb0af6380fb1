use greenlight_conductor::ConductorError;
use greenlight_contracts::ContractError;
use greenlight_storage::StorageError;
use greenlight_types::{PipelineId, StageStatus};
use thiserror::Error;

pub type VerifierResult<T> = Result<T, VerifierError>;

/// Errors raised by the verification loop.
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("pipeline is in {found}, verification runs in {expected}")]
    WrongStage {
        expected: StageStatus,
        found: StageStatus,
    },

    #[error("no approved execution plan for pipeline {0}")]
    MissingExecutionPlan(PipelineId),

    #[error("approved {kind} contract failed hash verification")]
    TamperedContract { kind: String },

    #[error("patch rejected: {0}")]
    PatchRejected(String),

    #[error(transparent)]
    Conductor(#[from] ConductorError),

    #[error("contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("workspace io: {0}")]
    Io(#[from] std::io::Error),
}

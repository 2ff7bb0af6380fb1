use greenlight_conductor::ConductorError;
use greenlight_contracts::ContractError;
use greenlight_storage::StorageError;
use greenlight_types::PipelineId;
use thiserror::Error;

pub type AuditResult<T> = Result<T, AuditError>;

/// Errors raised by the completion auditor.
///
/// Failed checks are not errors; they land in the report's failure list.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("pipeline {0} not found")]
    NotFound(PipelineId),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Conductor(#[from] ConductorError),

    #[error("contract error: {0}")]
    Contract(#[from] ContractError),
}

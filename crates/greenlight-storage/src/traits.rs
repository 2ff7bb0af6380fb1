use async_trait::async_trait;
use chrono::{DateTime, Utc};
use greenlight_contracts::{Contract, ContractKind, VerificationAttempt};
use greenlight_types::{AuditEvent, ContractId, PipelineId, PipelineRecord, StageStatus};

use crate::model::AuditRecord;
use crate::StorageResult;

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

/// Storage interface for pipeline instance records.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Insert a new instance record. Fails with a conflict if the id
    /// already exists.
    async fn create_pipeline(&self, record: PipelineRecord) -> StorageResult<()>;

    /// Get one instance record by id.
    async fn get_pipeline(&self, id: &PipelineId) -> StorageResult<Option<PipelineRecord>>;

    /// Compare-and-swap stage transition: applies only when the stored
    /// status still equals `expected_from`, replacing the awaiting-human
    /// reason and recording the acting stage.
    async fn transition_stage(
        &self,
        id: &PipelineId,
        expected_from: &StageStatus,
        to: &StageStatus,
        acting_stage: Option<&str>,
        awaiting_human: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Set or clear the awaiting-human reason without moving stages.
    async fn set_awaiting_human(
        &self,
        id: &PipelineId,
        reason: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// List instance records newest-first.
    async fn list_pipelines(&self, window: QueryWindow) -> StorageResult<Vec<PipelineRecord>>;
}

/// Storage interface for contracts.
///
/// The frozen-after-approval invariant is enforced here independently of
/// the model: once a stored contract is approved, updates and deletes are
/// refused, and an approved contract without a hash is never accepted.
#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Insert a new contract. Fails with a conflict if the id exists.
    async fn create_contract(&self, contract: Contract) -> StorageResult<()>;

    /// Get one contract by id.
    async fn get_contract(&self, id: &ContractId) -> StorageResult<Option<Contract>>;

    /// Replace a stored contract. The one legal write against an
    /// approved record is nothing: approval itself is the last update.
    async fn update_contract(&self, contract: Contract) -> StorageResult<()>;

    /// Delete a contract. Refused once approved (reject-and-regenerate
    /// applies to drafts only).
    async fn delete_contract(&self, id: &ContractId) -> StorageResult<()>;

    /// Most recently created contract of a kind for a pipeline.
    async fn latest_of_kind(
        &self,
        pipeline_id: &PipelineId,
        kind: ContractKind,
    ) -> StorageResult<Option<Contract>>;

    /// All contracts belonging to a pipeline, oldest first.
    async fn list_contracts(&self, pipeline_id: &PipelineId) -> StorageResult<Vec<Contract>>;
}

/// Storage interface for verification attempts. Append-only: attempts
/// are immutable once recorded.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Record a finished attempt. Fails with a conflict if this attempt
    /// number already exists for the pipeline.
    async fn record_attempt(&self, attempt: VerificationAttempt) -> StorageResult<()>;

    /// All attempts for a pipeline, ordered by attempt number.
    async fn list_attempts(
        &self,
        pipeline_id: &PipelineId,
    ) -> StorageResult<Vec<VerificationAttempt>>;

    /// The highest-numbered attempt for a pipeline.
    async fn latest_attempt(
        &self,
        pipeline_id: &PipelineId,
    ) -> StorageResult<Option<VerificationAttempt>>;
}

/// Storage interface for the append-only audit log.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append an event and return the canonical, hash-linked stored
    /// record.
    async fn append_event(&self, event: AuditEvent) -> StorageResult<AuditRecord>;

    /// Read a pipeline's chain in append order.
    async fn list_events(
        &self,
        pipeline_id: &PipelineId,
        window: QueryWindow,
    ) -> StorageResult<Vec<AuditRecord>>;

    /// The latest hash anchor of a pipeline's chain.
    async fn latest_event_hash(&self, pipeline_id: &PipelineId) -> StorageResult<Option<String>>;
}

/// Unified storage bundle consumed by the control plane.
pub trait ControlPlaneStore:
    PipelineStore + ContractStore + AttemptStore + AuditLog + Send + Sync
{
}

impl<T> ControlPlaneStore for T where
    T: PipelineStore + ContractStore + AttemptStore + AuditLog + Send + Sync
{
}

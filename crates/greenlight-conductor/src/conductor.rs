use std::sync::Arc;

use chrono::Utc;
use greenlight_storage::{ControlPlaneStore, StorageError};
use greenlight_types::{
    ApproverId, AuditEvent, AuditEventKind, PipelineId, PipelineRecord, StagePlan, StageStatus,
    StateSnapshot,
};
use tracing::{info, warn};

use crate::error::{ConductorError, ConductorResult};
use crate::lock::{LockRegistry, PipelineLock};

/// Outcome of an abort request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortOutcome {
    /// The pipeline moved to the aborted status immediately.
    Aborted,
    /// A stage holds the pipeline lock. The request is parked and honored
    /// by the holder at its next safe boundary.
    Deferred,
}

/// The stage state machine.
///
/// All pipeline state changes flow through here. The conductor checks the
/// declared [`StagePlan`] before every transition, takes the pipeline lock
/// for the duration of the change, refuses to advance a pipeline that is
/// paused for human review, and appends one audit event per state change.
pub struct Conductor {
    plan: StagePlan,
    store: Arc<dyn ControlPlaneStore>,
    locks: Arc<LockRegistry>,
}

impl Conductor {
    pub fn new(plan: StagePlan, store: Arc<dyn ControlPlaneStore>) -> Self {
        Self {
            plan,
            store,
            locks: Arc::new(LockRegistry::new()),
        }
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    /// The lock table shared with long-running stages.
    pub fn locks(&self) -> &Arc<LockRegistry> {
        &self.locks
    }

    /// Create a pipeline at the plan's initial status.
    pub async fn initialize(&self, id: &PipelineId) -> ConductorResult<PipelineRecord> {
        let record = PipelineRecord::new(id.clone(), self.plan.initial().clone());
        match self.store.create_pipeline(record.clone()).await {
            Ok(()) => {}
            Err(StorageError::Conflict(_)) => {
                return Err(ConductorError::AlreadyInitialized(id.clone()))
            }
            Err(e) => return Err(e.into()),
        }

        info!(pipeline = %id, status = %record.status, "pipeline initialized");
        self.store
            .append_event(AuditEvent::new(
                id.clone(),
                AuditEventKind::PipelineInitialized,
                format!("pipeline created at {}", record.status),
            ))
            .await?;
        Ok(record)
    }

    /// Current state of a pipeline, with liveness flags.
    pub async fn snapshot(&self, id: &PipelineId) -> ConductorResult<StateSnapshot> {
        let record = self.require_pipeline(id).await?;
        Ok(StateSnapshot {
            status: record.status,
            locked: self.locks.is_locked(id),
            awaiting_human: record.awaiting_human,
            last_stage: record.last_stage,
        })
    }

    /// Take the pipeline lock for a multi-step stage. Dropping the guard
    /// releases it.
    pub fn lock(&self, id: &PipelineId) -> ConductorResult<PipelineLock<'_>> {
        self.locks.acquire(id)
    }

    /// Apply one legal transition, taking the lock for the duration.
    pub async fn transition(
        &self,
        id: &PipelineId,
        to: &StageStatus,
        acting_stage: &str,
    ) -> ConductorResult<StateSnapshot> {
        let lock = self.lock(id)?;
        self.transition_locked(&lock, to, acting_stage).await
    }

    /// Apply one legal transition under a lock the caller already holds.
    ///
    /// The held guard is proof of exclusivity, so this does not touch the
    /// lock table. Refuses if the pipeline is paused for human review or
    /// the edge is not in the plan.
    pub async fn transition_locked(
        &self,
        lock: &PipelineLock<'_>,
        to: &StageStatus,
        acting_stage: &str,
    ) -> ConductorResult<StateSnapshot> {
        let id = lock.pipeline();
        let record = self.require_pipeline(id).await?;

        if let Some(reason) = record.awaiting_human.clone() {
            return Err(ConductorError::AwaitingHuman { reason });
        }
        if !self.plan.allows(&record.status, to) {
            return Err(ConductorError::StateViolation {
                from: record.status,
                to: to.clone(),
            });
        }

        let gate_reason = self
            .plan
            .gate_reason(&record.status, to)
            .map(str::to_string);
        self.store
            .transition_stage(
                id,
                &record.status,
                to,
                Some(acting_stage),
                gate_reason.clone(),
                Utc::now(),
            )
            .await?;

        info!(
            pipeline = %id,
            from = %record.status,
            to = %to,
            stage = acting_stage,
            "stage transition"
        );
        self.store
            .append_event(AuditEvent::new(
                id.clone(),
                AuditEventKind::StageTransition {
                    from: record.status.clone(),
                    to: to.clone(),
                },
                format!("advanced from {} to {} by {}", record.status, to, acting_stage),
            ))
            .await?;

        if let Some(reason) = gate_reason {
            self.store
                .append_event(AuditEvent::new(
                    id.clone(),
                    AuditEventKind::PausedForHuman {
                        reason: reason.clone(),
                    },
                    reason,
                ))
                .await?;
        }

        self.snapshot(id).await
    }

    /// Pause a pipeline until a human releases it.
    pub async fn pause_for_human(&self, id: &PipelineId, reason: &str) -> ConductorResult<()> {
        self.require_pipeline(id).await?;
        self.store
            .set_awaiting_human(id, Some(reason.to_string()), Utc::now())
            .await?;

        info!(pipeline = %id, reason, "paused for human review");
        self.store
            .append_event(AuditEvent::new(
                id.clone(),
                AuditEventKind::PausedForHuman {
                    reason: reason.to_string(),
                },
                reason,
            ))
            .await?;
        Ok(())
    }

    /// Clear the human gate and record who released it.
    pub async fn resume_after_human(
        &self,
        id: &PipelineId,
        approver: &ApproverId,
    ) -> ConductorResult<()> {
        let record = self.require_pipeline(id).await?;
        if record.awaiting_human.is_none() {
            return Ok(());
        }
        self.store.set_awaiting_human(id, None, Utc::now()).await?;

        info!(pipeline = %id, approver = %approver, "resumed after human review");
        self.store
            .append_event(AuditEvent::new(
                id.clone(),
                AuditEventKind::ResumedAfterHuman,
                format!("released by {}", approver),
            ))
            .await?;
        Ok(())
    }

    /// Cancel a pipeline.
    ///
    /// When the lock is free the instance moves to the aborted status
    /// right away. When a stage holds the lock the request is parked in
    /// the registry and the holder honors it at its next boundary.
    pub async fn abort(&self, id: &PipelineId, reason: &str) -> ConductorResult<AbortOutcome> {
        match self.locks.acquire(id) {
            Ok(guard) => {
                self.abort_locked(&guard, reason).await?;
                Ok(AbortOutcome::Aborted)
            }
            Err(ConductorError::LockViolation(_)) => {
                self.locks.request_abort(id, reason);
                info!(pipeline = %id, reason, "abort parked while the lock is held");
                Ok(AbortOutcome::Deferred)
            }
            Err(other) => Err(other),
        }
    }

    /// Cancel a pipeline under a lock the caller already holds. Used by
    /// long-running stages honoring a parked abort request.
    pub async fn abort_locked(&self, lock: &PipelineLock<'_>, reason: &str) -> ConductorResult<()> {
        let id = lock.pipeline();
        let record = self.require_pipeline(id).await?;
        if self.plan.is_terminal(&record.status) {
            return Err(ConductorError::StateViolation {
                from: record.status,
                to: self.plan.aborted().clone(),
            });
        }

        self.store
            .transition_stage(id, &record.status, self.plan.aborted(), None, None, Utc::now())
            .await?;

        warn!(pipeline = %id, reason, "pipeline aborted");
        self.store
            .append_event(AuditEvent::new(
                id.clone(),
                AuditEventKind::PipelineAborted {
                    reason: reason.to_string(),
                },
                format!("aborted from {}", record.status),
            ))
            .await?;
        Ok(())
    }

    async fn require_pipeline(&self, id: &PipelineId) -> ConductorResult<PipelineRecord> {
        self.store
            .get_pipeline(id)
            .await?
            .ok_or_else(|| ConductorError::NotFound(id.clone()))
    }
}

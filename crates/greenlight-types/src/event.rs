//! Audit events: append-only records of every state-changing operation.
//!
//! Events are written by the conductor, the contract gate, the verifier,
//! and the auditor. Storage assigns sequence numbers and chains hashes;
//! this module only defines the event vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::PipelineId;
use crate::stage::StageStatus;

/// One audit event, prior to storage sequencing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub pipeline_id: PipelineId,
    pub kind: AuditEventKind,
    /// Human-readable description of what happened.
    pub message: String,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(pipeline_id: PipelineId, kind: AuditEventKind, message: impl Into<String>) -> Self {
        Self {
            pipeline_id,
            kind,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Kinds of audit events emitted by the control plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AuditEventKind {
    /// Instance created at the plan's initial status
    PipelineInitialized,
    /// A legal stage transition was applied
    StageTransition { from: StageStatus, to: StageStatus },
    /// The pipeline paused for human review
    PausedForHuman { reason: String },
    /// A human released the pipeline to continue
    ResumedAfterHuman,
    /// A contract draft was stored
    ContractDrafted { kind: String },
    /// A contract was approved and its hash frozen
    ContractApproved { kind: String },
    /// A contract draft was rejected and deleted
    ContractRejected { kind: String, reason: String },
    /// A verification attempt passed
    VerificationPassed { attempt: u32, after_repair: bool },
    /// A verification attempt failed
    VerificationFailed { attempt: u32, summary: String },
    /// Repair patches were applied to the workspace
    RepairApplied { attempt: u32, patches: usize },
    /// The repair collaborator declined to produce a fix
    RepairDeclined { attempt: u32, reason: String },
    /// The attempt bound was reached without a passing verification
    RepairAttemptsExhausted { attempts: u32 },
    /// The instance was cancelled
    PipelineAborted { reason: String },
    /// An uncaught failure was converted into a terminal status
    UnexpectedFailure { detail: String },
    /// The completion auditor issued a verdict
    CompletionAudited { complete: bool },
}

impl std::fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PipelineInitialized => write!(f, "pipeline_initialized"),
            Self::StageTransition { from, to } => write!(f, "transition:{}→{}", from, to),
            Self::PausedForHuman { .. } => write!(f, "paused_for_human"),
            Self::ResumedAfterHuman => write!(f, "resumed_after_human"),
            Self::ContractDrafted { kind } => write!(f, "contract_drafted:{}", kind),
            Self::ContractApproved { kind } => write!(f, "contract_approved:{}", kind),
            Self::ContractRejected { kind, .. } => write!(f, "contract_rejected:{}", kind),
            Self::VerificationPassed { after_repair, .. } => {
                if *after_repair {
                    write!(f, "verification_passed_after_repair")
                } else {
                    write!(f, "verification_passed")
                }
            }
            Self::VerificationFailed { attempt, .. } => {
                write!(f, "verification_failed:attempt_{}", attempt)
            }
            Self::RepairApplied { attempt, .. } => write!(f, "repair_applied:attempt_{}", attempt),
            Self::RepairDeclined { .. } => write!(f, "repair_declined"),
            Self::RepairAttemptsExhausted { .. } => write!(f, "repair_attempts_exhausted"),
            Self::PipelineAborted { .. } => write!(f, "pipeline_aborted"),
            Self::UnexpectedFailure { .. } => write!(f, "unexpected_failure"),
            Self::CompletionAudited { complete } => {
                let verdict = if *complete { "complete" } else { "not_complete" };
                write!(f, "completion_audited:{}", verdict)
            }
        }
    }
}

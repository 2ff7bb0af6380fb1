use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use greenlight_conductor::{Conductor, ConductorError, ContractGate, PipelineLock};
use greenlight_contracts::{
    CheckKind, CheckSpec, ContentHash, ContractError, ContractKind, ContractPayload, PatchRecord,
    RepairPlanPayload, StepExit, StepRecord, VerificationAttempt, VerificationReportPayload,
};
use greenlight_storage::ControlPlaneStore;
use greenlight_types::{ApproverId, AuditEvent, AuditEventKind, PipelineId};
use tracing::{info, warn};

use crate::checker::Checker;
use crate::config::VerifierConfig;
use crate::error::{VerifierError, VerifierResult};
use crate::repair::{RepairOutcome, RepairRequest, RepairService};
use crate::workspace::Workspace;

/// Final verdict of one verification run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// An attempt passed and the pipeline walked the passed path.
    Passed { attempt: u32, after_repair: bool },
    /// No attempt passed. The pipeline walked the failed path.
    Failed { attempts: u32, summary: String },
    /// A parked abort request was honored at an attempt boundary.
    Aborted { reason: String },
}

/// The verification and repair loop.
///
/// One run holds the pipeline lock from the first check to the terminal
/// transition. Checks come from the approved execution plan, in declared
/// order, and the first failing step ends the attempt. Failed attempts
/// hand their evidence to the repair collaborator and every applied
/// patch set is recorded as an approved repair plan contract. The loop
/// never exceeds its attempt bound.
pub struct VerificationLoop {
    conductor: Arc<Conductor>,
    store: Arc<dyn ControlPlaneStore>,
    gate: ContractGate,
    static_checker: Arc<dyn Checker>,
    runtime_checker: Arc<dyn Checker>,
    repair: Arc<dyn RepairService>,
    config: VerifierConfig,
}

impl VerificationLoop {
    pub fn new(
        conductor: Arc<Conductor>,
        store: Arc<dyn ControlPlaneStore>,
        static_checker: Arc<dyn Checker>,
        runtime_checker: Arc<dyn Checker>,
        repair: Arc<dyn RepairService>,
    ) -> Self {
        Self {
            conductor,
            gate: ContractGate::new(store.clone()),
            store,
            static_checker,
            runtime_checker,
            repair,
            config: VerifierConfig::default(),
        }
    }

    pub fn with_config(mut self, config: VerifierConfig) -> Self {
        self.config = config;
        self
    }

    /// Verify a pipeline that is sitting in the plan's verifying status.
    ///
    /// Returns the verdict, or an error when the run could not execute.
    /// Mid-run errors convert the pipeline to the failed path and append
    /// an unexpected-failure audit event before propagating; refusals
    /// (lock held, wrong stage, unknown pipeline) propagate untouched.
    pub async fn run(
        &self,
        id: &PipelineId,
        workspace: &Workspace,
    ) -> VerifierResult<VerificationOutcome> {
        match self.run_inner(id, workspace).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if !is_refusal(&e) {
                    self.record_unexpected(id, &e).await;
                }
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        id: &PipelineId,
        workspace: &Workspace,
    ) -> VerifierResult<VerificationOutcome> {
        let lock = self.conductor.lock(id)?;

        let snapshot = self.conductor.snapshot(id).await?;
        let verifying = self.conductor.plan().verifying();
        if &snapshot.status != verifying {
            return Err(VerifierError::WrongStage {
                expected: verifying.clone(),
                found: snapshot.status,
            });
        }

        let plan_contract = self
            .gate
            .latest_approved(id, ContractKind::ExecutionPlan)
            .await?
            .ok_or_else(|| VerifierError::MissingExecutionPlan(id.clone()))?;
        let plan_hash = *plan_contract.content_hash().ok_or_else(|| {
            VerifierError::TamperedContract {
                kind: ContractKind::ExecutionPlan.name().to_string(),
            }
        })?;
        if !plan_contract.verify_hash() {
            return Err(VerifierError::TamperedContract {
                kind: ContractKind::ExecutionPlan.name().to_string(),
            });
        }
        let checks = match plan_contract.payload() {
            ContractPayload::ExecutionPlan(plan) => plan.checks.clone(),
            other => {
                return Err(ContractError::Validation(format!(
                    "execution plan contract carries a {} payload",
                    other.kind()
                ))
                .into())
            }
        };

        let mut after_repair = false;
        for attempt in 1..=self.config.max_repair_attempts {
            // Parked abort requests land exactly here, between attempts.
            if let Some(reason) = self.conductor.locks().take_abort_request(id) {
                self.conductor.abort_locked(&lock, &reason).await?;
                return Ok(VerificationOutcome::Aborted { reason });
            }

            info!(
                pipeline = %id,
                attempt,
                steps = checks.len(),
                after_repair,
                "verification attempt started"
            );
            let started_at = Utc::now();
            let (steps, passed) = self.execute_steps(&checks, workspace).await;
            let record = VerificationAttempt {
                pipeline_id: id.clone(),
                attempt,
                steps,
                passed,
                after_repair,
                started_at,
                finished_at: Utc::now(),
            };
            self.store.record_attempt(record.clone()).await?;

            if passed {
                return self.finish_passed(&lock, &record, plan_hash).await;
            }

            let summary = self.summarize(&record);
            warn!(pipeline = %id, attempt, %summary, "verification attempt failed");
            self.store
                .append_event(AuditEvent::new(
                    id.clone(),
                    AuditEventKind::VerificationFailed {
                        attempt,
                        summary: summary.clone(),
                    },
                    summary.clone(),
                ))
                .await?;

            if attempt == self.config.max_repair_attempts {
                self.store
                    .append_event(AuditEvent::new(
                        id.clone(),
                        AuditEventKind::RepairAttemptsExhausted { attempts: attempt },
                        format!("no passing attempt within {} tries", attempt),
                    ))
                    .await?;
                return self.finish_failed(&lock, &record, plan_hash, summary).await;
            }

            match self.request_repair(id, attempt, &record, workspace).await? {
                RepairStep::Applied => after_repair = true,
                RepairStep::Declined { reason } => {
                    return self
                        .finish_failed(&lock, &record, plan_hash, format!("repair declined: {}", reason))
                        .await;
                }
            }
        }

        // Only reachable when the bound is set to zero by hand.
        Ok(VerificationOutcome::Failed {
            attempts: 0,
            summary: "no verification attempts configured".to_string(),
        })
    }

    /// Run the declared checks in order, stopping at the first failure.
    async fn execute_steps(
        &self,
        checks: &[CheckSpec],
        workspace: &Workspace,
    ) -> (Vec<StepRecord>, bool) {
        let mut records = Vec::new();
        for check in checks {
            let checker = match check.kind {
                CheckKind::Static => &self.static_checker,
                CheckKind::Runtime => &self.runtime_checker,
            };
            let outcome = tokio::time::timeout(
                self.config.step_timeout,
                checker.check(&check.command, workspace.root()),
            )
            .await;

            let (passed, exit, evidence) = match outcome {
                Ok(result) if result.passed => (true, StepExit::Clean, String::new()),
                Ok(result) => (false, StepExit::CheckFailed, self.clip_evidence(&result.errors)),
                Err(_) => (
                    false,
                    StepExit::TimedOut,
                    format!("no result within {:?}", self.config.step_timeout),
                ),
            };
            records.push(StepRecord {
                criterion: check.criterion.clone(),
                command: check.command.clone(),
                kind: check.kind,
                passed,
                exit,
                evidence,
            });
            if !passed {
                return (records, false);
            }
        }
        (records, true)
    }

    async fn request_repair(
        &self,
        id: &PipelineId,
        attempt: u32,
        record: &VerificationAttempt,
        workspace: &Workspace,
    ) -> VerifierResult<RepairStep> {
        let request = RepairRequest {
            attempt,
            errors: record.failure_evidence(),
            workspace: workspace.root().to_path_buf(),
        };
        let patches = match self.repair.repair(request).await {
            RepairOutcome::Patches(patches) if !patches.is_empty() => patches,
            RepairOutcome::Patches(_) => {
                let reason = "no patches produced".to_string();
                self.append_declined(id, attempt, &reason).await?;
                return Ok(RepairStep::Declined { reason });
            }
            RepairOutcome::CannotFix { reason } => {
                self.append_declined(id, attempt, &reason).await?;
                return Ok(RepairStep::Declined { reason });
            }
        };

        let mut applied = Vec::new();
        for patch in &patches {
            workspace.apply_patch(patch).await?;
            applied.push(PatchRecord {
                target_path: patch.target_path.clone(),
                content_hash: ContentHash::hash(patch.new_content.as_bytes()),
                bytes: patch.new_content.len() as u64,
            });
        }

        // The applied patch set becomes part of the contract chain.
        let plan_hash = self
            .gate
            .latest_approved(id, ContractKind::ExecutionPlan)
            .await?
            .and_then(|c| c.content_hash().copied());
        let mut upstream = BTreeMap::new();
        if let Some(hash) = plan_hash {
            upstream.insert(ContractKind::ExecutionPlan, hash);
        }
        let draft = self
            .gate
            .draft(
                id,
                ContractPayload::RepairPlan(RepairPlanPayload {
                    attempt,
                    patches: applied,
                }),
                upstream,
            )
            .await?;
        self.gate
            .approve(&draft.id, &ApproverId::system("verifier"))
            .await?;

        info!(pipeline = %id, attempt, patches = patches.len(), "repair patches applied");
        self.store
            .append_event(AuditEvent::new(
                id.clone(),
                AuditEventKind::RepairApplied {
                    attempt,
                    patches: patches.len(),
                },
                format!("applied {} patches after attempt {}", patches.len(), attempt),
            ))
            .await?;
        Ok(RepairStep::Applied)
    }

    async fn append_declined(
        &self,
        id: &PipelineId,
        attempt: u32,
        reason: &str,
    ) -> VerifierResult<()> {
        warn!(pipeline = %id, attempt, reason, "repair declined");
        self.store
            .append_event(AuditEvent::new(
                id.clone(),
                AuditEventKind::RepairDeclined {
                    attempt,
                    reason: reason.to_string(),
                },
                format!("repair declined after attempt {}: {}", attempt, reason),
            ))
            .await?;
        Ok(())
    }

    async fn finish_passed(
        &self,
        lock: &PipelineLock<'_>,
        record: &VerificationAttempt,
        plan_hash: ContentHash,
    ) -> VerifierResult<VerificationOutcome> {
        let id = lock.pipeline().clone();
        self.record_report(&id, record, plan_hash).await?;

        info!(
            pipeline = %id,
            attempt = record.attempt,
            after_repair = record.after_repair,
            "verification passed"
        );
        self.store
            .append_event(AuditEvent::new(
                id.clone(),
                AuditEventKind::VerificationPassed {
                    attempt: record.attempt,
                    after_repair: record.after_repair,
                },
                if record.after_repair {
                    format!("passed after repair on attempt {}", record.attempt)
                } else {
                    format!("passed on attempt {}", record.attempt)
                },
            ))
            .await?;

        for target in self.conductor.plan().passed_path().to_vec() {
            self.conductor
                .transition_locked(lock, &target, "verifier")
                .await?;
        }
        Ok(VerificationOutcome::Passed {
            attempt: record.attempt,
            after_repair: record.after_repair,
        })
    }

    async fn finish_failed(
        &self,
        lock: &PipelineLock<'_>,
        record: &VerificationAttempt,
        plan_hash: ContentHash,
        summary: String,
    ) -> VerifierResult<VerificationOutcome> {
        let id = lock.pipeline().clone();
        self.record_report(&id, record, plan_hash).await?;

        for target in self.conductor.plan().failed_path().to_vec() {
            self.conductor
                .transition_locked(lock, &target, "verifier")
                .await?;
        }
        Ok(VerificationOutcome::Failed {
            attempts: record.attempt,
            summary,
        })
    }

    /// Freeze the final attempt as a verification report contract.
    async fn record_report(
        &self,
        id: &PipelineId,
        record: &VerificationAttempt,
        plan_hash: ContentHash,
    ) -> VerifierResult<()> {
        let mut upstream = BTreeMap::new();
        upstream.insert(ContractKind::ExecutionPlan, plan_hash);
        let draft = self
            .gate
            .draft(
                id,
                ContractPayload::VerificationReport(VerificationReportPayload {
                    attempt: record.attempt,
                    passed: record.passed,
                    after_repair: record.after_repair,
                    steps: record.steps.clone(),
                }),
                upstream,
            )
            .await?;
        self.gate
            .approve(&draft.id, &ApproverId::system("verifier"))
            .await?;
        Ok(())
    }

    fn clip_evidence(&self, errors: &[String]) -> String {
        let mut joined = errors.join("\n");
        if joined.len() > self.config.evidence_limit_bytes {
            let mut cut = self.config.evidence_limit_bytes;
            while !joined.is_char_boundary(cut) {
                cut -= 1;
            }
            joined.truncate(cut);
        }
        joined
    }

    fn summarize(&self, record: &VerificationAttempt) -> String {
        let failures = record.failure_evidence();
        let shown: Vec<String> = failures
            .iter()
            .take(self.config.failure_summary_errors)
            .cloned()
            .collect();
        let hidden = failures.len().saturating_sub(shown.len());
        let mut summary = shown.join("; ");
        if hidden > 0 {
            summary.push_str(&format!(" (+{} more)", hidden));
        }
        summary
    }

    async fn record_unexpected(&self, id: &PipelineId, error: &VerifierError) {
        warn!(pipeline = %id, error = %error, "verification run errored");
        let _ = self
            .store
            .append_event(AuditEvent::new(
                id.clone(),
                AuditEventKind::UnexpectedFailure {
                    detail: error.to_string(),
                },
                format!("verification error: {}", error),
            ))
            .await;

        // Best effort: leave the instance on the failed path rather than
        // wedged in verifying.
        if let Ok(lock) = self.conductor.lock(id) {
            for target in self.conductor.plan().failed_path().to_vec() {
                if self
                    .conductor
                    .transition_locked(&lock, &target, "verifier")
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }
}

enum RepairStep {
    Applied,
    Declined { reason: String },
}

fn is_refusal(error: &VerifierError) -> bool {
    matches!(
        error,
        VerifierError::WrongStage { .. }
            | VerifierError::Conductor(ConductorError::LockViolation(_))
            | VerifierError::Conductor(ConductorError::NotFound(_))
    )
}

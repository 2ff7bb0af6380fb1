use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use greenlight_conductor::{ContractGate, LockRegistry};
use greenlight_contracts::{
    CompletionReportPayload, Contract, ContractKind, ContractPayload, VerificationAttempt,
};
use greenlight_storage::ControlPlaneStore;
use greenlight_types::{
    ApproverId, AuditEvent, AuditEventKind, PipelineId, PipelineRecord, StagePlan,
};
use tracing::{info, warn};

use crate::error::{AuditError, AuditResult};
use crate::report::CompletionReport;

/// The fixed completion battery.
///
/// Re-derives COMPLETE from stored evidence instead of trusting the
/// loop's verdict: instance state, approved contract coverage, hash-chain
/// integrity, and the attempt history. Checks never stop at the first
/// finding, so one report lists everything standing between the pipeline
/// and completion.
pub struct CompletionAuditor {
    plan: StagePlan,
    store: Arc<dyn ControlPlaneStore>,
    locks: Arc<LockRegistry>,
    gate: ContractGate,
}

impl CompletionAuditor {
    pub fn new(
        plan: StagePlan,
        store: Arc<dyn ControlPlaneStore>,
        locks: Arc<LockRegistry>,
    ) -> Self {
        Self {
            plan,
            gate: ContractGate::new(store.clone()),
            store,
            locks,
        }
    }

    /// Run the whole battery and append the verdict to the audit log.
    pub async fn audit(&self, id: &PipelineId) -> AuditResult<CompletionReport> {
        let record = self
            .store
            .get_pipeline(id)
            .await?
            .ok_or_else(|| AuditError::NotFound(id.clone()))?;
        let contracts = self.store.list_contracts(id).await?;
        let attempts = self.store.list_attempts(id).await?;

        // Latest approved contract per kind; the list is oldest first.
        let mut approved: BTreeMap<ContractKind, Contract> = BTreeMap::new();
        for contract in &contracts {
            if contract.status().is_approved() {
                approved.insert(contract.kind, contract.clone());
            }
        }

        let mut failures = Vec::new();
        self.check_instance(&record, &mut failures);
        self.check_required_contracts(&approved, &mut failures);
        self.check_hash_chain(&approved, &mut failures);
        self.check_attempts(&attempts, &approved, &mut failures);

        let report = CompletionReport {
            pipeline_id: id.clone(),
            complete: failures.is_empty(),
            failures,
            checked_contracts: contracts.len(),
            checked_attempts: attempts.len(),
            audited_at: Utc::now(),
        };

        if report.complete {
            info!(pipeline = %id, hash = %report.content_hash(), "completion audit passed");
        } else {
            warn!(
                pipeline = %id,
                findings = report.failures.len(),
                "completion audit found gaps"
            );
        }
        self.store
            .append_event(AuditEvent::new(
                id.clone(),
                AuditEventKind::CompletionAudited {
                    complete: report.complete,
                },
                if report.complete {
                    "complete".to_string()
                } else {
                    format!("{} findings", report.failures.len())
                },
            ))
            .await?;

        Ok(report)
    }

    /// Freeze a verdict as an approved completion report contract.
    pub async fn record(&self, report: &CompletionReport) -> AuditResult<Contract> {
        let draft = self
            .gate
            .draft(
                &report.pipeline_id,
                ContractPayload::CompletionReport(CompletionReportPayload {
                    complete: report.complete,
                    failures: report.failures.clone(),
                }),
                BTreeMap::new(),
            )
            .await?;
        let contract = self
            .gate
            .approve(&draft.id, &ApproverId::system("auditor"))
            .await?;
        Ok(contract)
    }

    fn check_instance(&self, record: &PipelineRecord, failures: &mut Vec<String>) {
        match self.plan.passed_path().last() {
            Some(target) if &record.status == target => {}
            Some(target) => failures.push(format!(
                "instance is in {}, completion requires {}",
                record.status, target
            )),
            None => failures.push("stage plan declares no passed path".to_string()),
        }
        if let Some(reason) = &record.awaiting_human {
            failures.push(format!("instance is awaiting human review: {}", reason));
        }
        if self.locks.is_locked(&record.id) {
            failures.push("instance lock is still held".to_string());
        }
    }

    fn check_required_contracts(
        &self,
        approved: &BTreeMap<ContractKind, Contract>,
        failures: &mut Vec<String>,
    ) {
        for kind in ContractKind::required_for_completion() {
            if !approved.contains_key(kind) {
                failures.push(format!("no approved {} contract", kind));
            }
        }
    }

    fn check_hash_chain(
        &self,
        approved: &BTreeMap<ContractKind, Contract>,
        failures: &mut Vec<String>,
    ) {
        for contract in approved.values() {
            if !contract.verify_hash() {
                failures.push(format!(
                    "{} contract failed hash verification",
                    contract.kind
                ));
            }
            if let Err(e) = contract.validate_upstream(approved) {
                failures.push(format!("{} upstream: {}", contract.kind, e));
            }
        }
    }

    fn check_attempts(
        &self,
        attempts: &[VerificationAttempt],
        approved: &BTreeMap<ContractKind, Contract>,
        failures: &mut Vec<String>,
    ) {
        let last = match attempts.last() {
            Some(last) => last,
            None => {
                failures.push("no verification attempts recorded".to_string());
                return;
            }
        };
        if !last.passed {
            failures.push(format!("final verification attempt {} failed", last.attempt));
        }

        // The frozen report has to agree with the raw attempt history.
        if let Some(contract) = approved.get(&ContractKind::VerificationReport) {
            match contract.payload() {
                ContractPayload::VerificationReport(payload) => {
                    if !payload.passed {
                        failures.push("verification report records a failing run".to_string());
                    }
                    if payload.attempt != last.attempt {
                        failures.push(format!(
                            "verification report covers attempt {}, latest is {}",
                            payload.attempt, last.attempt
                        ));
                    }
                }
                other => failures.push(format!(
                    "verification report contract carries a {} payload",
                    other.kind()
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenlight_contracts::{
        BasePromptPayload, BuildCapability, BuildInstructionPayload, CheckKind, CheckSpec,
        ContentHash, DesignSetPayload, DesignSpec, ExecutionPlanPayload, FlowMapPayload, FlowSpec,
        RuleSetPayload, ScreenSetPayload, ScreenSpec, StepExit, StepRecord,
        VerificationReportPayload,
    };
    use greenlight_storage::{
        AttemptStore, AuditLog, ContractStore, MemoryStore, PipelineStore, QueryWindow,
    };
    use greenlight_types::StageStatus;

    fn setup() -> (CompletionAuditor, Arc<MemoryStore>, Arc<LockRegistry>, ContractGate) {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(LockRegistry::new());
        let auditor =
            CompletionAuditor::new(StagePlan::standard_build(), store.clone(), locks.clone());
        let gate = ContractGate::new(store.clone());
        (auditor, store, locks, gate)
    }

    fn passing_step() -> StepRecord {
        StepRecord {
            criterion: "build passes".to_string(),
            command: "compile".to_string(),
            kind: CheckKind::Static,
            passed: true,
            exit: StepExit::Clean,
            evidence: String::new(),
        }
    }

    fn attempt(id: &PipelineId, number: u32, passed: bool) -> VerificationAttempt {
        let mut step = passing_step();
        if !passed {
            step.passed = false;
            step.exit = StepExit::CheckFailed;
            step.evidence = "compile error".to_string();
        }
        VerificationAttempt {
            pipeline_id: id.clone(),
            attempt: number,
            steps: vec![step],
            passed,
            after_repair: number > 1,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    async fn approve(
        gate: &ContractGate,
        id: &PipelineId,
        payload: ContractPayload,
        upstream: BTreeMap<ContractKind, ContentHash>,
    ) -> Contract {
        let draft = gate.draft(id, payload, upstream).await.unwrap();
        gate.submit(&draft.id).await.unwrap();
        gate.approve(&draft.id, &ApproverId::new("reviewer"))
            .await
            .unwrap()
    }

    fn link(contract: &Contract) -> (ContractKind, ContentHash) {
        (contract.kind, *contract.content_hash().unwrap())
    }

    fn base_prompt(summary: &str) -> ContractPayload {
        ContractPayload::BasePrompt(BasePromptPayload {
            product_summary: summary.to_string(),
            target_platform: "web".to_string(),
            audience: "home cooks".to_string(),
        })
    }

    fn execution_plan() -> ContractPayload {
        ContractPayload::ExecutionPlan(ExecutionPlanPayload {
            milestones: vec!["scaffold".to_string()],
            checks: vec![CheckSpec::new("build passes", "compile", CheckKind::Static)],
        })
    }

    fn screen_set() -> ContractPayload {
        ContractPayload::ScreenSet(ScreenSetPayload {
            screens: vec![ScreenSpec {
                name: "home".to_string(),
                purpose: "browse recipes".to_string(),
            }],
        })
    }

    fn flow_map() -> ContractPayload {
        ContractPayload::FlowMap(FlowMapPayload {
            flows: vec![FlowSpec {
                name: "open recipe".to_string(),
                from_screen: "home".to_string(),
                to_screen: "detail".to_string(),
                trigger: "tap card".to_string(),
            }],
        })
    }

    fn design_set() -> ContractPayload {
        ContractPayload::DesignSet(DesignSetPayload {
            designs: vec![DesignSpec {
                screen: "home".to_string(),
                description: "card grid with search".to_string(),
            }],
        })
    }

    fn rule_set() -> ContractPayload {
        ContractPayload::RuleSet(RuleSetPayload {
            granted: [BuildCapability::CreateFile].into_iter().collect(),
            required_intents: Vec::new(),
            workspace_scope: vec!["src".to_string()],
        })
    }

    fn build_instruction() -> ContractPayload {
        ContractPayload::BuildInstruction(BuildInstructionPayload {
            intent: "implement home screen".to_string(),
            requires: [BuildCapability::CreateFile].into_iter().collect(),
            targets: vec!["src/screens/home.tsx".to_string()],
        })
    }

    fn verification_report(attempt: u32) -> ContractPayload {
        ContractPayload::VerificationReport(VerificationReportPayload {
            attempt,
            passed: true,
            after_repair: attempt > 1,
            steps: vec![passing_step()],
        })
    }

    /// Full evidence trail for a pipeline that genuinely finished.
    async fn complete_pipeline(store: &MemoryStore, gate: &ContractGate, id: &PipelineId) {
        let plan = StagePlan::standard_build();
        store
            .create_pipeline(PipelineRecord::new(id.clone(), plan.initial().clone()))
            .await
            .unwrap();
        store
            .transition_stage(
                id,
                plan.initial(),
                &StageStatus::from("completed"),
                Some("verifier"),
                None,
                Utc::now(),
            )
            .await
            .unwrap();

        let base = approve(gate, id, base_prompt("a recipe box"), BTreeMap::new()).await;
        let exec = approve(gate, id, execution_plan(), BTreeMap::from([link(&base)])).await;
        let screens = approve(gate, id, screen_set(), BTreeMap::from([link(&base)])).await;
        approve(gate, id, flow_map(), BTreeMap::from([link(&screens)])).await;
        approve(gate, id, design_set(), BTreeMap::from([link(&screens)])).await;
        let rules = approve(gate, id, rule_set(), BTreeMap::from([link(&base)])).await;
        approve(gate, id, build_instruction(), BTreeMap::from([link(&rules)])).await;
        approve(gate, id, verification_report(1), BTreeMap::from([link(&exec)])).await;

        store.record_attempt(attempt(id, 1, true)).await.unwrap();
    }

    #[tokio::test]
    async fn finished_pipeline_audits_complete() {
        let (auditor, store, _, gate) = setup();
        let id = PipelineId::new("p-1");
        complete_pipeline(&store, &gate, &id).await;

        let report = auditor.audit(&id).await.unwrap();
        assert!(report.complete, "unexpected findings: {:?}", report.failures);
        assert_eq!(report.checked_contracts, 8);
        assert_eq!(report.checked_attempts, 1);

        let names: Vec<String> = store
            .list_events(&id, QueryWindow::default())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.kind.to_string())
            .collect();
        assert!(names.contains(&"completion_audited:complete".to_string()));
    }

    #[tokio::test]
    async fn battery_collects_every_finding() {
        let (auditor, store, _, _) = setup();
        let id = PipelineId::new("p-1");
        let plan = StagePlan::standard_build();
        store
            .create_pipeline(PipelineRecord::new(id.clone(), plan.initial().clone()))
            .await
            .unwrap();

        let report = auditor.audit(&id).await.unwrap();
        assert!(!report.complete);
        // One finding per gap: wrong status, eight missing kinds, no attempts.
        assert_eq!(report.failures.len(), 10);
        assert!(report
            .failures
            .iter()
            .any(|f| f.contains("completion requires completed")));
        assert!(report.failures.iter().any(|f| f.contains("rule_set")));
        assert!(report
            .failures
            .iter()
            .any(|f| f.contains("no verification attempts")));
    }

    #[tokio::test]
    async fn failed_final_attempt_blocks_completion() {
        let (auditor, store, _, gate) = setup();
        let id = PipelineId::new("p-1");
        complete_pipeline(&store, &gate, &id).await;
        store.record_attempt(attempt(&id, 2, false)).await.unwrap();

        let report = auditor.audit(&id).await.unwrap();
        assert!(!report.complete);
        assert!(report
            .failures
            .iter()
            .any(|f| f.contains("final verification attempt 2 failed")));
        assert!(report
            .failures
            .iter()
            .any(|f| f.contains("covers attempt 1, latest is 2")));
    }

    #[tokio::test]
    async fn stale_upstream_reference_is_detected() {
        let (auditor, store, _, gate) = setup();
        let id = PipelineId::new("p-1");
        complete_pipeline(&store, &gate, &id).await;

        // A newer approved base prompt strands every contract still
        // referencing the old hash.
        approve(&gate, &id, base_prompt("a meal planner"), BTreeMap::new()).await;

        let report = auditor.audit(&id).await.unwrap();
        assert!(!report.complete);
        assert!(report
            .failures
            .iter()
            .any(|f| f.contains("upstream") && f.contains("hash")));
    }

    #[tokio::test]
    async fn held_lock_blocks_completion() {
        let (auditor, store, locks, gate) = setup();
        let id = PipelineId::new("p-1");
        complete_pipeline(&store, &gate, &id).await;

        let _guard = locks.acquire(&id).unwrap();
        let report = auditor.audit(&id).await.unwrap();
        assert!(!report.complete);
        assert!(report.failures.iter().any(|f| f.contains("lock")));
    }

    #[tokio::test]
    async fn rerun_produces_an_identical_report_hash() {
        let (auditor, store, _, gate) = setup();
        let id = PipelineId::new("p-1");
        complete_pipeline(&store, &gate, &id).await;

        let first = auditor.audit(&id).await.unwrap();
        let second = auditor.audit(&id).await.unwrap();
        assert_eq!(first.content_hash(), second.content_hash());
    }

    #[tokio::test]
    async fn record_freezes_the_verdict_as_a_contract() {
        let (auditor, store, _, gate) = setup();
        let id = PipelineId::new("p-1");
        complete_pipeline(&store, &gate, &id).await;

        let report = auditor.audit(&id).await.unwrap();
        let contract = auditor.record(&report).await.unwrap();
        assert_eq!(contract.kind, ContractKind::CompletionReport);
        assert!(contract.status().is_approved());

        let stored = store.get_contract(&contract.id).await.unwrap().unwrap();
        assert!(stored.verify_hash());
    }
}

//! Shared harness for the end-to-end scenario tests.
//!
//! Wires a full control plane over the in-memory store and walks the
//! generative stages the way real stage collaborators would: draft and
//! approve the stage's contract, advance, clear the human gate.

use std::collections::BTreeMap;
use std::sync::Arc;

use greenlight_audit::CompletionAuditor;
use greenlight_conductor::{Conductor, ContractGate};
use greenlight_contracts::{
    BasePromptPayload, BuildCapability, BuildInstructionPayload, CheckKind, CheckSpec, ContentHash,
    Contract, ContractKind, ContractPayload, DesignSetPayload, DesignSpec, ExecutionPlanPayload,
    FlowMapPayload, FlowSpec, RuleSetPayload, ScreenSetPayload, ScreenSpec,
};
use greenlight_storage::{AuditLog, MemoryStore, QueryWindow};
use greenlight_types::{ApproverId, PipelineId, StagePlan, StageStatus};
use greenlight_verifier::{Checker, RepairService, VerificationLoop, VerifierConfig, Workspace};

/// A fully wired control plane for one test.
pub struct TestControlPlane {
    pub store: Arc<MemoryStore>,
    pub conductor: Arc<Conductor>,
    pub gate: ContractGate,
    pub auditor: CompletionAuditor,
    pub reviewer: ApproverId,
}

impl Default for TestControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl TestControlPlane {
    pub fn new() -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let conductor = Arc::new(Conductor::new(StagePlan::standard_build(), store.clone()));
        let auditor = CompletionAuditor::new(
            StagePlan::standard_build(),
            store.clone(),
            conductor.locks().clone(),
        );
        let gate = ContractGate::new(store.clone());
        Self {
            store,
            conductor,
            gate,
            auditor,
            reviewer: ApproverId::new("reviewer"),
        }
    }

    /// Build a verification loop over this plane's store and conductor.
    pub fn verifier(
        &self,
        static_checker: Arc<dyn Checker>,
        runtime_checker: Arc<dyn Checker>,
        repair: Arc<dyn RepairService>,
        config: VerifierConfig,
    ) -> VerificationLoop {
        VerificationLoop::new(
            self.conductor.clone(),
            self.store.clone(),
            static_checker,
            runtime_checker,
            repair,
        )
        .with_config(config)
    }

    /// Draft, submit, and approve one contract as the reviewer.
    pub async fn approve_contract(
        &self,
        id: &PipelineId,
        payload: ContractPayload,
        upstream: BTreeMap<ContractKind, ContentHash>,
    ) -> Contract {
        let draft = self
            .gate
            .draft(id, payload, upstream)
            .await
            .expect("draft contract");
        self.gate.submit(&draft.id).await.expect("submit contract");
        self.gate
            .approve(&draft.id, &self.reviewer)
            .await
            .expect("approve contract")
    }

    /// Advance one stage and clear the human gate if the arrival set one.
    pub async fn advance(&self, id: &PipelineId, to: &str, acting_stage: &str) {
        self.conductor
            .transition(id, &StageStatus::from(to), acting_stage)
            .await
            .expect("stage transition");
        self.conductor
            .resume_after_human(id, &self.reviewer)
            .await
            .expect("resume after human");
    }

    /// Walk every generative stage of the standard plan, approving the
    /// stage contract at each step, and leave the pipeline in `verifying`.
    /// Returns the approved execution plan contract.
    pub async fn run_generative_stages(&self, id: &PipelineId, checks: Vec<CheckSpec>) -> Contract {
        self.conductor.initialize(id).await.expect("initialize");

        let base = self
            .approve_contract(id, base_prompt_payload(), BTreeMap::new())
            .await;
        self.advance(id, "base_prompt_ready", "prompt_writer").await;
        self.advance(id, "planning", "planner").await;

        let plan = self
            .approve_contract(id, execution_plan_payload(checks), upstream_of(&[&base]))
            .await;

        let screens = self
            .approve_contract(id, screen_set_payload(), upstream_of(&[&base]))
            .await;
        self.advance(id, "screens_defined", "screen_designer").await;

        self.approve_contract(id, flow_map_payload(), upstream_of(&[&screens]))
            .await;
        self.advance(id, "flows_defined", "flow_mapper").await;

        self.approve_contract(id, design_set_payload(), upstream_of(&[&screens]))
            .await;
        self.advance(id, "designs_ready", "visual_designer").await;

        let rules = self
            .approve_contract(id, rule_set_payload(), upstream_of(&[&base]))
            .await;
        self.advance(id, "rules_locked", "rule_author").await;

        self.approve_contract(id, build_instruction_payload(), upstream_of(&[&rules]))
            .await;
        self.advance(id, "build_prompts_ready", "prompt_compiler")
            .await;

        self.advance(id, "building", "builder").await;
        self.advance(id, "verifying", "builder").await;
        plan
    }

    /// Current stage status as a plain string.
    pub async fn status(&self, id: &PipelineId) -> String {
        self.conductor
            .snapshot(id)
            .await
            .expect("snapshot")
            .status
            .as_str()
            .to_string()
    }

    /// Wire names of every audit event recorded for a pipeline, in order.
    pub async fn event_names(&self, id: &PipelineId) -> Vec<String> {
        self.store
            .list_events(id, QueryWindow::default())
            .await
            .expect("list events")
            .into_iter()
            .map(|e| e.kind.to_string())
            .collect()
    }
}

/// Upstream reference map from already-approved contracts.
pub fn upstream_of(contracts: &[&Contract]) -> BTreeMap<ContractKind, ContentHash> {
    contracts
        .iter()
        .map(|c| (c.kind, *c.content_hash().expect("approved upstream")))
        .collect()
}

/// Temporary build workspace; keep the `TempDir` alive for the test.
pub fn temp_workspace() -> (tempfile::TempDir, Workspace) {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::new(dir.path());
    (dir, workspace)
}

/// Two-step check list: one static, one runtime.
pub fn default_checks() -> Vec<CheckSpec> {
    vec![
        CheckSpec::new("sources compile", "tsc --noEmit", CheckKind::Static),
        CheckSpec::new("declared screens render", "probe --screens", CheckKind::Runtime),
    ]
}

pub fn base_prompt_payload() -> ContractPayload {
    ContractPayload::BasePrompt(BasePromptPayload {
        product_summary: "a recipe box that suggests weeknight dinners".to_string(),
        target_platform: "web".to_string(),
        audience: "home cooks".to_string(),
    })
}

pub fn execution_plan_payload(checks: Vec<CheckSpec>) -> ContractPayload {
    ContractPayload::ExecutionPlan(ExecutionPlanPayload {
        milestones: vec!["scaffold".to_string(), "implement screens".to_string()],
        checks,
    })
}

pub fn screen_set_payload() -> ContractPayload {
    ContractPayload::ScreenSet(ScreenSetPayload {
        screens: vec![
            ScreenSpec {
                name: "home".to_string(),
                purpose: "browse and search recipes".to_string(),
            },
            ScreenSpec {
                name: "detail".to_string(),
                purpose: "read one recipe".to_string(),
            },
        ],
    })
}

pub fn flow_map_payload() -> ContractPayload {
    ContractPayload::FlowMap(FlowMapPayload {
        flows: vec![FlowSpec {
            name: "open recipe".to_string(),
            from_screen: "home".to_string(),
            to_screen: "detail".to_string(),
            trigger: "tap recipe card".to_string(),
        }],
    })
}

pub fn design_set_payload() -> ContractPayload {
    ContractPayload::DesignSet(DesignSetPayload {
        designs: vec![
            DesignSpec {
                screen: "home".to_string(),
                description: "card grid with a search bar".to_string(),
            },
            DesignSpec {
                screen: "detail".to_string(),
                description: "hero image over ingredient list".to_string(),
            },
        ],
    })
}

pub fn rule_set_payload() -> ContractPayload {
    ContractPayload::RuleSet(RuleSetPayload {
        granted: [BuildCapability::CreateFile, BuildCapability::ModifyFile]
            .into_iter()
            .collect(),
        required_intents: vec!["implement_screen".to_string()],
        workspace_scope: vec!["src".to_string()],
    })
}

pub fn build_instruction_payload() -> ContractPayload {
    ContractPayload::BuildInstruction(BuildInstructionPayload {
        intent: "implement_screen".to_string(),
        requires: [BuildCapability::CreateFile, BuildCapability::ModifyFile]
            .into_iter()
            .collect(),
        targets: vec![
            "src/screens/home.tsx".to_string(),
            "src/screens/detail.tsx".to_string(),
        ],
    })
}

/// Install a subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

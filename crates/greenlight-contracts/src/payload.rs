//! Typed contract payloads.
//!
//! Every contract kind carries a distinct schema, validated at the draft
//! boundary. Build permissions are a closed capability enum: an action
//! outside the enum cannot be expressed at all, so there is no
//! allow/forbid list to keep consistent.

use std::collections::BTreeSet;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::attempt::{CheckSpec, StepRecord};
use crate::error::{ContractError, ContractResult};
use crate::hash::ContentHash;
use crate::kind::ContractKind;

/// Closed set of actions a build stage may be granted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildCapability {
    CreateFile,
    ModifyFile,
    DeleteFile,
    AddDependency,
    RunScript,
    EditConfig,
}

impl BuildCapability {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateFile => "create_file",
            Self::ModifyFile => "modify_file",
            Self::DeleteFile => "delete_file",
            Self::AddDependency => "add_dependency",
            Self::RunScript => "run_script",
            Self::EditConfig => "edit_config",
        }
    }

    /// Capabilities that can destroy work or run arbitrary code.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::DeleteFile | Self::RunScript)
    }
}

impl std::fmt::Display for BuildCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Reject absolute paths and parent traversal in contract-declared paths.
pub fn ensure_relative_path(path: &str) -> ContractResult<()> {
    if path.is_empty() {
        return Err(ContractError::Validation("empty path".to_string()));
    }
    let p = Path::new(path);
    if p.is_absolute() {
        return Err(ContractError::Validation(format!(
            "path must be relative: {}",
            path
        )));
    }
    if p.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ContractError::Validation(format!(
            "path must not traverse upward: {}",
            path
        )));
    }
    Ok(())
}

/// The product idea distilled into a generation-ready prompt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BasePromptPayload {
    pub product_summary: String,
    pub target_platform: String,
    pub audience: String,
}

impl BasePromptPayload {
    fn validate(&self) -> ContractResult<()> {
        if self.product_summary.trim().is_empty() {
            return Err(ContractError::Validation(
                "base prompt needs a product summary".to_string(),
            ));
        }
        Ok(())
    }
}

/// Build milestones plus the ordered verification checks the verifier
/// will execute verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlanPayload {
    pub milestones: Vec<String>,
    pub checks: Vec<CheckSpec>,
}

impl ExecutionPlanPayload {
    fn validate(&self) -> ContractResult<()> {
        if self.checks.is_empty() {
            return Err(ContractError::Validation(
                "execution plan declares no verification checks".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for check in &self.checks {
            if check.criterion.trim().is_empty() {
                return Err(ContractError::Validation(
                    "verification check has an empty criterion".to_string(),
                ));
            }
            if !seen.insert(check.criterion.as_str()) {
                return Err(ContractError::Validation(format!(
                    "duplicate verification criterion: {}",
                    check.criterion
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScreenSpec {
    pub name: String,
    pub purpose: String,
}

/// The screens the product is made of.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScreenSetPayload {
    pub screens: Vec<ScreenSpec>,
}

impl ScreenSetPayload {
    fn validate(&self) -> ContractResult<()> {
        if self.screens.is_empty() {
            return Err(ContractError::Validation(
                "screen set is empty".to_string(),
            ));
        }
        let mut names = BTreeSet::new();
        for screen in &self.screens {
            if !names.insert(screen.name.as_str()) {
                return Err(ContractError::Validation(format!(
                    "duplicate screen name: {}",
                    screen.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowSpec {
    pub name: String,
    pub from_screen: String,
    pub to_screen: String,
    pub trigger: String,
}

/// Navigation flows between declared screens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowMapPayload {
    pub flows: Vec<FlowSpec>,
}

impl FlowMapPayload {
    fn validate(&self) -> ContractResult<()> {
        if self.flows.is_empty() {
            return Err(ContractError::Validation("flow map is empty".to_string()));
        }
        let mut names = BTreeSet::new();
        for flow in &self.flows {
            if !names.insert(flow.name.as_str()) {
                return Err(ContractError::Validation(format!(
                    "duplicate flow name: {}",
                    flow.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DesignSpec {
    pub screen: String,
    pub description: String,
}

/// Visual designs, one per screen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DesignSetPayload {
    pub designs: Vec<DesignSpec>,
}

impl DesignSetPayload {
    fn validate(&self) -> ContractResult<()> {
        if self.designs.is_empty() {
            return Err(ContractError::Validation(
                "design set is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// What build stages are allowed to do, as granted capabilities.
/// Anything outside [`BuildCapability`] is unrepresentable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleSetPayload {
    pub granted: BTreeSet<BuildCapability>,
    /// Intents every build instruction must declare one of.
    pub required_intents: Vec<String>,
    /// Relative paths the build may touch.
    pub workspace_scope: Vec<String>,
}

impl RuleSetPayload {
    fn validate(&self) -> ContractResult<()> {
        if self.granted.is_empty() {
            return Err(ContractError::Validation(
                "rule set grants no capabilities".to_string(),
            ));
        }
        if self.required_intents.iter().any(|i| i.trim().is_empty()) {
            return Err(ContractError::Validation(
                "rule set lists an empty required intent".to_string(),
            ));
        }
        for path in &self.workspace_scope {
            ensure_relative_path(path)?;
        }
        Ok(())
    }

    pub fn grants(&self, capability: BuildCapability) -> bool {
        self.granted.contains(&capability)
    }
}

/// One reviewed instruction for the building stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildInstructionPayload {
    /// Declared intent, checked against the rule set's required intents.
    pub intent: String,
    pub requires: BTreeSet<BuildCapability>,
    /// Relative paths this instruction will touch.
    pub targets: Vec<String>,
}

impl BuildInstructionPayload {
    fn validate(&self) -> ContractResult<()> {
        if self.intent.trim().is_empty() {
            return Err(ContractError::Validation(
                "build instruction has no intent".to_string(),
            ));
        }
        for path in &self.targets {
            ensure_relative_path(path)?;
        }
        Ok(())
    }

    /// Check this instruction against an approved rule set: required
    /// intent declared, requested capabilities all granted.
    pub fn permitted_by(&self, rules: &RuleSetPayload) -> ContractResult<()> {
        if !rules.required_intents.is_empty() && !rules.required_intents.contains(&self.intent) {
            return Err(ContractError::Validation(format!(
                "intent '{}' is not among the rule set's required intents",
                self.intent
            )));
        }
        for capability in &self.requires {
            if !rules.grants(*capability) {
                return Err(ContractError::Validation(format!(
                    "capability '{}' is not granted by the rule set",
                    capability
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of the final verification attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationReportPayload {
    pub attempt: u32,
    pub passed: bool,
    pub after_repair: bool,
    pub steps: Vec<StepRecord>,
}

impl VerificationReportPayload {
    fn validate(&self) -> ContractResult<()> {
        if self.attempt == 0 {
            return Err(ContractError::Validation(
                "verification attempts are 1-based".to_string(),
            ));
        }
        if self.steps.is_empty() {
            return Err(ContractError::Validation(
                "verification report records no steps".to_string(),
            ));
        }
        Ok(())
    }
}

/// Record of one applied patch. The patched bytes live in the workspace;
/// the contract keeps their hash for traceability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchRecord {
    pub target_path: String,
    pub content_hash: ContentHash,
    pub bytes: u64,
}

/// Patches applied by one repair round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepairPlanPayload {
    pub attempt: u32,
    pub patches: Vec<PatchRecord>,
}

impl RepairPlanPayload {
    fn validate(&self) -> ContractResult<()> {
        if self.patches.is_empty() {
            return Err(ContractError::Validation(
                "repair plan contains no patches".to_string(),
            ));
        }
        for patch in &self.patches {
            ensure_relative_path(&patch.target_path)?;
        }
        Ok(())
    }
}

/// The completion auditor's verdict.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionReportPayload {
    pub complete: bool,
    pub failures: Vec<String>,
}

impl CompletionReportPayload {
    fn validate(&self) -> ContractResult<()> {
        if self.complete && !self.failures.is_empty() {
            return Err(ContractError::Validation(
                "complete verdict cannot carry failure reasons".to_string(),
            ));
        }
        if !self.complete && self.failures.is_empty() {
            return Err(ContractError::Validation(
                "incomplete verdict must list failure reasons".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tagged union of every contract payload. The tag doubles as the wire
/// name of the contract kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContractPayload {
    BasePrompt(BasePromptPayload),
    ExecutionPlan(ExecutionPlanPayload),
    ScreenSet(ScreenSetPayload),
    FlowMap(FlowMapPayload),
    DesignSet(DesignSetPayload),
    RuleSet(RuleSetPayload),
    BuildInstruction(BuildInstructionPayload),
    VerificationReport(VerificationReportPayload),
    RepairPlan(RepairPlanPayload),
    CompletionReport(CompletionReportPayload),
}

impl ContractPayload {
    pub fn kind(&self) -> ContractKind {
        match self {
            Self::BasePrompt(_) => ContractKind::BasePrompt,
            Self::ExecutionPlan(_) => ContractKind::ExecutionPlan,
            Self::ScreenSet(_) => ContractKind::ScreenSet,
            Self::FlowMap(_) => ContractKind::FlowMap,
            Self::DesignSet(_) => ContractKind::DesignSet,
            Self::RuleSet(_) => ContractKind::RuleSet,
            Self::BuildInstruction(_) => ContractKind::BuildInstruction,
            Self::VerificationReport(_) => ContractKind::VerificationReport,
            Self::RepairPlan(_) => ContractKind::RepairPlan,
            Self::CompletionReport(_) => ContractKind::CompletionReport,
        }
    }

    /// Schema validation at the draft boundary.
    pub fn validate(&self) -> ContractResult<()> {
        match self {
            Self::BasePrompt(p) => p.validate(),
            Self::ExecutionPlan(p) => p.validate(),
            Self::ScreenSet(p) => p.validate(),
            Self::FlowMap(p) => p.validate(),
            Self::DesignSet(p) => p.validate(),
            Self::RuleSet(p) => p.validate(),
            Self::BuildInstruction(p) => p.validate(),
            Self::VerificationReport(p) => p.validate(),
            Self::RepairPlan(p) => p.validate(),
            Self::CompletionReport(p) => p.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::CheckKind;

    #[test]
    fn payload_tag_matches_kind_name() {
        let payload = ContractPayload::RuleSet(RuleSetPayload {
            granted: BTreeSet::from([BuildCapability::CreateFile]),
            required_intents: vec![],
            workspace_scope: vec![],
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "rule_set");
        assert_eq!(payload.kind().name(), "rule_set");
    }

    #[test]
    fn empty_rule_set_rejected() {
        let payload = ContractPayload::RuleSet(RuleSetPayload {
            granted: BTreeSet::new(),
            required_intents: vec![],
            workspace_scope: vec![],
        });
        assert!(matches!(
            payload.validate(),
            Err(ContractError::Validation(_))
        ));
    }

    #[test]
    fn rule_set_scope_must_stay_relative() {
        let payload = ContractPayload::RuleSet(RuleSetPayload {
            granted: BTreeSet::from([BuildCapability::CreateFile]),
            required_intents: vec![],
            workspace_scope: vec!["src/../../etc/passwd".to_string()],
        });
        assert!(payload.validate().is_err());

        let absolute = ContractPayload::RuleSet(RuleSetPayload {
            granted: BTreeSet::from([BuildCapability::CreateFile]),
            required_intents: vec![],
            workspace_scope: vec!["/etc/passwd".to_string()],
        });
        assert!(absolute.validate().is_err());
    }

    #[test]
    fn instruction_requires_granted_capabilities() {
        let rules = RuleSetPayload {
            granted: BTreeSet::from([BuildCapability::CreateFile, BuildCapability::ModifyFile]),
            required_intents: vec!["implement_screen".to_string()],
            workspace_scope: vec!["src".to_string()],
        };

        let ok = BuildInstructionPayload {
            intent: "implement_screen".to_string(),
            requires: BTreeSet::from([BuildCapability::CreateFile]),
            targets: vec!["src/home.tsx".to_string()],
        };
        assert!(ok.permitted_by(&rules).is_ok());

        let ungranted = BuildInstructionPayload {
            intent: "implement_screen".to_string(),
            requires: BTreeSet::from([BuildCapability::RunScript]),
            targets: vec!["src/home.tsx".to_string()],
        };
        assert!(ungranted.permitted_by(&rules).is_err());

        let wrong_intent = BuildInstructionPayload {
            intent: "redesign_everything".to_string(),
            requires: BTreeSet::new(),
            targets: vec![],
        };
        assert!(wrong_intent.permitted_by(&rules).is_err());
    }

    #[test]
    fn duplicate_criteria_rejected() {
        let payload = ContractPayload::ExecutionPlan(ExecutionPlanPayload {
            milestones: vec!["scaffold".to_string()],
            checks: vec![
                CheckSpec::new("build passes", "compile", CheckKind::Static),
                CheckSpec::new("build passes", "compile again", CheckKind::Static),
            ],
        });
        assert!(payload.validate().is_err());
    }

    #[test]
    fn completion_report_consistency() {
        let bad = CompletionReportPayload {
            complete: true,
            failures: vec!["leftover".to_string()],
        };
        assert!(bad.validate().is_err());

        let good = CompletionReportPayload {
            complete: false,
            failures: vec!["rule set missing".to_string()],
        };
        assert!(good.validate().is_ok());
    }
}

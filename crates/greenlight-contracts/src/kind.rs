use serde::{Deserialize, Serialize};

/// Closed set of contract kinds produced across a pipeline run.
///
/// Ordering follows the pipeline chain so sorted maps of upstream
/// references read in generation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    BasePrompt,
    ExecutionPlan,
    ScreenSet,
    FlowMap,
    DesignSet,
    RuleSet,
    BuildInstruction,
    VerificationReport,
    RepairPlan,
    CompletionReport,
}

impl ContractKind {
    /// Stable wire name, also used in hash preimages and audit events.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BasePrompt => "base_prompt",
            Self::ExecutionPlan => "execution_plan",
            Self::ScreenSet => "screen_set",
            Self::FlowMap => "flow_map",
            Self::DesignSet => "design_set",
            Self::RuleSet => "rule_set",
            Self::BuildInstruction => "build_instruction",
            Self::VerificationReport => "verification_report",
            Self::RepairPlan => "repair_plan",
            Self::CompletionReport => "completion_report",
        }
    }

    /// Kinds that must be approved before a pipeline may be judged
    /// complete. Repair plans are optional (only present when repairs
    /// ran) and the completion report is the audit's own output.
    pub fn required_for_completion() -> &'static [ContractKind] {
        &[
            Self::BasePrompt,
            Self::ExecutionPlan,
            Self::ScreenSet,
            Self::FlowMap,
            Self::DesignSet,
            Self::RuleSet,
            Self::BuildInstruction,
            Self::VerificationReport,
        ]
    }
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

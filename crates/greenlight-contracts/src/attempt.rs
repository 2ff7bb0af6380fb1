//! Verification vocabulary: check specifications declared by the
//! execution plan, per-step records, and the persisted attempt.

use chrono::{DateTime, Utc};
use greenlight_types::PipelineId;
use serde::{Deserialize, Serialize};

/// Which checker a verification step dispatches to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Static,
    Runtime,
}

impl CheckKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Runtime => "runtime",
        }
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One verification step as declared by the approved execution plan.
///
/// The loop executes these verbatim: declared order, no merging, no
/// invented steps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckSpec {
    /// What this step proves, e.g. "all declared screens render".
    pub criterion: String,
    /// Command or check description shown in reports.
    pub command: String,
    pub kind: CheckKind,
}

impl CheckSpec {
    pub fn new(criterion: impl Into<String>, command: impl Into<String>, kind: CheckKind) -> Self {
        Self {
            criterion: criterion.into(),
            command: command.into(),
            kind,
        }
    }
}

/// Exit indicator recorded for an executed step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepExit {
    Clean,
    CheckFailed,
    TimedOut,
}

/// Record of one executed verification step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub criterion: String,
    pub command: String,
    pub kind: CheckKind,
    pub passed: bool,
    pub exit: StepExit,
    /// Diagnostic excerpt, truncated to the verifier's evidence bound.
    pub evidence: String,
}

/// One verify-then-maybe-repair cycle, persisted immutably.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationAttempt {
    pub pipeline_id: PipelineId,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Steps actually executed, in declared order. Short-circuiting means
    /// this may be a prefix of the planned checks.
    pub steps: Vec<StepRecord>,
    pub passed: bool,
    /// True when a repair ran before this attempt.
    pub after_repair: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl VerificationAttempt {
    pub fn failing_steps(&self) -> Vec<&StepRecord> {
        self.steps.iter().filter(|s| !s.passed).collect()
    }

    pub fn first_failure(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| !s.passed)
    }

    /// Ordered failure evidence handed to the repair collaborator.
    pub fn failure_evidence(&self) -> Vec<String> {
        self.failing_steps()
            .iter()
            .map(|s| format!("{}: {}", s.criterion, s.evidence))
            .collect()
    }
}

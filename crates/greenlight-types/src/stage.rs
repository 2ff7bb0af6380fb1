//! Stage plans: the declared legal-transition table for a pipeline.
//!
//! The exact status set is configuration, not hard-coded. A plan declares
//! its statuses implicitly through edges, marks which edges pause the
//! pipeline for human review, and names the verification fork that the
//! verifier walks after a passing or failing attempt.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A pipeline stage status. String-backed so the status set stays plan
/// configuration rather than a hard-coded enum.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageStatus(pub String);

impl StageStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StageStatus {
    fn from(status: &str) -> Self {
        Self(status.to_string())
    }
}

impl From<String> for StageStatus {
    fn from(status: String) -> Self {
        Self(status)
    }
}

/// One declared legal transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEdge {
    pub from: StageStatus,
    pub to: StageStatus,
    /// Present when arriving at `to` pauses the pipeline for human review.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_reason: Option<String>,
}

/// Errors raised while building a stage plan.
#[derive(Debug, Error)]
pub enum StagePlanError {
    #[error("stage plan '{0}' declares no edges")]
    Empty(String),

    #[error("duplicate edge: {from} -> {to}")]
    DuplicateEdge { from: String, to: String },

    #[error("status '{0}' is not declared by any edge")]
    UnknownStatus(String),

    #[error("initial status '{0}' must not be terminal")]
    InitialTerminal(String),

    #[error("terminal status '{0}' declares outgoing edges")]
    TerminalWithSuccessors(String),

    #[error("verification path step {from} -> {to} is not a declared edge")]
    PathNotDeclared { from: String, to: String },

    #[error("verification path must end in a terminal status, got '{0}'")]
    PathNotTerminal(String),
}

/// Validated legal-transition table for one pipeline shape.
///
/// Construction goes through [`StagePlan::builder`], which rejects
/// malformed tables up front so the conductor can trust every lookup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StagePlan {
    name: String,
    initial: StageStatus,
    edges: Vec<StageEdge>,
    terminal: BTreeSet<StageStatus>,
    verifying: StageStatus,
    passed_path: Vec<StageStatus>,
    failed_path: Vec<StageStatus>,
    aborted: StageStatus,
}

impl StagePlan {
    pub fn builder(name: impl Into<String>, initial: impl Into<StageStatus>) -> StagePlanBuilder {
        StagePlanBuilder::new(name, initial)
    }

    /// The standard application build plan observed in the domain: each
    /// generative stage hands its artifact to a human gate, then building
    /// and verification run machine-gated to the terminal fork.
    pub fn standard_build() -> Self {
        Self::builder("app_build", "idea")
            .gated_edge("idea", "base_prompt_ready", "base prompt awaiting review")
            .edge("base_prompt_ready", "planning")
            .gated_edge("planning", "screens_defined", "screen set awaiting review")
            .gated_edge("screens_defined", "flows_defined", "flow map awaiting review")
            .gated_edge("flows_defined", "designs_ready", "design set awaiting review")
            .gated_edge("designs_ready", "rules_locked", "rule set awaiting review")
            .gated_edge(
                "rules_locked",
                "build_prompts_ready",
                "build instructions awaiting review",
            )
            .edge("build_prompts_ready", "building")
            .edge("building", "verifying")
            .edge("verifying", "verified")
            .edge("verifying", "verification_failed")
            .edge("verified", "completed")
            .edge("verification_failed", "failed")
            .terminal("completed")
            .terminal("failed")
            .verification("verifying", ["verified", "completed"], ["verification_failed", "failed"])
            .build()
            .expect("standard build plan is valid")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial(&self) -> &StageStatus {
        &self.initial
    }

    pub fn edges(&self) -> &[StageEdge] {
        &self.edges
    }

    /// Every status the plan knows about, including the abort escape state.
    pub fn statuses(&self) -> BTreeSet<StageStatus> {
        let mut all = BTreeSet::new();
        all.insert(self.initial.clone());
        all.insert(self.aborted.clone());
        for edge in &self.edges {
            all.insert(edge.from.clone());
            all.insert(edge.to.clone());
        }
        all
    }

    pub fn contains(&self, status: &StageStatus) -> bool {
        self.statuses().contains(status)
    }

    /// Whether `from -> to` is a declared legal transition.
    pub fn allows(&self, from: &StageStatus, to: &StageStatus) -> bool {
        self.edges.iter().any(|e| &e.from == from && &e.to == to)
    }

    pub fn successors(&self, from: &StageStatus) -> Vec<&StageStatus> {
        self.edges
            .iter()
            .filter(|e| &e.from == from)
            .map(|e| &e.to)
            .collect()
    }

    /// The review reason recorded when `from -> to` pauses for a human.
    pub fn gate_reason(&self, from: &StageStatus, to: &StageStatus) -> Option<&str> {
        self.edges
            .iter()
            .find(|e| &e.from == from && &e.to == to)
            .and_then(|e| e.gate_reason.as_deref())
    }

    pub fn is_terminal(&self, status: &StageStatus) -> bool {
        self.terminal.contains(status) || status == &self.aborted
    }

    /// Status the verification loop runs in.
    pub fn verifying(&self) -> &StageStatus {
        &self.verifying
    }

    /// Statuses walked, in order, after a passing attempt.
    pub fn passed_path(&self) -> &[StageStatus] {
        &self.passed_path
    }

    /// Statuses walked, in order, after the final failing attempt.
    pub fn failed_path(&self) -> &[StageStatus] {
        &self.failed_path
    }

    /// Terminal escape state for cancelled instances.
    pub fn aborted(&self) -> &StageStatus {
        &self.aborted
    }
}

/// Builder for [`StagePlan`]. Collects edges first; `build` validates the
/// whole table at once.
pub struct StagePlanBuilder {
    name: String,
    initial: StageStatus,
    edges: Vec<StageEdge>,
    terminal: BTreeSet<StageStatus>,
    verifying: Option<StageStatus>,
    passed_path: Vec<StageStatus>,
    failed_path: Vec<StageStatus>,
    aborted: StageStatus,
}

impl StagePlanBuilder {
    fn new(name: impl Into<String>, initial: impl Into<StageStatus>) -> Self {
        Self {
            name: name.into(),
            initial: initial.into(),
            edges: Vec::new(),
            terminal: BTreeSet::new(),
            verifying: None,
            passed_path: Vec::new(),
            failed_path: Vec::new(),
            aborted: StageStatus::new("aborted"),
        }
    }

    pub fn edge(mut self, from: impl Into<StageStatus>, to: impl Into<StageStatus>) -> Self {
        self.edges.push(StageEdge {
            from: from.into(),
            to: to.into(),
            gate_reason: None,
        });
        self
    }

    /// Declare a transition that pauses for human review on arrival.
    pub fn gated_edge(
        mut self,
        from: impl Into<StageStatus>,
        to: impl Into<StageStatus>,
        reason: impl Into<String>,
    ) -> Self {
        self.edges.push(StageEdge {
            from: from.into(),
            to: to.into(),
            gate_reason: Some(reason.into()),
        });
        self
    }

    pub fn terminal(mut self, status: impl Into<StageStatus>) -> Self {
        self.terminal.insert(status.into());
        self
    }

    /// Name the verification status and the ordered status paths walked
    /// after a passing or failing attempt.
    pub fn verification<'a>(
        mut self,
        verifying: impl Into<StageStatus>,
        passed_path: impl IntoIterator<Item = &'a str>,
        failed_path: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        self.verifying = Some(verifying.into());
        self.passed_path = passed_path.into_iter().map(StageStatus::from).collect();
        self.failed_path = failed_path.into_iter().map(StageStatus::from).collect();
        self
    }

    /// Override the terminal escape state for cancelled instances
    /// (defaults to `aborted`).
    pub fn aborted(mut self, status: impl Into<StageStatus>) -> Self {
        self.aborted = status.into();
        self
    }

    pub fn build(self) -> Result<StagePlan, StagePlanError> {
        if self.edges.is_empty() {
            return Err(StagePlanError::Empty(self.name));
        }

        let mut seen = BTreeSet::new();
        for edge in &self.edges {
            if !seen.insert((edge.from.clone(), edge.to.clone())) {
                return Err(StagePlanError::DuplicateEdge {
                    from: edge.from.to_string(),
                    to: edge.to.to_string(),
                });
            }
        }

        let mut declared: BTreeSet<&StageStatus> = BTreeSet::new();
        for edge in &self.edges {
            declared.insert(&edge.from);
            declared.insert(&edge.to);
        }

        if !declared.contains(&self.initial) {
            return Err(StagePlanError::UnknownStatus(self.initial.to_string()));
        }
        if self.terminal.contains(&self.initial) {
            return Err(StagePlanError::InitialTerminal(self.initial.to_string()));
        }

        for status in &self.terminal {
            if !declared.contains(status) {
                return Err(StagePlanError::UnknownStatus(status.to_string()));
            }
            if self.edges.iter().any(|e| &e.from == status) {
                return Err(StagePlanError::TerminalWithSuccessors(status.to_string()));
            }
        }

        let verifying = match self.verifying {
            Some(v) => v,
            None => return Err(StagePlanError::UnknownStatus("verifying".to_string())),
        };
        if !declared.contains(&verifying) {
            return Err(StagePlanError::UnknownStatus(verifying.to_string()));
        }

        for path in [&self.passed_path, &self.failed_path] {
            let mut cursor = &verifying;
            for next in path.iter() {
                let edge_declared = self
                    .edges
                    .iter()
                    .any(|e| &e.from == cursor && &e.to == next);
                if !edge_declared {
                    return Err(StagePlanError::PathNotDeclared {
                        from: cursor.to_string(),
                        to: next.to_string(),
                    });
                }
                cursor = next;
            }
            match path.last() {
                Some(last) if self.terminal.contains(last) => {}
                Some(last) => return Err(StagePlanError::PathNotTerminal(last.to_string())),
                None => return Err(StagePlanError::PathNotTerminal(verifying.to_string())),
            }
        }

        Ok(StagePlan {
            name: self.name,
            initial: self.initial,
            edges: self.edges,
            terminal: self.terminal,
            verifying,
            passed_path: self.passed_path,
            failed_path: self.failed_path,
            aborted: self.aborted,
        })
    }
}

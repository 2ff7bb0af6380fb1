//! Scripted collaborators for testing the loop without real tooling.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::checker::{CheckOutcome, Checker};
use crate::repair::{RepairOutcome, RepairRequest, RepairService};

/// Checker that replays a scripted sequence of outcomes, then falls back
/// to a fixed one.
pub struct ScriptedChecker {
    script: Mutex<VecDeque<CheckOutcome>>,
    fallback: CheckOutcome,
    calls: AtomicUsize,
}

impl ScriptedChecker {
    /// Every check passes.
    pub fn passing() -> Self {
        Self::with_fallback(Vec::new(), CheckOutcome::pass())
    }

    /// Every check fails with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_fallback(Vec::new(), CheckOutcome::fail([message.into()]))
    }

    /// Replay `outcomes` in order, passing once the script is exhausted.
    pub fn script(outcomes: impl IntoIterator<Item = CheckOutcome>) -> Self {
        Self::with_fallback(outcomes.into_iter().collect(), CheckOutcome::pass())
    }

    fn with_fallback(outcomes: Vec<CheckOutcome>, fallback: CheckOutcome) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of checks executed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<CheckOutcome>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    async fn check(&self, _command: &str, _workspace: &Path) -> CheckOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queue()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Repair collaborator that replays scripted outcomes.
pub struct ScriptedRepair {
    script: Mutex<VecDeque<RepairOutcome>>,
    fallback: RepairOutcome,
    calls: AtomicUsize,
}

impl ScriptedRepair {
    /// Always declines with the given reason.
    pub fn declining(reason: impl Into<String>) -> Self {
        Self::with_fallback(
            Vec::new(),
            RepairOutcome::CannotFix {
                reason: reason.into(),
            },
        )
    }

    /// Always returns the same patch set.
    pub fn patching(patches: Vec<crate::repair::RepairPatch>) -> Self {
        Self::with_fallback(Vec::new(), RepairOutcome::Patches(patches))
    }

    /// Replay `outcomes` in order, declining once the script is exhausted.
    pub fn script(outcomes: impl IntoIterator<Item = RepairOutcome>) -> Self {
        Self::with_fallback(
            outcomes.into_iter().collect(),
            RepairOutcome::CannotFix {
                reason: "repair script exhausted".to_string(),
            },
        )
    }

    fn with_fallback(outcomes: Vec<RepairOutcome>, fallback: RepairOutcome) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of repair requests received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<RepairOutcome>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RepairService for ScriptedRepair {
    async fn repair(&self, _request: RepairRequest) -> RepairOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queue()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

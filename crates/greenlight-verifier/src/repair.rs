use std::path::PathBuf;

use async_trait::async_trait;

/// Evidence handed to the repair collaborator after a failed attempt.
#[derive(Clone, Debug)]
pub struct RepairRequest {
    pub attempt: u32,
    /// Clipped evidence lines from the failing step, newest attempt only.
    pub errors: Vec<String>,
    pub workspace: PathBuf,
}

/// One full-file replacement produced by the repair collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepairPatch {
    /// Path relative to the workspace root.
    pub target_path: String,
    pub new_content: String,
}

/// What the repair collaborator decided.
#[derive(Clone, Debug)]
pub enum RepairOutcome {
    /// Replacements to apply before the next attempt.
    Patches(Vec<RepairPatch>),
    /// No fix is possible. The loop fails the pipeline without burning
    /// the remaining attempts.
    CannotFix { reason: String },
}

/// Produces repair patches from verification evidence.
#[async_trait]
pub trait RepairService: Send + Sync {
    async fn repair(&self, request: RepairRequest) -> RepairOutcome;
}

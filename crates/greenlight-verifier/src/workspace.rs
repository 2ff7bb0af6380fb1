use std::path::{Path, PathBuf};

use greenlight_contracts::ensure_relative_path;
use tokio::fs;

use crate::error::{VerifierError, VerifierResult};
use crate::repair::RepairPatch;

/// The generated application tree that checks run against and repair
/// patches land in.
#[derive(Clone, Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write one full-file replacement under the root, creating parent
    /// directories as needed.
    ///
    /// The target must stay inside the workspace: absolute paths and
    /// parent traversal are refused before anything is written. Patches
    /// apply one at a time with no rollback, so a failed write leaves
    /// earlier patches in place.
    pub async fn apply_patch(&self, patch: &RepairPatch) -> VerifierResult<()> {
        ensure_relative_path(&patch.target_path)
            .map_err(|e| VerifierError::PatchRejected(e.to_string()))?;

        let target = self.root.join(&patch.target_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, patch.new_content.as_bytes()).await?;
        Ok(())
    }
}

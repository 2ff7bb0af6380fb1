use std::path::Path;

use async_trait::async_trait;

/// Result of running one check command against the workspace.
#[derive(Clone, Debug, Default)]
pub struct CheckOutcome {
    pub passed: bool,
    /// Failure output, one entry per finding. Empty on a pass.
    pub errors: Vec<String>,
}

impl CheckOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            errors: Vec::new(),
        }
    }

    pub fn fail(errors: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            passed: false,
            errors: errors.into_iter().map(Into::into).collect(),
        }
    }
}

/// Runs one verification command in the generated workspace.
///
/// Static analysis and runtime checks share this interface; the loop
/// dispatches on the step's declared kind. Implementations fold their own
/// infrastructure failures into a failing outcome rather than erroring,
/// so the loop treats every check result as attempt data. An
/// implementation that drives an external session (a browser, a dev
/// server) must release it on every exit path, timeout included, and
/// report errors in a stable order so repeated runs produce comparable
/// evidence.
#[async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, command: &str, workspace: &Path) -> CheckOutcome;
}

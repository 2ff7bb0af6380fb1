use chrono::{DateTime, Utc};
use greenlight_contracts::{canonical_json_bytes, ContentHash};
use greenlight_types::PipelineId;
use serde::{Deserialize, Serialize};

/// Verdict of one completion audit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionReport {
    pub pipeline_id: PipelineId,
    pub complete: bool,
    /// One entry per finding, in battery order. Empty when complete.
    pub failures: Vec<String>,
    pub checked_contracts: usize,
    pub checked_attempts: usize,
    pub audited_at: DateTime<Utc>,
}

impl CompletionReport {
    /// Deterministic digest of the verdict. `audited_at` is excluded so
    /// re-auditing unchanged state produces an identical hash.
    pub fn content_hash(&self) -> ContentHash {
        let value = serde_json::json!({
            "pipeline_id": self.pipeline_id.0,
            "complete": self.complete,
            "failures": self.failures,
            "checked_contracts": self.checked_contracts,
            "checked_attempts": self.checked_attempts,
        });
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"greenlight-report-v1:");
        hasher.update(&canonical_json_bytes(&value));
        ContentHash::from_bytes(hasher.finalize().into())
    }
}

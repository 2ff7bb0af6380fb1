use chrono::{DateTime, Utc};
use greenlight_types::{AuditEventKind, PipelineId};
use serde::{Deserialize, Serialize};

/// Persistent tamper-evident audit record. Sequence and hashes are
/// assigned by storage at append time; the chain is per pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event_id: String,
    /// 1-based position within this pipeline's chain.
    pub sequence: u64,
    pub pipeline_id: PipelineId,
    pub kind: AuditEventKind,
    pub message: String,
    pub at: DateTime<Utc>,
    /// Hash of the previous record in this pipeline's chain.
    pub previous_hash: Option<String>,
    pub hash: String,
}

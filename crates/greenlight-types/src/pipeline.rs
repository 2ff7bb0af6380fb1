use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::PipelineId;
use crate::stage::StageStatus;

/// Persistent record of one pipeline instance.
///
/// Mutated exclusively through the conductor; never deleted while
/// contracts reference it. The mutual-exclusion lock is not part of the
/// record: it lives in the in-process lock registry, so a crash can never
/// leave a stale lock behind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub id: PipelineId,
    pub status: StageStatus,
    /// Review reason while the pipeline waits on a human, cleared on resume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awaiting_human: Option<String>,
    /// Name of the stage that last acted on the instance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_stage: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRecord {
    pub fn new(id: PipelineId, initial: StageStatus) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: initial,
            awaiting_human: None,
            last_stage: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_awaiting_human(&self) -> bool {
        self.awaiting_human.is_some()
    }
}

/// Read-only view of an instance returned by the conductor.
///
/// `locked` is derived from the live lock registry at snapshot time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub status: StageStatus,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awaiting_human: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_stage: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_starts_clean() {
        let record = PipelineRecord::new(PipelineId::new("p-1"), StageStatus::from("idea"));
        assert_eq!(record.status.as_str(), "idea");
        assert!(!record.is_awaiting_human());
        assert!(record.last_stage.is_none());
    }
}

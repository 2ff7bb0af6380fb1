//! In-memory reference implementation for Greenlight storage traits.
//!
//! Deterministic and test-friendly. Production deployments should put a
//! transactional backend behind the same traits for source-of-truth data.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use greenlight_contracts::{Contract, ContractKind, VerificationAttempt};
use greenlight_types::{AuditEvent, ContractId, PipelineId, PipelineRecord, StageStatus};
use uuid::Uuid;

use crate::model::AuditRecord;
use crate::traits::{AttemptStore, AuditLog, ContractStore, PipelineStore, QueryWindow};
use crate::{StorageError, StorageResult};

/// In-memory Greenlight storage adapter.
#[derive(Default)]
pub struct MemoryStore {
    pipelines: RwLock<HashMap<PipelineId, PipelineRecord>>,
    contracts: RwLock<HashMap<ContractId, Contract>>,
    attempts: RwLock<HashMap<PipelineId, Vec<VerificationAttempt>>>,
    events: RwLock<HashMap<PipelineId, Vec<AuditRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineStore for MemoryStore {
    async fn create_pipeline(&self, record: PipelineRecord) -> StorageResult<()> {
        let mut guard = self
            .pipelines
            .write()
            .map_err(|_| StorageError::Backend("pipelines lock poisoned".to_string()))?;

        if guard.contains_key(&record.id) {
            return Err(StorageError::Conflict(format!(
                "pipeline {} already exists",
                record.id
            )));
        }
        guard.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_pipeline(&self, id: &PipelineId) -> StorageResult<Option<PipelineRecord>> {
        let guard = self
            .pipelines
            .read()
            .map_err(|_| StorageError::Backend("pipelines lock poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn transition_stage(
        &self,
        id: &PipelineId,
        expected_from: &StageStatus,
        to: &StageStatus,
        acting_stage: Option<&str>,
        awaiting_human: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut guard = self
            .pipelines
            .write()
            .map_err(|_| StorageError::Backend("pipelines lock poisoned".to_string()))?;
        let record = guard
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("pipeline {} not found", id)))?;

        if &record.status != expected_from {
            return Err(StorageError::InvariantViolation(format!(
                "invalid stage transition: expected {}, found {}",
                expected_from, record.status
            )));
        }

        record.status = to.clone();
        record.awaiting_human = awaiting_human;
        if let Some(stage) = acting_stage {
            record.last_stage = Some(stage.to_string());
        }
        record.updated_at = updated_at;
        Ok(())
    }

    async fn set_awaiting_human(
        &self,
        id: &PipelineId,
        reason: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut guard = self
            .pipelines
            .write()
            .map_err(|_| StorageError::Backend("pipelines lock poisoned".to_string()))?;
        let record = guard
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("pipeline {} not found", id)))?;
        record.awaiting_human = reason;
        record.updated_at = updated_at;
        Ok(())
    }

    async fn list_pipelines(&self, window: QueryWindow) -> StorageResult<Vec<PipelineRecord>> {
        let guard = self
            .pipelines
            .read()
            .map_err(|_| StorageError::Backend("pipelines lock poisoned".to_string()))?;
        let mut values = guard.values().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(apply_window(values, window))
    }
}

#[async_trait]
impl ContractStore for MemoryStore {
    async fn create_contract(&self, contract: Contract) -> StorageResult<()> {
        ensure_hash_invariant(&contract)?;
        let mut guard = self
            .contracts
            .write()
            .map_err(|_| StorageError::Backend("contracts lock poisoned".to_string()))?;

        if guard.contains_key(&contract.id) {
            return Err(StorageError::Conflict(format!(
                "contract {} already exists",
                contract.id
            )));
        }
        guard.insert(contract.id.clone(), contract);
        Ok(())
    }

    async fn get_contract(&self, id: &ContractId) -> StorageResult<Option<Contract>> {
        let guard = self
            .contracts
            .read()
            .map_err(|_| StorageError::Backend("contracts lock poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn update_contract(&self, contract: Contract) -> StorageResult<()> {
        ensure_hash_invariant(&contract)?;
        let mut guard = self
            .contracts
            .write()
            .map_err(|_| StorageError::Backend("contracts lock poisoned".to_string()))?;
        let stored = guard
            .get_mut(&contract.id)
            .ok_or_else(|| StorageError::NotFound(format!("contract {} not found", contract.id)))?;

        if stored.status().is_approved() {
            return Err(StorageError::InvariantViolation(format!(
                "contract {} is approved and frozen",
                contract.id
            )));
        }
        *stored = contract;
        Ok(())
    }

    async fn delete_contract(&self, id: &ContractId) -> StorageResult<()> {
        let mut guard = self
            .contracts
            .write()
            .map_err(|_| StorageError::Backend("contracts lock poisoned".to_string()))?;
        let stored = guard
            .get(id)
            .ok_or_else(|| StorageError::NotFound(format!("contract {} not found", id)))?;

        if stored.status().is_approved() {
            return Err(StorageError::InvariantViolation(format!(
                "contract {} is approved and cannot be deleted",
                id
            )));
        }
        guard.remove(id);
        Ok(())
    }

    async fn latest_of_kind(
        &self,
        pipeline_id: &PipelineId,
        kind: ContractKind,
    ) -> StorageResult<Option<Contract>> {
        let guard = self
            .contracts
            .read()
            .map_err(|_| StorageError::Backend("contracts lock poisoned".to_string()))?;
        Ok(guard
            .values()
            .filter(|c| &c.pipeline_id == pipeline_id && c.kind == kind)
            .max_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.0.cmp(&b.id.0))
            })
            .cloned())
    }

    async fn list_contracts(&self, pipeline_id: &PipelineId) -> StorageResult<Vec<Contract>> {
        let guard = self
            .contracts
            .read()
            .map_err(|_| StorageError::Backend("contracts lock poisoned".to_string()))?;
        let mut values = guard
            .values()
            .filter(|c| &c.pipeline_id == pipeline_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(values)
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn record_attempt(&self, attempt: VerificationAttempt) -> StorageResult<()> {
        if attempt.attempt == 0 {
            return Err(StorageError::InvalidInput(
                "attempt numbers are 1-based".to_string(),
            ));
        }
        let mut guard = self
            .attempts
            .write()
            .map_err(|_| StorageError::Backend("attempts lock poisoned".to_string()))?;
        let entries = guard.entry(attempt.pipeline_id.clone()).or_default();

        if entries.iter().any(|a| a.attempt == attempt.attempt) {
            return Err(StorageError::Conflict(format!(
                "attempt {} already recorded for pipeline {}",
                attempt.attempt, attempt.pipeline_id
            )));
        }
        entries.push(attempt);
        entries.sort_by_key(|a| a.attempt);
        Ok(())
    }

    async fn list_attempts(
        &self,
        pipeline_id: &PipelineId,
    ) -> StorageResult<Vec<VerificationAttempt>> {
        let guard = self
            .attempts
            .read()
            .map_err(|_| StorageError::Backend("attempts lock poisoned".to_string()))?;
        Ok(guard.get(pipeline_id).cloned().unwrap_or_default())
    }

    async fn latest_attempt(
        &self,
        pipeline_id: &PipelineId,
    ) -> StorageResult<Option<VerificationAttempt>> {
        let guard = self
            .attempts
            .read()
            .map_err(|_| StorageError::Backend("attempts lock poisoned".to_string()))?;
        Ok(guard
            .get(pipeline_id)
            .and_then(|entries| entries.last().cloned()))
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn append_event(&self, event: AuditEvent) -> StorageResult<AuditRecord> {
        let mut guard = self
            .events
            .write()
            .map_err(|_| StorageError::Backend("audit lock poisoned".to_string()))?;
        let chain = guard.entry(event.pipeline_id.clone()).or_default();

        let previous_hash = chain.last().map(|e| e.hash.clone());
        let sequence = chain.len() as u64 + 1;
        let hash = compute_event_hash(&event, previous_hash.as_deref(), sequence)?;

        let record = AuditRecord {
            event_id: format!("audit-{}", Uuid::new_v4()),
            sequence,
            pipeline_id: event.pipeline_id,
            kind: event.kind,
            message: event.message,
            at: event.at,
            previous_hash,
            hash,
        };

        chain.push(record.clone());
        Ok(record)
    }

    async fn list_events(
        &self,
        pipeline_id: &PipelineId,
        window: QueryWindow,
    ) -> StorageResult<Vec<AuditRecord>> {
        let guard = self
            .events
            .read()
            .map_err(|_| StorageError::Backend("audit lock poisoned".to_string()))?;
        let chain = guard.get(pipeline_id).cloned().unwrap_or_default();
        Ok(apply_window(chain, window))
    }

    async fn latest_event_hash(&self, pipeline_id: &PipelineId) -> StorageResult<Option<String>> {
        let guard = self
            .events
            .read()
            .map_err(|_| StorageError::Backend("audit lock poisoned".to_string()))?;
        Ok(guard
            .get(pipeline_id)
            .and_then(|chain| chain.last().map(|e| e.hash.clone())))
    }
}

/// An approved contract must carry a frozen hash before it is stored.
fn ensure_hash_invariant(contract: &Contract) -> StorageResult<()> {
    if contract.status().is_approved() && contract.content_hash().is_none() {
        return Err(StorageError::InvariantViolation(format!(
            "approved contract {} has no content hash",
            contract.id
        )));
    }
    Ok(())
}

fn compute_event_hash(
    event: &AuditEvent,
    previous_hash: Option<&str>,
    sequence: u64,
) -> StorageResult<String> {
    let serializable = serde_json::json!({
        "previous_hash": previous_hash,
        "sequence": sequence,
        "pipeline_id": event.pipeline_id.0,
        "kind": event.kind,
        "message": event.message,
        "at": event.at,
    });
    let serialized =
        serde_json::to_vec(&serializable).map_err(|e| StorageError::Serialization(e.to_string()))?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"greenlight-audit-v1:");
    hasher.update(&serialized);
    Ok(hasher.finalize().to_hex().to_string())
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenlight_contracts::{BasePromptPayload, ContractPayload};
    use greenlight_types::{ApproverId, AuditEventKind, StagePlan};
    use std::collections::BTreeMap;

    fn sample_record(id: &str) -> PipelineRecord {
        let plan = StagePlan::standard_build();
        PipelineRecord::new(PipelineId::new(id), plan.initial().clone())
    }

    fn sample_contract(pipeline: &str) -> Contract {
        Contract::draft(
            PipelineId::new(pipeline),
            ContractPayload::BasePrompt(BasePromptPayload {
                product_summary: "a recipe box".to_string(),
                target_platform: "web".to_string(),
                audience: "home cooks".to_string(),
            }),
            BTreeMap::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn duplicate_pipeline_is_a_conflict() {
        let store = MemoryStore::new();
        store.create_pipeline(sample_record("p-1")).await.unwrap();
        let result = store.create_pipeline(sample_record("p-1")).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn stage_transition_checks_expected_state() {
        let store = MemoryStore::new();
        store.create_pipeline(sample_record("p-1")).await.unwrap();

        let result = store
            .transition_stage(
                &PipelineId::new("p-1"),
                &StageStatus::from("building"),
                &StageStatus::from("verifying"),
                Some("builder"),
                None,
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(StorageError::InvariantViolation(_))));

        store
            .transition_stage(
                &PipelineId::new("p-1"),
                &StageStatus::from("idea"),
                &StageStatus::from("base_prompt_ready"),
                Some("prompt_writer"),
                Some("base prompt awaiting review".to_string()),
                Utc::now(),
            )
            .await
            .unwrap();

        let record = store
            .get_pipeline(&PipelineId::new("p-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status.as_str(), "base_prompt_ready");
        assert_eq!(record.last_stage.as_deref(), Some("prompt_writer"));
        assert!(record.is_awaiting_human());
    }

    #[tokio::test]
    async fn approved_contract_is_frozen_in_storage() {
        let store = MemoryStore::new();
        let mut contract = sample_contract("p-1");
        store.create_contract(contract.clone()).await.unwrap();

        contract.approve(ApproverId::new("reviewer")).unwrap();
        store.update_contract(contract.clone()).await.unwrap();

        // Any further write against the approved record is refused.
        let result = store.update_contract(contract.clone()).await;
        assert!(matches!(result, Err(StorageError::InvariantViolation(_))));

        let result = store.delete_contract(&contract.id).await;
        assert!(matches!(result, Err(StorageError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn draft_can_be_deleted() {
        let store = MemoryStore::new();
        let contract = sample_contract("p-1");
        let id = contract.id.clone();
        store.create_contract(contract).await.unwrap();
        store.delete_contract(&id).await.unwrap();
        assert!(store.get_contract(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn latest_of_kind_prefers_newest() {
        let store = MemoryStore::new();
        let first = sample_contract("p-1");
        let second = sample_contract("p-1");
        let expected = second.id.clone();
        store.create_contract(first).await.unwrap();
        store.create_contract(second).await.unwrap();

        let latest = store
            .latest_of_kind(&PipelineId::new("p-1"), ContractKind::BasePrompt)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, expected);
    }

    #[tokio::test]
    async fn attempts_are_append_only_and_ordered() {
        let store = MemoryStore::new();
        let attempt = |n: u32| VerificationAttempt {
            pipeline_id: PipelineId::new("p-1"),
            attempt: n,
            steps: vec![],
            passed: false,
            after_repair: n > 1,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        store.record_attempt(attempt(2)).await.unwrap();
        store.record_attempt(attempt(1)).await.unwrap();
        let result = store.record_attempt(attempt(2)).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        let attempts = store.list_attempts(&PipelineId::new("p-1")).await.unwrap();
        assert_eq!(
            attempts.iter().map(|a| a.attempt).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(
            store
                .latest_attempt(&PipelineId::new("p-1"))
                .await
                .unwrap()
                .unwrap()
                .attempt,
            2
        );
    }

    #[tokio::test]
    async fn audit_chain_hashes_are_linked() {
        let store = MemoryStore::new();
        let pipeline = PipelineId::new("p-1");
        let first = store
            .append_event(AuditEvent::new(
                pipeline.clone(),
                AuditEventKind::PipelineInitialized,
                "created",
            ))
            .await
            .unwrap();
        let second = store
            .append_event(AuditEvent::new(
                pipeline.clone(),
                AuditEventKind::StageTransition {
                    from: StageStatus::from("idea"),
                    to: StageStatus::from("base_prompt_ready"),
                },
                "advanced",
            ))
            .await
            .unwrap();

        assert_eq!(second.previous_hash, Some(first.hash.clone()));
        assert_eq!(second.sequence, 2);

        // Chains are per pipeline.
        let other = store
            .append_event(AuditEvent::new(
                PipelineId::new("p-2"),
                AuditEventKind::PipelineInitialized,
                "created",
            ))
            .await
            .unwrap();
        assert_eq!(other.previous_hash, None);
        assert_eq!(other.sequence, 1);

        let events = store
            .list_events(&pipeline, QueryWindow::default())
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            store.latest_event_hash(&pipeline).await.unwrap(),
            Some(second.hash)
        );
    }
}

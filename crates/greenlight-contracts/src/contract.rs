//! The contract record and its lifecycle operations.
//!
//! Drafts are mutable through guarded setters; approval computes and
//! freezes the content hash. After that the record is read-only: every
//! mutating operation fails with an immutability violation, and the
//! storage layer refuses updates independently.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use greenlight_types::{ApproverId, ContractId, PipelineId};
use serde::{Deserialize, Serialize};

use crate::canonical::canonical_json_bytes;
use crate::error::{ContractError, ContractResult};
use crate::hash::ContentHash;
use crate::kind::ContractKind;
use crate::payload::ContractPayload;

/// Lifecycle status of a contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    AwaitingApproval,
    Approved,
    Rejected,
}

impl ContractStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A hash-locked, approvable stage artifact.
///
/// Payload, upstream references, and lifecycle fields are private so the
/// only mutation paths are the guarded operations below.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub pipeline_id: PipelineId,
    pub kind: ContractKind,
    status: ContractStatus,
    payload: ContractPayload,
    /// Upstream kind -> frozen hash this contract was derived from.
    upstream: BTreeMap<ContractKind, ContentHash>,
    /// None until approved, then frozen.
    #[serde(skip_serializing_if = "Option::is_none")]
    content_hash: Option<ContentHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    approved_by: Option<ApproverId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Contract {
    /// Create a draft. The payload schema is validated here, at the
    /// boundary, so malformed artifacts never enter the system.
    pub fn draft(
        pipeline_id: PipelineId,
        payload: ContractPayload,
        upstream: BTreeMap<ContractKind, ContentHash>,
    ) -> ContractResult<Self> {
        payload.validate()?;
        Ok(Self {
            id: ContractId::generate(),
            pipeline_id,
            kind: payload.kind(),
            status: ContractStatus::Draft,
            payload,
            upstream,
            content_hash: None,
            approved_by: None,
            approved_at: None,
            created_at: Utc::now(),
        })
    }

    pub fn status(&self) -> ContractStatus {
        self.status
    }

    pub fn payload(&self) -> &ContractPayload {
        &self.payload
    }

    pub fn upstream(&self) -> &BTreeMap<ContractKind, ContentHash> {
        &self.upstream
    }

    pub fn content_hash(&self) -> Option<&ContentHash> {
        self.content_hash.as_ref()
    }

    pub fn approved_by(&self) -> Option<&ApproverId> {
        self.approved_by.as_ref()
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    /// Replace the draft payload. Kind changes and approved contracts are
    /// both refused.
    pub fn set_payload(&mut self, payload: ContractPayload) -> ContractResult<()> {
        if self.status.is_approved() {
            return Err(ContractError::Immutability(format!(
                "contract {} is approved; its content is frozen",
                self.id
            )));
        }
        if payload.kind() != self.kind {
            return Err(ContractError::Validation(format!(
                "payload kind {} does not match contract kind {}",
                payload.kind(),
                self.kind
            )));
        }
        payload.validate()?;
        self.payload = payload;
        Ok(())
    }

    /// Replace the declared upstream references of a draft.
    pub fn set_upstream(
        &mut self,
        upstream: BTreeMap<ContractKind, ContentHash>,
    ) -> ContractResult<()> {
        if self.status.is_approved() {
            return Err(ContractError::Immutability(format!(
                "contract {} is approved; its upstream references are frozen",
                self.id
            )));
        }
        self.upstream = upstream;
        Ok(())
    }

    /// Deterministic hash over canonical content: kind, payload, upstream
    /// references. Timestamps, approver, status, and id are excluded, so
    /// identical content hashes identically regardless of when or in what
    /// order it was generated.
    pub fn compute_hash(&self) -> ContentHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"greenlight-contract-v1:");
        hasher.update(self.kind.name().as_bytes());
        let payload_value = serde_json::to_value(&self.payload).expect("payload serializable");
        hasher.update(&canonical_json_bytes(&payload_value));
        for (kind, hash) in &self.upstream {
            hasher.update(kind.name().as_bytes());
            hasher.update(hash.as_bytes());
        }
        ContentHash::from_bytes(*hasher.finalize().as_bytes())
    }

    /// Move a draft into review.
    pub fn submit_for_approval(&mut self) -> ContractResult<()> {
        match self.status {
            ContractStatus::Draft => {
                self.status = ContractStatus::AwaitingApproval;
                Ok(())
            }
            status => Err(ContractError::InvalidStatus {
                op: "submit".to_string(),
                status: status.to_string(),
            }),
        }
    }

    /// Approve: records the approver and time, computes and freezes the
    /// hash. Only drafts and contracts awaiting approval qualify.
    pub fn approve(&mut self, approver: ApproverId) -> ContractResult<()> {
        match self.status {
            ContractStatus::Draft | ContractStatus::AwaitingApproval => {}
            ContractStatus::Approved => {
                return Err(ContractError::Immutability(format!(
                    "contract {} is already approved",
                    self.id
                )));
            }
            ContractStatus::Rejected => {
                return Err(ContractError::InvalidStatus {
                    op: "approve".to_string(),
                    status: self.status.to_string(),
                });
            }
        }
        self.content_hash = Some(self.compute_hash());
        self.status = ContractStatus::Approved;
        self.approved_by = Some(approver);
        self.approved_at = Some(Utc::now());
        Ok(())
    }

    /// Mark a non-approved contract rejected. The caller deletes the
    /// record afterwards; approval freezes a contract against this too.
    pub fn reject(&mut self) -> ContractResult<()> {
        if self.status.is_approved() {
            return Err(ContractError::Immutability(format!(
                "contract {} is approved and cannot be rejected",
                self.id
            )));
        }
        self.status = ContractStatus::Rejected;
        Ok(())
    }

    /// Recompute the canonical hash and compare with the frozen one.
    /// False for unapproved contracts (nothing frozen yet) and for
    /// tampered content.
    pub fn verify_hash(&self) -> bool {
        match &self.content_hash {
            Some(frozen) => *frozen == self.compute_hash(),
            None => false,
        }
    }

    /// Validate this contract's declared upstream references against the
    /// resolved artifacts, keyed by kind.
    pub fn validate_upstream(
        &self,
        resolved: &BTreeMap<ContractKind, Contract>,
    ) -> ContractResult<()> {
        validate_upstream_refs(&self.upstream, resolved)
    }
}

/// Check declared upstream references before a dependent contract is
/// generated: every referenced artifact must exist, be approved, carry a
/// frozen hash, and that hash must exactly match the declared one.
pub fn validate_upstream_refs(
    declared: &BTreeMap<ContractKind, ContentHash>,
    resolved: &BTreeMap<ContractKind, Contract>,
) -> ContractResult<()> {
    for (kind, declared_hash) in declared {
        let upstream = resolved.get(kind).ok_or_else(|| {
            ContractError::ContextIsolation(format!("upstream {} does not exist", kind))
        })?;
        if !upstream.status().is_approved() {
            return Err(ContractError::ContextIsolation(format!(
                "upstream {} is {} (requires approved)",
                kind,
                upstream.status()
            )));
        }
        let actual = upstream.content_hash().ok_or_else(|| {
            ContractError::ContextIsolation(format!("upstream {} carries no hash", kind))
        })?;
        if actual != declared_hash {
            return Err(ContractError::HashChainBroken {
                kind: kind.to_string(),
                declared: declared_hash.to_string(),
                actual: actual.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{BasePromptPayload, ExecutionPlanPayload};
    use crate::attempt::{CheckKind, CheckSpec};
    use proptest::prelude::*;

    fn base_prompt(summary: &str) -> ContractPayload {
        ContractPayload::BasePrompt(BasePromptPayload {
            product_summary: summary.to_string(),
            target_platform: "web".to_string(),
            audience: "small teams".to_string(),
        })
    }

    fn plan_payload() -> ContractPayload {
        ContractPayload::ExecutionPlan(ExecutionPlanPayload {
            milestones: vec!["scaffold".to_string()],
            checks: vec![CheckSpec::new("build passes", "compile", CheckKind::Static)],
        })
    }

    #[test]
    fn hash_is_null_until_approved_then_frozen() {
        let mut contract = Contract::draft(
            PipelineId::new("p-1"),
            base_prompt("a todo app"),
            BTreeMap::new(),
        )
        .unwrap();
        assert!(contract.content_hash().is_none());

        contract.approve(ApproverId::new("reviewer")).unwrap();
        let frozen = *contract.content_hash().unwrap();
        assert!(contract.verify_hash());

        let err = contract.approve(ApproverId::new("reviewer")).unwrap_err();
        assert!(matches!(err, ContractError::Immutability(_)));
        assert_eq!(contract.content_hash(), Some(&frozen));
    }

    #[test]
    fn approved_content_cannot_change() {
        let mut contract = Contract::draft(
            PipelineId::new("p-1"),
            base_prompt("a todo app"),
            BTreeMap::new(),
        )
        .unwrap();
        contract.approve(ApproverId::new("reviewer")).unwrap();

        let err = contract.set_payload(base_prompt("a different app")).unwrap_err();
        assert!(matches!(err, ContractError::Immutability(_)));
        assert!(contract.verify_hash());
    }

    #[test]
    fn identical_content_hashes_identically() {
        let a = Contract::draft(
            PipelineId::new("p-1"),
            base_prompt("a todo app"),
            BTreeMap::new(),
        )
        .unwrap();
        let b = Contract::draft(
            PipelineId::new("p-2"),
            base_prompt("a todo app"),
            BTreeMap::new(),
        )
        .unwrap();
        // Different ids, different creation times, same canonical content.
        assert_eq!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn upstream_validation_distinguishes_missing_from_mismatch() {
        let mut rules = Contract::draft(
            PipelineId::new("p-1"),
            plan_payload(),
            BTreeMap::new(),
        )
        .unwrap();
        rules.approve(ApproverId::new("reviewer")).unwrap();
        let good_hash = *rules.content_hash().unwrap();

        let mut resolved = BTreeMap::new();
        resolved.insert(ContractKind::ExecutionPlan, rules);

        // Matching reference passes.
        let declared = BTreeMap::from([(ContractKind::ExecutionPlan, good_hash)]);
        assert!(validate_upstream_refs(&declared, &resolved).is_ok());

        // Missing upstream is context isolation.
        let missing = BTreeMap::from([(ContractKind::RuleSet, good_hash)]);
        let err = validate_upstream_refs(&missing, &resolved).unwrap_err();
        assert!(matches!(err, ContractError::ContextIsolation(_)));

        // Wrong hash is a broken chain.
        let stale = BTreeMap::from([(ContractKind::ExecutionPlan, ContentHash::zero())]);
        let err = validate_upstream_refs(&stale, &resolved).unwrap_err();
        assert!(matches!(err, ContractError::HashChainBroken { .. }));
    }

    #[test]
    fn unapproved_upstream_is_context_isolation() {
        let draft = Contract::draft(
            PipelineId::new("p-1"),
            plan_payload(),
            BTreeMap::new(),
        )
        .unwrap();
        let declared = BTreeMap::from([(ContractKind::ExecutionPlan, draft.compute_hash())]);
        let resolved = BTreeMap::from([(ContractKind::ExecutionPlan, draft)]);

        let err = validate_upstream_refs(&declared, &resolved).unwrap_err();
        assert!(matches!(err, ContractError::ContextIsolation(_)));
    }

    #[test]
    fn rejected_draft_cannot_be_approved() {
        let mut contract = Contract::draft(
            PipelineId::new("p-1"),
            base_prompt("a todo app"),
            BTreeMap::new(),
        )
        .unwrap();
        contract.reject().unwrap();
        assert!(matches!(
            contract.approve(ApproverId::new("reviewer")),
            Err(ContractError::InvalidStatus { .. })
        ));
    }

    proptest! {
        #[test]
        fn hash_depends_only_on_canonical_content(summary in "[a-z][a-z ]{0,39}") {
            let a = Contract::draft(
                PipelineId::generate(),
                base_prompt(&summary),
                BTreeMap::new(),
            ).unwrap();
            let b = Contract::draft(
                PipelineId::generate(),
                base_prompt(&summary),
                BTreeMap::new(),
            ).unwrap();
            prop_assert_eq!(a.compute_hash(), b.compute_hash());

            let other = Contract::draft(
                PipelineId::generate(),
                base_prompt(&format!("{}!", summary)),
                BTreeMap::new(),
            ).unwrap();
            prop_assert_ne!(a.compute_hash(), other.compute_hash());
        }
    }
}

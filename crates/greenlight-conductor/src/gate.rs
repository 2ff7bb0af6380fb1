use std::collections::BTreeMap;
use std::sync::Arc;

use greenlight_contracts::{
    validate_upstream_refs, ContentHash, Contract, ContractError, ContractKind, ContractPayload,
};
use greenlight_storage::ControlPlaneStore;
use greenlight_types::{ApproverId, AuditEvent, AuditEventKind, ContractId, PipelineId};
use tracing::{info, warn};

use crate::error::{ConductorError, ConductorResult};

/// The contract approval gate.
///
/// Runs the draft / approve / reject lifecycle. A draft is only accepted
/// once its declared upstream references resolve to approved contracts
/// whose frozen hashes match, and a build instruction additionally has to
/// be permitted by the rule set it builds against. Approval freezes the
/// content hash; rejection deletes the draft so a redraft starts clean.
pub struct ContractGate {
    store: Arc<dyn ControlPlaneStore>,
}

impl ContractGate {
    pub fn new(store: Arc<dyn ControlPlaneStore>) -> Self {
        Self { store }
    }

    /// Draft a contract after checking its upstream references.
    pub async fn draft(
        &self,
        pipeline_id: &PipelineId,
        payload: ContractPayload,
        upstream: BTreeMap<ContractKind, ContentHash>,
    ) -> ConductorResult<Contract> {
        let resolved = self.resolve_upstream(pipeline_id, &upstream).await?;
        validate_upstream_refs(&upstream, &resolved)?;

        if let ContractPayload::BuildInstruction(instruction) = &payload {
            let rules = resolved.get(&ContractKind::RuleSet).ok_or_else(|| {
                ContractError::ContextIsolation(
                    "build instruction requires an approved rule set upstream".to_string(),
                )
            })?;
            match rules.payload() {
                ContractPayload::RuleSet(rules) => instruction.permitted_by(rules)?,
                other => {
                    return Err(ContractError::Validation(format!(
                        "rule set contract carries a {} payload",
                        other.kind()
                    ))
                    .into())
                }
            }
        }

        if let ContractPayload::RuleSet(rules) = &payload {
            let destructive: Vec<&str> = rules
                .granted
                .iter()
                .filter(|c| c.is_destructive())
                .map(|c| c.name())
                .collect();
            if !destructive.is_empty() {
                warn!(
                    pipeline = %pipeline_id,
                    capabilities = ?destructive,
                    "rule set grants destructive capabilities"
                );
            }
        }

        let contract = Contract::draft(pipeline_id.clone(), payload, upstream)?;
        self.store.create_contract(contract.clone()).await?;

        info!(
            pipeline = %pipeline_id,
            contract = %contract.id,
            kind = %contract.kind,
            "contract drafted"
        );
        self.store
            .append_event(AuditEvent::new(
                pipeline_id.clone(),
                AuditEventKind::ContractDrafted {
                    kind: contract.kind.name().to_string(),
                },
                format!("{} drafted", contract.kind),
            ))
            .await?;
        Ok(contract)
    }

    /// Hand a draft to its human reviewer.
    pub async fn submit(&self, id: &ContractId) -> ConductorResult<Contract> {
        let mut contract = self.require_contract(id).await?;
        contract.submit_for_approval()?;
        self.store.update_contract(contract.clone()).await?;
        Ok(contract)
    }

    /// Approve a contract, freezing its content hash.
    pub async fn approve(
        &self,
        id: &ContractId,
        approver: &ApproverId,
    ) -> ConductorResult<Contract> {
        let mut contract = self.require_contract(id).await?;
        contract.approve(approver.clone())?;
        self.store.update_contract(contract.clone()).await?;

        info!(
            pipeline = %contract.pipeline_id,
            contract = %contract.id,
            kind = %contract.kind,
            approver = %approver,
            "contract approved"
        );
        self.store
            .append_event(AuditEvent::new(
                contract.pipeline_id.clone(),
                AuditEventKind::ContractApproved {
                    kind: contract.kind.name().to_string(),
                },
                format!("{} approved by {}", contract.kind, approver),
            ))
            .await?;
        Ok(contract)
    }

    /// Reject and delete a draft. Redrafting starts from scratch.
    pub async fn reject(&self, id: &ContractId, reason: &str) -> ConductorResult<()> {
        let mut contract = self.require_contract(id).await?;
        contract.reject()?;
        self.store.delete_contract(id).await?;

        info!(
            pipeline = %contract.pipeline_id,
            contract = %contract.id,
            kind = %contract.kind,
            reason,
            "contract rejected"
        );
        self.store
            .append_event(AuditEvent::new(
                contract.pipeline_id.clone(),
                AuditEventKind::ContractRejected {
                    kind: contract.kind.name().to_string(),
                    reason: reason.to_string(),
                },
                format!("{} rejected: {}", contract.kind, reason),
            ))
            .await?;
        Ok(())
    }

    /// The newest approved contract of a kind, if any.
    pub async fn latest_approved(
        &self,
        pipeline_id: &PipelineId,
        kind: ContractKind,
    ) -> ConductorResult<Option<Contract>> {
        let contracts = self.store.list_contracts(pipeline_id).await?;
        Ok(contracts
            .into_iter()
            .filter(|c| c.kind == kind && c.status().is_approved())
            .last())
    }

    /// Resolve each declared upstream kind to its current contract,
    /// preferring the newest approved one so a stale draft of the same
    /// kind does not shadow it.
    async fn resolve_upstream(
        &self,
        pipeline_id: &PipelineId,
        upstream: &BTreeMap<ContractKind, ContentHash>,
    ) -> ConductorResult<BTreeMap<ContractKind, Contract>> {
        let mut resolved = BTreeMap::new();
        for kind in upstream.keys() {
            let found = match self.latest_approved(pipeline_id, *kind).await? {
                Some(contract) => Some(contract),
                None => self.store.latest_of_kind(pipeline_id, *kind).await?,
            };
            if let Some(contract) = found {
                resolved.insert(*kind, contract);
            }
        }
        Ok(resolved)
    }

    async fn require_contract(&self, id: &ContractId) -> ConductorResult<Contract> {
        self.store
            .get_contract(id)
            .await?
            .ok_or_else(|| ConductorError::ContractNotFound(id.clone()))
    }
}

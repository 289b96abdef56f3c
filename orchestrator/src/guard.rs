//! Grant invariant guard
//!
//! Defensive double-check before any revoke: queries the resource's live
//! authoritative state, never the journal. The journal is internal
//! bookkeeping and must never be the sole authority for an operation that
//! can permanently remove access.

use crate::error::OrphanRiskError;
use handover_core::{GatewayError, Principal, ResourceGateway, StepKind};

/// Live-state checks protecting the no-orphan invariant
pub struct GrantInvariantGuard;

impl GrantInvariantGuard {
    /// Pass only if at least one authorized principal other than
    /// `principal_to_remove` is present on the resource right now.
    pub async fn check_safe_to_revoke(
        gateway: &dyn ResourceGateway,
        principal_to_remove: &Principal,
    ) -> Result<(), GuardOutcome> {
        let admins = gateway.query_admins().await.map_err(GuardOutcome::Gateway)?;
        if admins.iter().any(|admin| admin != principal_to_remove) {
            Ok(())
        } else {
            Err(GuardOutcome::OrphanRisk(OrphanRiskError {
                resource: gateway.resource_id().clone(),
                principal: principal_to_remove.clone(),
            }))
        }
    }
}

/// Why the guard did not pass
#[derive(Debug, thiserror::Error)]
pub enum GuardOutcome {
    /// Removing the principal would orphan the resource
    #[error(transparent)]
    OrphanRisk(#[from] OrphanRiskError),

    /// Live state could not be read
    #[error(transparent)]
    Gateway(GatewayError),
}

/// Whether a step's intended effect is already visible in live state.
///
/// Used after an ambiguous confirmation timeout and by resume
/// verification: a grant shows as the principal being an admin, a
/// transfer as the principal owning the resource, a revoke as the
/// principal no longer being an admin.
pub async fn effect_in_place(
    gateway: &dyn ResourceGateway,
    kind: StepKind,
    principal: &Principal,
) -> Result<bool, GatewayError> {
    match kind {
        StepKind::Grant => Ok(gateway.query_admins().await?.contains(principal)),
        StepKind::Revoke => Ok(!gateway.query_admins().await?.contains(principal)),
        StepKind::Transfer => Ok(&gateway.query_owner().await? == principal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handover_core::{AdminSet, Operation, ResourceId};

    struct FixedGateway {
        id: ResourceId,
        admins: AdminSet,
        owner: Principal,
    }

    #[async_trait::async_trait]
    impl ResourceGateway for FixedGateway {
        fn resource_id(&self) -> &ResourceId {
            &self.id
        }

        fn prepare(
            &self,
            kind: StepKind,
            principal: &Principal,
        ) -> Result<Operation, GatewayError> {
            Ok(Operation {
                resource_id: self.id.clone(),
                kind,
                principal: principal.clone(),
                payload: serde_json::Value::Null,
            })
        }

        async fn query_admins(&self) -> Result<AdminSet, GatewayError> {
            Ok(self.admins.clone())
        }

        async fn query_owner(&self) -> Result<Principal, GatewayError> {
            Ok(self.owner.clone())
        }
    }

    fn gateway(admins: &[&str], owner: &str) -> FixedGateway {
        FixedGateway {
            id: ResourceId::from("vat"),
            admins: admins.iter().map(|a| Principal::from(*a)).collect(),
            owner: Principal::from(owner),
        }
    }

    #[tokio::test]
    async fn veto_when_principal_is_last_admin() {
        let gw = gateway(&["0xDEP"], "0xDEP");
        let result = GrantInvariantGuard::check_safe_to_revoke(&gw, &Principal::from("0xDEP")).await;
        assert!(matches!(result, Err(GuardOutcome::OrphanRisk(_))));
    }

    #[tokio::test]
    async fn pass_when_another_admin_remains() {
        let gw = gateway(&["0xDEP", "0xGOV"], "0xDEP");
        let result = GrantInvariantGuard::check_safe_to_revoke(&gw, &Principal::from("0xDEP")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn veto_when_admin_set_is_empty() {
        let gw = gateway(&[], "0xDEP");
        let result = GrantInvariantGuard::check_safe_to_revoke(&gw, &Principal::from("0xDEP")).await;
        assert!(matches!(result, Err(GuardOutcome::OrphanRisk(_))));
    }

    #[tokio::test]
    async fn effect_checks_per_kind() {
        let gw = gateway(&["0xGOV"], "0xGOV");
        let gov = Principal::from("0xGOV");
        let dep = Principal::from("0xDEP");

        assert!(effect_in_place(&gw, StepKind::Grant, &gov).await.unwrap());
        assert!(effect_in_place(&gw, StepKind::Revoke, &dep).await.unwrap());
        assert!(effect_in_place(&gw, StepKind::Transfer, &gov).await.unwrap());
        assert!(!effect_in_place(&gw, StepKind::Transfer, &dep).await.unwrap());
    }
}

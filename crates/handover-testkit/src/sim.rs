//! In-memory simulated ledger.
//!
//! Implements [`ResourceGateway`] and [`Submitter`] over plain maps with
//! strict nonce checking, honoring the resource-level contracts the
//! orchestrator depends on: idempotent grants, declared-no-op revokes of
//! unauthorized principals, would-orphan rejection, and single-owner
//! transfer.

use crate::faults::FaultSchedule;
use handover_core::{
    AdminSet, Capability, Confirmation, GatewayError, Operation, Principal, Registry,
    ResourceGateway, ResourceId, StepKind, SubmitError, Submitter, TxRef,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// Live state of one simulated resource
#[derive(Debug, Clone)]
pub struct SimResource {
    pub capabilities: BTreeSet<Capability>,
    pub admins: AdminSet,
    pub owner: Option<Principal>,
}

#[derive(Debug)]
struct PendingTx {
    verdict: Confirmation,
}

#[derive(Debug, Default)]
struct ChainState {
    next_nonce: HashMap<Principal, u64>,
    /// Nonce slots freed by dropped (timed-out, unmined) submissions;
    /// a replacement submission may reuse exactly these
    reusable: HashMap<Principal, BTreeSet<u64>>,
    pending: HashMap<TxRef, PendingTx>,
    /// Every accepted submission's nonce, in acceptance order
    accepted_nonces: Vec<u64>,
    tx_counter: u64,
}

/// Simulated ledger shared by gateways and the submitter side.
pub struct SimLedger {
    sender: Principal,
    resources: Mutex<HashMap<ResourceId, SimResource>>,
    chain: Mutex<ChainState>,
    faults: Mutex<FaultSchedule>,
}

impl SimLedger {
    /// Bootstrap from a registry: the deployer is sole admin of every
    /// ward-model resource and owner of every ownable one.
    #[must_use]
    pub fn bootstrap(registry: &Registry, deployer: &Principal) -> Arc<Self> {
        let mut resources = HashMap::new();
        for spec in registry.iter() {
            let admins: AdminSet = if spec.has(Capability::Grantable) || spec.has(Capability::Revocable)
            {
                [deployer.clone()].into_iter().collect()
            } else {
                AdminSet::new()
            };
            let owner = spec.has(Capability::Ownable).then(|| deployer.clone());
            resources.insert(
                spec.id.clone(),
                SimResource {
                    capabilities: spec.capabilities.clone(),
                    admins,
                    owner,
                },
            );
        }
        Arc::new(Self {
            sender: deployer.clone(),
            resources: Mutex::new(resources),
            chain: Mutex::new(ChainState::default()),
            faults: Mutex::new(FaultSchedule::none()),
        })
    }

    /// Install a fault schedule
    pub fn set_faults(&self, faults: FaultSchedule) {
        *self.faults.lock() = faults;
    }

    /// Gateway view of one resource
    #[must_use]
    pub fn gateway(self: &Arc<Self>, resource: impl Into<ResourceId>) -> SimGateway {
        SimGateway {
            ledger: Arc::clone(self),
            resource_id: resource.into(),
        }
    }

    /// One gateway per registry resource
    #[must_use]
    pub fn gateways(self: &Arc<Self>, registry: &Registry) -> Vec<Arc<dyn ResourceGateway>> {
        registry
            .iter()
            .map(|spec| Arc::new(self.gateway(spec.id.clone())) as Arc<dyn ResourceGateway>)
            .collect()
    }

    /// Current admin set (panics on unknown resource; this is a testkit)
    #[must_use]
    pub fn admins(&self, resource: &ResourceId) -> AdminSet {
        self.resources.lock()[resource].admins.clone()
    }

    /// Current owner
    #[must_use]
    pub fn owner(&self, resource: &ResourceId) -> Option<Principal> {
        self.resources.lock()[resource].owner.clone()
    }

    /// Out-of-band administrative change, for inconsistency scenarios
    pub fn remove_admin_out_of_band(&self, resource: &ResourceId, principal: &Principal) {
        let mut resources = self.resources.lock();
        if let Some(r) = resources.get_mut(resource) {
            r.admins.remove(principal);
        }
    }

    /// Out-of-band ownership change, for inconsistency scenarios
    pub fn seize_ownership_out_of_band(&self, resource: &ResourceId, new_owner: Principal) {
        let mut resources = self.resources.lock();
        if let Some(r) = resources.get_mut(resource) {
            r.owner = Some(new_owner);
        }
    }

    /// Every accepted submission nonce, in acceptance order
    #[must_use]
    pub fn accepted_nonces(&self) -> Vec<u64> {
        self.chain.lock().accepted_nonces.clone()
    }

    fn apply_effect(&self, op: &Operation) -> Confirmation {
        let mut resources = self.resources.lock();
        let Some(resource) = resources.get_mut(&op.resource_id) else {
            return Confirmation::Rejected("unknown resource".to_string());
        };
        match op.kind {
            StepKind::Grant => {
                if resource.admins.contains(&op.principal) {
                    Confirmation::NoOp
                } else {
                    resource.admins.insert(op.principal.clone());
                    Confirmation::Applied
                }
            }
            StepKind::Revoke => {
                if !resource.admins.contains(&op.principal) {
                    // Declared no-op per the resource contract
                    Confirmation::NoOp
                } else if resource.admins.len() == 1 {
                    Confirmation::Rejected("would orphan resource".to_string())
                } else {
                    resource.admins.remove(&op.principal);
                    Confirmation::Applied
                }
            }
            StepKind::Transfer => match resource.owner.clone() {
                Some(owner) if owner == self.sender => {
                    resource.owner = Some(op.principal.clone());
                    Confirmation::Applied
                }
                Some(owner) if owner == op.principal => Confirmation::NoOp,
                Some(_) | None => Confirmation::Rejected("not current owner".to_string()),
            },
        }
    }
}

impl std::fmt::Debug for SimLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimLedger").field("sender", &self.sender).finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Submitter for SimLedger {
    async fn next_nonce(&self, account: &Principal) -> Result<u64, SubmitError> {
        Ok(*self.chain.lock().next_nonce.get(account).unwrap_or(&0))
    }

    async fn submit(&self, op: &Operation, nonce: u64) -> Result<TxRef, SubmitError> {
        {
            let mut faults = self.faults.lock();
            if faults.transient_submit_failures > 0 {
                faults.transient_submit_failures -= 1;
                return Err(SubmitError::Transient("injected network failure".to_string()));
            }
        }

        let mut chain = self.chain.lock();
        let expected = chain.next_nonce.entry(self.sender.clone()).or_insert(0);
        if nonce == *expected {
            *expected += 1;
        } else {
            let reusable = chain.reusable.entry(self.sender.clone()).or_default();
            if !reusable.remove(&nonce) {
                let expected = *chain.next_nonce.get(&self.sender).unwrap_or(&0);
                return Err(SubmitError::NonceMismatch { expected, got: nonce });
            }
        }
        chain.accepted_nonces.push(nonce);

        let key = (op.resource_id.clone(), op.kind);
        let verdict = {
            let mut faults = self.faults.lock();
            let timed_out = match faults.timeouts.get_mut(&key) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            if faults.reject.contains(&key) {
                Confirmation::Rejected(match op.kind {
                    StepKind::Grant | StepKind::Revoke => "unauthorized caller".to_string(),
                    StepKind::Transfer => "not current owner".to_string(),
                })
            } else if timed_out {
                if faults.effect_lands_on_timeout {
                    drop(faults);
                    self.apply_effect(op);
                } else {
                    // Unmined: the nonce slot frees up for a replacement
                    chain.reusable.entry(self.sender.clone()).or_default().insert(nonce);
                }
                Confirmation::TimedOut
            } else {
                drop(faults);
                self.apply_effect(op)
            }
        };

        chain.tx_counter += 1;
        let tx = TxRef(format!("0xsim{:04}", chain.tx_counter));
        chain.pending.insert(tx.clone(), PendingTx { verdict });
        Ok(tx)
    }

    async fn await_confirmation(
        &self,
        tx: &TxRef,
        _timeout: Duration,
    ) -> Result<Confirmation, SubmitError> {
        let pending = self.chain.lock().pending.remove(tx);
        match pending {
            Some(p) => Ok(p.verdict),
            None => Err(SubmitError::Fatal(format!("unknown transaction {tx}"))),
        }
    }
}

/// Gateway view of one simulated resource
pub struct SimGateway {
    ledger: Arc<SimLedger>,
    resource_id: ResourceId,
}

impl SimGateway {
    fn required_capability(kind: StepKind) -> Capability {
        match kind {
            StepKind::Grant => Capability::Grantable,
            StepKind::Revoke => Capability::Revocable,
            StepKind::Transfer => Capability::Ownable,
        }
    }
}

#[async_trait::async_trait]
impl ResourceGateway for SimGateway {
    fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    fn prepare(&self, kind: StepKind, principal: &Principal) -> Result<Operation, GatewayError> {
        let resources = self.ledger.resources.lock();
        let supported = resources
            .get(&self.resource_id)
            .is_some_and(|r| r.capabilities.contains(&Self::required_capability(kind)));
        if !supported {
            return Err(GatewayError::Unsupported {
                resource: self.resource_id.clone(),
                kind,
            });
        }
        Ok(Operation {
            resource_id: self.resource_id.clone(),
            kind,
            principal: principal.clone(),
            payload: serde_json::json!({
                "call": kind.to_string(),
                "args": [principal.as_str()],
            }),
        })
    }

    async fn query_admins(&self) -> Result<AdminSet, GatewayError> {
        {
            let mut faults = self.ledger.faults.lock();
            if faults.query_failures > 0 {
                faults.query_failures -= 1;
                return Err(GatewayError::Unavailable {
                    resource: self.resource_id.clone(),
                    reason: "injected query failure".to_string(),
                });
            }
        }
        Ok(self.ledger.admins(&self.resource_id))
    }

    async fn query_owner(&self) -> Result<Principal, GatewayError> {
        {
            let mut faults = self.ledger.faults.lock();
            if faults.query_failures > 0 {
                faults.query_failures -= 1;
                return Err(GatewayError::Unavailable {
                    resource: self.resource_id.clone(),
                    reason: "injected query failure".to_string(),
                });
            }
        }
        self.ledger.owner(&self.resource_id).ok_or_else(|| GatewayError::Unsupported {
            resource: self.resource_id.clone(),
            kind: StepKind::Transfer,
        })
    }
}

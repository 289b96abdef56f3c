//! Migration planning
//!
//! Builds the phased step sequence from the registry and validates its
//! ordering guarantees. Phases are globally interleaved by kind — every
//! Grant across all resources, then every Transfer, then every Revoke —
//! because a partially-completed grant phase leaves each resource safely
//! co-administered by deployer and target, while finishing one resource
//! end-to-end before starting the next buys nothing and hides the
//! cross-resource blast radius if the revoke phase must pause for review.

use crate::error::PlanError;
use crate::registry::Registry;
use crate::types::{
    Capability, MigrationId, MigrationPlan, MigrationStep, Phase, Principal, ResourceId, StepId,
    StepKind,
};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::collections::BTreeSet;

/// Prerequisites already satisfied outside the plan being validated.
///
/// On a fresh run this is empty; on resume it holds the
/// `(resource, kind)` pairs whose journal records are Confirmed and
/// verified, so a filtered plan can still justify its revokes.
#[derive(Debug, Clone, Default)]
pub struct ConfirmedSet {
    inner: BTreeSet<(ResourceId, StepKind)>,
}

impl ConfirmedSet {
    /// Empty set (fresh run)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a confirmed step
    pub fn insert(&mut self, resource: ResourceId, kind: StepKind) {
        self.inner.insert((resource, kind));
    }

    /// Whether the given step is confirmed
    #[must_use]
    pub fn contains(&self, resource: &ResourceId, kind: StepKind) -> bool {
        self.inner.contains(&(resource.clone(), kind))
    }

    /// Whether some authority-granting step for the resource is confirmed
    #[must_use]
    pub fn has_prerequisite(&self, resource: &ResourceId) -> bool {
        self.contains(resource, StepKind::Grant) || self.contains(resource, StepKind::Transfer)
    }

    /// Number of confirmed steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether nothing is confirmed yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Builds and validates migration plans
pub struct Planner;

impl Planner {
    /// Build the phased plan for a registry and target principal.
    ///
    /// For each resource in registry order: a Grant step if Grantable, a
    /// Transfer step if Ownable, a Revoke step naming the deployer if
    /// Revocable. All Grants come first, then all Transfers, then all
    /// Revokes, preserving registry order inside each phase.
    #[must_use]
    pub fn plan(registry: &Registry, target: Principal, deployer: Principal) -> MigrationPlan {
        let mut grants = Vec::new();
        let mut transfers = Vec::new();
        let mut revokes = Vec::new();

        for spec in registry.iter() {
            if spec.has(Capability::Grantable) {
                grants.push(MigrationStep::new(spec.id.clone(), StepKind::Grant, target.clone()));
            }
            if spec.has(Capability::Ownable) {
                transfers.push(MigrationStep::new(
                    spec.id.clone(),
                    StepKind::Transfer,
                    target.clone(),
                ));
            }
            if spec.has(Capability::Revocable) {
                revokes.push(MigrationStep::new(
                    spec.id.clone(),
                    StepKind::Revoke,
                    deployer.clone(),
                ));
            }
        }

        let mut steps = grants;
        steps.append(&mut transfers);
        steps.append(&mut revokes);

        MigrationPlan {
            migration_id: MigrationId::new(),
            target,
            deployer,
            steps,
        }
    }

    /// Validate a plan's ordering guarantees.
    ///
    /// Builds the step dependency graph (each resource's Grant/Transfer
    /// steps point at its Revoke step) and rejects:
    /// - a revoke whose resource has neither an in-plan nor an
    ///   already-confirmed authority-granting step,
    /// - a resource that revokes via the ward model but never grants on
    ///   it (contradictory capability declaration),
    /// - phase-order violations and dependency cycles.
    pub fn validate(plan: &MigrationPlan, confirmed: &ConfirmedSet) -> Result<(), PlanError> {
        let mut highest = Phase::Grant;
        for step in &plan.steps {
            if step.phase() < highest {
                return Err(PlanError::PhaseOrderViolation { step: step.id });
            }
            highest = step.phase();
        }

        // Dependency graph: each resource's Grant step points at its
        // Revoke step. A transfer never feeds the ward set, so it is not
        // an edge here.
        let mut graph: DiGraphMap<StepId, ()> = DiGraphMap::new();
        for step in &plan.steps {
            graph.add_node(step.id);
        }
        for revoke in plan.steps.iter().filter(|s| s.kind == StepKind::Revoke) {
            for grant in plan
                .steps
                .iter()
                .filter(|s| s.resource_id == revoke.resource_id && s.kind == StepKind::Grant)
            {
                graph.add_edge(grant.id, revoke.id, ());
            }
        }

        if petgraph::algo::is_cyclic_directed(&graph) {
            return Err(PlanError::CycleDetected);
        }

        for revoke in plan.steps.iter().filter(|s| s.kind == StepKind::Revoke) {
            let granted_in_plan = graph
                .neighbors_directed(revoke.id, Direction::Incoming)
                .next()
                .is_some();
            if granted_in_plan || confirmed.contains(&revoke.resource_id, StepKind::Grant) {
                continue;
            }

            // A transfer alone cannot justify a ward-set revoke: the two
            // control models are distinct, and mixing them is a
            // configuration error, never resolved silently.
            let transferred = plan
                .find_step(&revoke.resource_id, StepKind::Transfer)
                .is_some()
                || confirmed.contains(&revoke.resource_id, StepKind::Transfer);
            if transferred {
                return Err(PlanError::ConflictingCapabilities {
                    resource: revoke.resource_id.clone(),
                });
            }

            return Err(PlanError::MissingPrerequisite {
                resource: revoke.resource_id.clone(),
                step: revoke.id,
            });
        }

        Ok(())
    }
}

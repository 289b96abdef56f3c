//! Resume controller
//!
//! Reconciles a prior journal with a freshly built plan so an interrupted
//! migration continues instead of restarting. Every journal claim of a
//! Confirmed step is checked against the resource's live state before it
//! is trusted; a disagreement halts for manual audit rather than guessing
//! which source is right.

use crate::error::ResumeError;
use crate::guard::effect_in_place;
use crate::journal::ExecutionJournal;
use handover_core::{
    ConfirmedSet, MigrationPlan, Planner, ResourceGateway, ResourceId, StepStatus,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Reconciles plan against journal for continuation
pub struct ResumeController;

impl ResumeController {
    /// Filter already-Confirmed steps out of `plan`, verifying each
    /// against live state, and re-validate what remains.
    ///
    /// The plan adopts the journal's migration id so record lookups stay
    /// keyed to the original run. Returns the confirmed-prerequisite set
    /// that justified the filtered plan.
    pub async fn reconcile(
        plan: &mut MigrationPlan,
        journal: &ExecutionJournal,
        gateways: &HashMap<ResourceId, Arc<dyn ResourceGateway>>,
    ) -> Result<ConfirmedSet, ResumeError> {
        if let Some(original) = journal.migration_id() {
            plan.migration_id = original;
        }
        let migration_id = plan.migration_id;

        let mut confirmed = ConfirmedSet::new();
        let mut remaining = Vec::new();
        for step in std::mem::take(&mut plan.steps) {
            let recorded = journal.latest_status(migration_id, &step.resource_id, step.kind);
            if recorded == Some(StepStatus::Confirmed) {
                let gateway = gateways
                    .get(&step.resource_id)
                    .ok_or_else(|| ResumeError::UnknownResource(step.resource_id.clone()))?;
                let in_place =
                    effect_in_place(gateway.as_ref(), step.kind, &step.principal).await?;
                if !in_place {
                    tracing::error!(
                        resource = %step.resource_id,
                        kind = %step.kind,
                        "journal says confirmed, live state disagrees"
                    );
                    return Err(ResumeError::Inconsistency {
                        resource: step.resource_id.clone(),
                        kind: step.kind,
                    });
                }
                tracing::debug!(resource = %step.resource_id, kind = %step.kind, "step already confirmed, skipping");
                confirmed.insert(step.resource_id.clone(), step.kind);
            } else {
                remaining.push(step);
            }
        }
        plan.steps = remaining;

        // The filtered plan must still satisfy the ordering guarantees,
        // now justified partly by what is already confirmed
        Planner::validate(plan, &confirmed)?;

        tracing::info!(
            remaining = plan.len(),
            confirmed = confirmed.len(),
            "resume reconciliation complete"
        );
        Ok(confirmed)
    }
}

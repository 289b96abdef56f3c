//! Migration handle
//!
//! The composing root: owns the registry, journal, sequencer, guard-backed
//! executor, and the external collaborators, and exposes the operation
//! surface (`plan`, `execute`, `resume`, `status`).

use crate::config::ExecutorConfig;
use crate::error::MigrationError;
use crate::executor::StepExecutor;
use crate::journal::ExecutionJournal;
use crate::resume::ResumeController;
use crate::sequencer::NonceSequencer;
use handover_core::{
    ConfirmedSet, MigrationId, MigrationPlan, Planner, Principal, Registry, ResourceGateway,
    ResourceId, StepKind, StepStatus, Submitter, TxRef,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Outcome summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// Run identifier
    pub migration_id: MigrationId,
    /// Steps the run scheduled (after resume filtering)
    pub steps_run: usize,
    /// Steps confirmed across the whole migration, including prior runs
    pub steps_confirmed: usize,
}

/// One row of `status` output
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// Resource the step operates on
    pub resource: ResourceId,
    /// Operation kind
    pub kind: StepKind,
    /// Latest journaled status (Pending if never journaled)
    pub status: StepStatus,
    /// Nonce of the latest submission, if any
    pub nonce: Option<u64>,
    /// Transaction reference of the latest submission, if any
    pub tx_ref: Option<TxRef>,
}

/// Point-in-time view of the migration, joined from plan and journal
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    /// Run identifier (the journal's, if records exist)
    pub migration_id: MigrationId,
    /// Per-step state in plan order
    pub steps: Vec<StepReport>,
    /// True only if every scheduled step is Confirmed
    pub complete: bool,
}

impl MigrationStatus {
    /// First failed step, if any
    #[must_use]
    pub fn first_failed(&self) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }
}

/// Main handle composing the orchestrator's parts
pub struct MigrationHandle {
    registry: Registry,
    target: Principal,
    deployer: Principal,
    config: ExecutorConfig,
    submitter: Arc<dyn Submitter>,
    gateways: HashMap<ResourceId, Arc<dyn ResourceGateway>>,
    journal: Arc<ExecutionJournal>,
    sequencer: Arc<NonceSequencer>,
    cancel: Arc<AtomicBool>,
}

impl MigrationHandle {
    /// Assemble a handle over the given collaborators
    #[must_use]
    pub fn new(
        registry: Registry,
        target: Principal,
        deployer: Principal,
        submitter: Arc<dyn Submitter>,
        gateways: Vec<Arc<dyn ResourceGateway>>,
        journal: ExecutionJournal,
        config: ExecutorConfig,
    ) -> Self {
        let gateways = gateways
            .into_iter()
            .map(|g| (g.resource_id().clone(), g))
            .collect();
        Self {
            registry,
            target,
            deployer,
            config,
            submitter,
            gateways,
            journal: Arc::new(journal),
            sequencer: Arc::new(NonceSequencer::new()),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build and validate the full migration plan
    pub fn plan(&self) -> Result<MigrationPlan, MigrationError> {
        let plan = Planner::plan(&self.registry, self.target.clone(), self.deployer.clone());
        Planner::validate(&plan, &ConfirmedSet::new())?;
        Ok(plan)
    }

    /// Run the migration from the top.
    ///
    /// Every run reconciles against the journal first, so re-running after
    /// an interruption never resubmits a confirmed step.
    pub async fn execute(&self) -> Result<MigrationReport, MigrationError> {
        tracing::info!(target = %self.target, deployer = %self.deployer, "starting migration run");
        self.run_reconciled().await
    }

    /// Continue an interrupted migration from the journal
    pub async fn resume(&self) -> Result<MigrationReport, MigrationError> {
        if self.journal.is_empty() {
            tracing::warn!("journal is empty, nothing to resume; running from the top");
        } else {
            tracing::info!("resuming from journal");
        }
        self.run_reconciled().await
    }

    async fn run_reconciled(&self) -> Result<MigrationReport, MigrationError> {
        let mut plan = Planner::plan(&self.registry, self.target.clone(), self.deployer.clone());
        let confirmed = ResumeController::reconcile(&mut plan, &self.journal, &self.gateways)
            .await
            .map_err(|err| match err {
                // A plan problem is a configuration error, not a resume one
                crate::error::ResumeError::Plan(plan_err) => MigrationError::Plan(plan_err),
                other => MigrationError::Resume(other),
            })?;
        let steps_run = plan.len();

        self.seed_sequencer().await?;

        let executor = StepExecutor::new(
            Arc::clone(&self.submitter),
            self.gateways.clone(),
            Arc::clone(&self.sequencer),
            Arc::clone(&self.journal),
            self.config.clone(),
            Arc::clone(&self.cancel),
        );
        executor.run(&mut plan, &self.deployer).await?;

        let report = MigrationReport {
            migration_id: plan.migration_id,
            steps_run,
            steps_confirmed: confirmed.len() + steps_run,
        };
        tracing::info!(
            migration = %report.migration_id,
            steps = report.steps_run,
            "migration run complete"
        );
        Ok(report)
    }

    /// Current per-step state, joined from the plan and the journal
    #[must_use]
    pub fn status(&self) -> MigrationStatus {
        let mut plan = Planner::plan(&self.registry, self.target.clone(), self.deployer.clone());
        if let Some(original) = self.journal.migration_id() {
            plan.migration_id = original;
        }

        let steps: Vec<StepReport> = plan
            .steps
            .iter()
            .map(|step| {
                let record =
                    self.journal
                        .latest_record(plan.migration_id, &step.resource_id, step.kind);
                StepReport {
                    resource: step.resource_id.clone(),
                    kind: step.kind,
                    status: record.as_ref().map_or(StepStatus::Pending, |r| r.status),
                    nonce: record.as_ref().and_then(|r| r.nonce),
                    tx_ref: record.and_then(|r| r.tx_ref),
                }
            })
            .collect();
        let complete = !steps.is_empty() && steps.iter().all(|s| s.status == StepStatus::Confirmed);

        MigrationStatus {
            migration_id: plan.migration_id,
            steps,
            complete,
        }
    }

    /// Flag an operator can set to stop the run before the next submission
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// The execution journal
    #[must_use]
    pub fn journal(&self) -> &ExecutionJournal {
        &self.journal
    }

    async fn seed_sequencer(&self) -> Result<(), MigrationError> {
        let external = self.submitter.next_nonce(&self.deployer).await?;
        let journal_high = self.journal.highest_confirmed_nonce();
        self.sequencer.seed(&self.deployer, external, journal_high);
        tracing::debug!(external, ?journal_high, "sequencer seeded");
        Ok(())
    }
}

impl std::fmt::Debug for MigrationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationHandle")
            .field("target", &self.target)
            .field("deployer", &self.deployer)
            .field("resources", &self.registry.len())
            .finish_non_exhaustive()
    }
}

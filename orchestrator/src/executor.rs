//! Step executor
//!
//! Drains a plan phase by phase under the single-writer model: every
//! submission carries a sequencer-reserved nonce, revokes are vetted by
//! the invariant guard immediately before submission, and every status
//! transition lands in the journal. Submissions may pipeline up to a
//! bounded depth within one phase; the window is always drained before
//! the next phase begins, so a revoke can never be submitted ahead of the
//! confirmation of its resource's grant or transfer.

use crate::config::ExecutorConfig;
use crate::error::{MigrationError, StepFailure, StepFailureReason};
use crate::guard::{effect_in_place, GrantInvariantGuard, GuardOutcome};
use crate::journal::ExecutionJournal;
use crate::sequencer::NonceSequencer;
use handover_core::state_machine;
use handover_core::{
    Confirmation, ExecutionRecord, MigrationPlan, MigrationStep, Operation, Phase, Principal,
    ResourceGateway, ResourceId, StepStatus, SubmitError, Submitter, TxRef,
};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A submitted step awaiting confirmation
struct InFlight {
    index: usize,
    nonce: u64,
    tx: TxRef,
    op: Operation,
    requeues: u32,
}

/// Executes migration steps in order against the capability interfaces
pub struct StepExecutor {
    submitter: Arc<dyn Submitter>,
    gateways: HashMap<ResourceId, Arc<dyn ResourceGateway>>,
    sequencer: Arc<NonceSequencer>,
    journal: Arc<ExecutionJournal>,
    config: ExecutorConfig,
    cancel: Arc<AtomicBool>,
}

impl StepExecutor {
    /// Assemble an executor over the given collaborators
    #[must_use]
    pub fn new(
        submitter: Arc<dyn Submitter>,
        gateways: HashMap<ResourceId, Arc<dyn ResourceGateway>>,
        sequencer: Arc<NonceSequencer>,
        journal: Arc<ExecutionJournal>,
        config: ExecutorConfig,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            submitter,
            gateways,
            sequencer,
            journal,
            config,
            cancel,
        }
    }

    /// Drain every Pending step of the plan, phase by phase.
    ///
    /// Halts on the first failure: later steps may assume earlier ones
    /// succeeded, so nothing further is submitted once a step fails.
    pub async fn run(
        &self,
        plan: &mut MigrationPlan,
        account: &Principal,
    ) -> Result<(), MigrationError> {
        for phase in [Phase::Grant, Phase::Transfer, Phase::Revoke] {
            let indices: Vec<usize> = plan
                .steps
                .iter()
                .enumerate()
                .filter(|(_, s)| s.phase() == phase && s.status == StepStatus::Pending)
                .map(|(i, _)| i)
                .collect();
            if indices.is_empty() {
                continue;
            }
            tracing::info!(phase = phase.as_u8(), steps = indices.len(), "entering phase");

            let mut window: VecDeque<InFlight> = VecDeque::new();
            for index in indices {
                if self.cancel.load(Ordering::SeqCst) {
                    tracing::warn!("cancellation requested, draining in-flight steps");
                    self.drain(plan, &mut window, account).await?;
                    return Err(MigrationError::Cancelled);
                }
                while window.len() >= self.config.pipeline_depth {
                    self.confirm_front(plan, &mut window, account).await?;
                }
                let inflight = self.submit_step(plan, index, account).await?;
                window.push_back(inflight);
            }
            // Phase boundary: everything confirms before the next phase
            self.drain(plan, &mut window, account).await?;
        }
        Ok(())
    }

    async fn drain(
        &self,
        plan: &mut MigrationPlan,
        window: &mut VecDeque<InFlight>,
        account: &Principal,
    ) -> Result<(), MigrationError> {
        while !window.is_empty() {
            self.confirm_front(plan, window, account).await?;
        }
        Ok(())
    }

    async fn submit_step(
        &self,
        plan: &mut MigrationPlan,
        index: usize,
        account: &Principal,
    ) -> Result<InFlight, MigrationError> {
        let step = plan.steps[index].clone();
        let gateway = self.gateway(&step)?;

        if step.kind == handover_core::StepKind::Revoke {
            match GrantInvariantGuard::check_safe_to_revoke(gateway.as_ref(), &step.principal).await
            {
                Ok(()) => {}
                Err(GuardOutcome::OrphanRisk(risk)) => {
                    tracing::error!(resource = %step.resource_id, "guard vetoed revoke");
                    self.mark(plan, index, StepStatus::Failed, None, None)?;
                    return Err(MigrationError::Guard(risk));
                }
                Err(GuardOutcome::Gateway(err)) => {
                    self.mark(plan, index, StepStatus::Failed, None, None)?;
                    return Err(self.step_failure(&step, StepFailureReason::Gateway(err)));
                }
            }
        }

        let op = match gateway.prepare(step.kind, &step.principal) {
            Ok(op) => op,
            Err(err) => {
                self.mark(plan, index, StepStatus::Failed, None, None)?;
                return Err(self.step_failure(&step, StepFailureReason::Gateway(err)));
            }
        };

        let nonce = self.sequencer.reserve(account)?;
        tracing::debug!(step = %step.id, resource = %step.resource_id, kind = %step.kind, nonce, "submitting");

        match self.submit_with_retry(&op, nonce, account, &step).await {
            Ok(tx) => {
                self.mark(plan, index, StepStatus::Submitted, Some(nonce), Some(tx.clone()))?;
                Ok(InFlight {
                    index,
                    nonce,
                    tx,
                    op,
                    requeues: 0,
                })
            }
            Err(err) => {
                // Never mined; free the slot so the sequence stays gap-free
                self.sequencer.release(account, nonce);
                self.mark(plan, index, StepStatus::Failed, Some(nonce), None)?;
                Err(err)
            }
        }
    }

    async fn submit_with_retry(
        &self,
        op: &Operation,
        nonce: u64,
        account: &Principal,
        step: &MigrationStep,
    ) -> Result<TxRef, MigrationError> {
        let mut attempt: u32 = 0;
        let mut resynced = false;
        loop {
            match self.submitter.submit(op, nonce).await {
                Ok(tx) => return Ok(tx),
                Err(SubmitError::Transient(reason)) => {
                    if attempt >= self.config.max_submit_retries {
                        return Err(
                            self.step_failure(step, StepFailureReason::RetriesExhausted(reason))
                        );
                    }
                    let delay = backoff_delay(attempt, self.config.backoff_base, self.config.backoff_cap);
                    tracing::warn!(
                        step = %step.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "transient submission failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(SubmitError::NonceMismatch { expected, got }) if !resynced => {
                    tracing::warn!(expected, got, "nonce mismatch, resyncing once");
                    let external = self
                        .submitter
                        .next_nonce(account)
                        .await
                        .map_err(|e| self.step_failure(step, StepFailureReason::Submit(e)))?;
                    self.sequencer.resync(account, external)?;
                    resynced = true;
                }
                Err(err) => {
                    return Err(self.step_failure(step, StepFailureReason::Submit(err)));
                }
            }
        }
    }

    async fn confirm_front(
        &self,
        plan: &mut MigrationPlan,
        window: &mut VecDeque<InFlight>,
        account: &Principal,
    ) -> Result<(), MigrationError> {
        let Some(inflight) = window.pop_front() else {
            return Ok(());
        };
        let outcome = self
            .submitter
            .await_confirmation(&inflight.tx, self.config.confirmation_timeout)
            .await;
        let step = plan.steps[inflight.index].clone();

        match outcome {
            Ok(Confirmation::Applied | Confirmation::NoOp) => {
                self.mark(
                    plan,
                    inflight.index,
                    StepStatus::Confirmed,
                    Some(inflight.nonce),
                    Some(inflight.tx.clone()),
                )?;
                self.sequencer.settle(account, inflight.nonce);
                tracing::info!(step = %step.id, resource = %step.resource_id, kind = %step.kind, "step confirmed");
                Ok(())
            }
            Ok(Confirmation::Rejected(reason)) => {
                // Mined but reverted: the nonce is consumed and the refusal
                // is authoritative
                self.mark(
                    plan,
                    inflight.index,
                    StepStatus::Failed,
                    Some(inflight.nonce),
                    Some(inflight.tx.clone()),
                )?;
                self.sequencer.settle(account, inflight.nonce);
                tracing::error!(step = %step.id, resource = %step.resource_id, %reason, "step rejected");
                Err(self.step_failure(&step, StepFailureReason::Rejected(reason)))
            }
            Ok(Confirmation::TimedOut) => {
                self.handle_timeout(plan, inflight, window, account).await
            }
            Err(err) if err.is_transient() => {
                // The confirmation channel failed, not the submission;
                // treat it like an ambiguous timeout
                self.handle_timeout(plan, inflight, window, account).await
            }
            Err(err) => {
                self.mark(
                    plan,
                    inflight.index,
                    StepStatus::Failed,
                    Some(inflight.nonce),
                    Some(inflight.tx.clone()),
                )?;
                self.sequencer.settle(account, inflight.nonce);
                Err(self.step_failure(&step, StepFailureReason::Submit(err)))
            }
        }
    }

    /// Confirmation timed out: re-check live state before resubmitting so
    /// an operation that actually landed is not duplicated.
    async fn handle_timeout(
        &self,
        plan: &mut MigrationPlan,
        mut inflight: InFlight,
        window: &mut VecDeque<InFlight>,
        account: &Principal,
    ) -> Result<(), MigrationError> {
        let step = plan.steps[inflight.index].clone();
        tracing::warn!(step = %step.id, resource = %step.resource_id, "confirmation timed out");

        let gateway = self.gateway(&step)?;
        let landed = effect_in_place(gateway.as_ref(), step.kind, &step.principal)
            .await
            .map_err(|e| self.step_failure(&step, StepFailureReason::Gateway(e)))?;
        if landed {
            self.mark(
                plan,
                inflight.index,
                StepStatus::Confirmed,
                Some(inflight.nonce),
                Some(inflight.tx.clone()),
            )?;
            self.sequencer.settle(account, inflight.nonce);
            tracing::info!(step = %step.id, "effect already in place, step confirmed");
            return Ok(());
        }

        if inflight.requeues >= self.config.max_requeues {
            self.mark(
                plan,
                inflight.index,
                StepStatus::Failed,
                Some(inflight.nonce),
                Some(inflight.tx.clone()),
            )?;
            self.sequencer.release(account, inflight.nonce);
            return Err(self.step_failure(
                &step,
                StepFailureReason::RequeueLimit(inflight.requeues),
            ));
        }

        // Requeue and resubmit, reusing the reserved nonce so the
        // replacement supersedes the stalled submission
        self.mark(plan, inflight.index, StepStatus::Pending, Some(inflight.nonce), None)?;
        let tx = match self
            .submit_with_retry(&inflight.op, inflight.nonce, account, &step)
            .await
        {
            Ok(tx) => tx,
            Err(err) => {
                // Resubmission itself failed; reflect it on the step
                self.mark(plan, inflight.index, StepStatus::Failed, Some(inflight.nonce), None)?;
                self.sequencer.release(account, inflight.nonce);
                return Err(err);
            }
        };
        self.mark(
            plan,
            inflight.index,
            StepStatus::Submitted,
            Some(inflight.nonce),
            Some(tx.clone()),
        )?;
        inflight.requeues += 1;
        inflight.tx = tx;
        window.push_back(inflight);
        Ok(())
    }

    /// Transition a step and journal the new status in one motion
    fn mark(
        &self,
        plan: &mut MigrationPlan,
        index: usize,
        to: StepStatus,
        nonce: Option<u64>,
        tx: Option<TxRef>,
    ) -> Result<(), MigrationError> {
        let migration_id = plan.migration_id;
        let step = &mut plan.steps[index];
        state_machine::validate_transition(step.status, to)?;
        step.status = to;
        self.journal
            .append(ExecutionRecord::for_step(migration_id, step, nonce, tx, to))?;
        Ok(())
    }

    fn gateway(&self, step: &MigrationStep) -> Result<&Arc<dyn ResourceGateway>, MigrationError> {
        self.gateways.get(&step.resource_id).ok_or_else(|| {
            self.step_failure(
                step,
                StepFailureReason::Gateway(handover_core::GatewayError::Unavailable {
                    resource: step.resource_id.clone(),
                    reason: "no gateway configured".to_string(),
                }),
            )
        })
    }

    fn step_failure(&self, step: &MigrationStep, reason: StepFailureReason) -> MigrationError {
        MigrationError::Step(StepFailure {
            step_id: step.id,
            resource: step.resource_id.clone(),
            kind: step.kind,
            reason,
        })
    }
}

/// Exponential backoff with a little jitter, capped
fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt)).min(cap);
    let jitter_ms = rand::thread_rng().gen_range(0..=(base.as_millis() as u64 / 2).max(1));
    exp + Duration::from_millis(jitter_ms)
}

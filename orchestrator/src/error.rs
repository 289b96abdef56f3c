//! Orchestrator error taxonomy
//!
//! Configuration-time errors (registry, plan) are fatal before any
//! submission. Transient submission failures are retried locally and only
//! surface once the retry budget is spent. Everything else halts the run
//! with the offending step's identity and resource, leaving the journal
//! consistent for a later resume.

use handover_core::{
    GatewayError, PlanError, Principal, RegistryError, ResourceId, StepId, StepKind, SubmitError,
    TransitionError,
};

/// Nonce sequencing failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NonceError {
    /// The externally observed next nonce cannot be explained by the
    /// tracked value and the known in-flight submissions
    #[error(
        "nonce conflict for {account}: external next {external}, tracked {tracked}, {in_flight} in flight"
    )]
    Conflict {
        /// Submitting account
        account: Principal,
        /// Externally observed next sequence number
        external: u64,
        /// Internally tracked next sequence number
        tracked: u64,
        /// Submissions currently in flight
        in_flight: u64,
    },

    /// The account was never seeded
    #[error("nonce sequencer has no state for {0}")]
    Unseeded(Principal),
}

/// Guard veto: revoking would leave the resource without an administrator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("revoking {principal} would leave {resource} without an administrator")]
pub struct OrphanRiskError {
    /// Resource at risk
    pub resource: ResourceId,
    /// Principal whose removal was vetoed
    pub principal: Principal,
}

/// Why a step ended up Failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepFailureReason {
    /// Authoritative resource-level refusal
    #[error("rejected by resource: {0}")]
    Rejected(String),

    /// Transient retry budget exhausted
    #[error("retry budget exhausted: {0}")]
    RetriesExhausted(String),

    /// Confirmation-timeout requeue budget exhausted
    #[error("requeue budget exhausted after {0} attempts")]
    RequeueLimit(u32),

    /// Capability interface failure
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Unrecoverable submission failure
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

/// A step halted the run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("step {step_id} ({kind} on {resource}) failed: {reason}")]
pub struct StepFailure {
    /// Failed step
    pub step_id: StepId,
    /// Resource the step operates on
    pub resource: ResourceId,
    /// Operation kind
    pub kind: StepKind,
    /// Failure classification
    pub reason: StepFailureReason,
}

/// Journal append/load/integrity failures
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// The hash chain is broken; the journal cannot be trusted
    #[error("journal integrity violation at record {index}")]
    IntegrityViolation {
        /// First record that fails verification
        index: usize,
    },

    /// Backing store could not be read or written
    #[error("journal io failure: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted record could not be decoded
    #[error("journal record malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Resume reconciliation failures
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// The journal claims a step Confirmed but live state disagrees;
    /// neither source is trusted, the run halts for manual audit
    #[error("journal claims {kind} on {resource} confirmed but live state disagrees")]
    Inconsistency {
        /// Resource in dispute
        resource: ResourceId,
        /// Step kind in dispute
        kind: StepKind,
    },

    /// The filtered plan no longer satisfies its ordering guarantees
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Live state could not be read during verification
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A journaled resource has no configured gateway
    #[error("no gateway for resource {0}")]
    UnknownResource(ResourceId),
}

/// Umbrella error for a migration run
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Registry failed to load or validate
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Plan failed validation
    #[error("plan invalid: {0}")]
    Plan(#[from] PlanError),

    /// Nonce sequencing failed
    #[error("nonce error: {0}")]
    Nonce(#[from] NonceError),

    /// Guard vetoed a revoke
    #[error("orphan risk: {0}")]
    Guard(#[from] OrphanRiskError),

    /// A step failed and halted the run
    #[error("step failed: {0}")]
    Step(#[from] StepFailure),

    /// Resume reconciliation failed
    #[error("resume error: {0}")]
    Resume(#[from] ResumeError),

    /// The journal failed
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    /// The submission collaborator failed outside any step (e.g. while
    /// reading the account's next nonce)
    #[error("submission collaborator error: {0}")]
    Submitter(#[from] SubmitError),

    /// An illegal status transition was attempted (internal defect)
    #[error("state machine error: {0}")]
    Transition(#[from] TransitionError),

    /// The operator stopped the run between steps
    #[error("run cancelled by operator")]
    Cancelled,
}

impl MigrationError {
    /// Whether the journal is still consistent and a later `resume` may
    /// complete the migration without manual intervention
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        !matches!(
            self,
            MigrationError::Resume(_)
                | MigrationError::Journal(JournalError::IntegrityViolation { .. })
                | MigrationError::Transition(_)
        )
    }

    /// The step this error halted on, if it names one
    #[must_use]
    pub fn failed_step(&self) -> Option<(StepId, &ResourceId)> {
        match self {
            MigrationError::Step(failure) => Some((failure.step_id, &failure.resource)),
            _ => None,
        }
    }
}

//! Core types for the authority handover
//!
//! Defines the fundamental vocabulary:
//! - Principals and resource identifiers
//! - Capabilities and step kinds
//! - Migration steps, plans, and execution records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use ulid::Ulid;
use uuid::Uuid;

/// An identity (address/account) that may hold administrative authority.
///
/// Two roles matter to the orchestrator: the transient `deployer` that
/// submits every operation, and the permanent governance `target` that
/// receives authority. Both are opaque strings here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Principal(pub String);

impl Principal {
    /// Create a principal from anything string-like
    #[inline]
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// The underlying address string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Principal {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Principal {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Stable identifier of a managed resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    /// Create a resource id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The underlying id string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Unique migration step identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StepId(pub Ulid);

impl StepId {
    /// Generate new step ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique migration run identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MigrationId(pub Uuid);

impl MigrationId {
    /// Generate new migration ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MigrationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MigrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Administrative operation a resource supports.
///
/// Multi-admin ward resources expose `Grantable`/`Revocable`; single-owner
/// resources expose `Ownable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Supports authorizing an additional administrator (rely)
    Grantable,
    /// Supports removing an administrator (deny)
    Revocable,
    /// Supports exclusive single-owner transfer
    Ownable,
}

/// Kind of a single migration step
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Authorize the target on a ward-model resource
    Grant,
    /// Hand exclusive ownership to the target
    Transfer,
    /// Remove the deployer from a ward-model resource
    Revoke,
}

impl StepKind {
    /// The phase this kind of step executes in
    #[inline]
    #[must_use]
    pub fn phase(self) -> Phase {
        match self {
            StepKind::Grant => Phase::Grant,
            StepKind::Transfer => Phase::Transfer,
            StepKind::Revoke => Phase::Revoke,
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Grant => write!(f, "grant"),
            StepKind::Transfer => write!(f, "transfer"),
            StepKind::Revoke => write!(f, "revoke"),
        }
    }
}

/// Execution phase. All steps of an earlier phase run before any step of a
/// later one, across every resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Phase 1: grant target on every grantable resource
    Grant,
    /// Phase 2: transfer ownership to target on every ownable resource
    Transfer,
    /// Phase 3: revoke deployer from every revocable resource
    Revoke,
}

impl Phase {
    /// Numeric phase value (1-based)
    #[inline]
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Phase::Grant => 1,
            Phase::Transfer => 2,
            Phase::Revoke => 3,
        }
    }
}

/// Lifecycle status of a migration step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not yet submitted
    Pending,
    /// Submitted, awaiting confirmation
    Submitted,
    /// Confirmed on the authoritative side (terminal)
    Confirmed,
    /// Rejected or abandoned (terminal)
    Failed,
}

impl StepStatus {
    /// Whether this status admits no further transitions
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Confirmed | StepStatus::Failed)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Submitted => write!(f, "submitted"),
            StepStatus::Confirmed => write!(f, "confirmed"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One atomic authority-transfer operation against one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    /// Step identifier
    pub id: StepId,
    /// Resource this step operates on
    pub resource_id: ResourceId,
    /// Operation kind
    pub kind: StepKind,
    /// Principal the operation names: the target for Grant/Transfer, the
    /// deployer for Revoke
    pub principal: Principal,
    /// Current lifecycle status
    pub status: StepStatus,
}

impl MigrationStep {
    /// Create a new pending step
    #[inline]
    #[must_use]
    pub fn new(resource_id: ResourceId, kind: StepKind, principal: Principal) -> Self {
        Self {
            id: StepId::new(),
            resource_id,
            kind,
            principal,
            status: StepStatus::Pending,
        }
    }

    /// The phase this step belongs to
    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.kind.phase()
    }
}

/// Ordered, phased sequence of migration steps for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Run identifier
    pub migration_id: MigrationId,
    /// Governance identity receiving authority
    pub target: Principal,
    /// Submitting identity being phased out
    pub deployer: Principal,
    /// Steps in execution order: all Grants, then Transfers, then Revokes
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    /// Number of steps in the plan
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps left
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps belonging to the given phase, in plan order
    pub fn steps_in_phase(&self, phase: Phase) -> impl Iterator<Item = &MigrationStep> {
        self.steps.iter().filter(move |s| s.phase() == phase)
    }

    /// Look up a step by resource and kind
    #[must_use]
    pub fn find_step(&self, resource_id: &ResourceId, kind: StepKind) -> Option<&MigrationStep> {
        self.steps
            .iter()
            .find(|s| &s.resource_id == resource_id && s.kind == kind)
    }
}

/// Prepared operation payload, ready for submission.
///
/// The gateway builds this; the orchestrator treats it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Resource the operation targets
    pub resource_id: ResourceId,
    /// Operation kind
    pub kind: StepKind,
    /// Principal the operation names
    pub principal: Principal,
    /// Opaque encoded payload
    pub payload: serde_json::Value,
}

/// Reference to a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxRef(pub String);

impl std::fmt::Display for TxRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of waiting for a submitted operation to settle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confirmation {
    /// Confirmed and the state change took effect
    Applied,
    /// Confirmed as an idempotent no-op (e.g. granting an existing admin)
    NoOp,
    /// Confirmed as a resource-level refusal; the reason is authoritative
    Rejected(String),
    /// Not settled within the allotted time
    TimedOut,
}

impl Confirmation {
    /// Whether the operation's intended effect is now in place
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Confirmation::Applied | Confirmation::NoOp)
    }
}

/// One append-only journal row, written once per step status transition.
///
/// `prev_hash`/`hash` chain the records; the journal fills them on append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Migration run the record belongs to
    pub migration_id: MigrationId,
    /// Step the record describes
    pub step_id: StepId,
    /// Resource the step operates on
    pub resource_id: ResourceId,
    /// Operation kind
    pub kind: StepKind,
    /// Principal the operation names
    pub principal: Principal,
    /// Nonce reserved for the submission, if one was reserved
    pub nonce: Option<u64>,
    /// Transaction reference, once submitted
    pub tx_ref: Option<TxRef>,
    /// Step status after this transition
    pub status: StepStatus,
    /// When the transition was recorded
    pub timestamp: DateTime<Utc>,
    /// Hash of the previous record in the chain
    pub prev_hash: [u8; 32],
    /// Hash of this record
    pub hash: [u8; 32],
}

impl ExecutionRecord {
    /// Build a record for a step transition. Chain hashes are zeroed; the
    /// journal overwrites them on append.
    #[must_use]
    pub fn for_step(
        migration_id: MigrationId,
        step: &MigrationStep,
        nonce: Option<u64>,
        tx_ref: Option<TxRef>,
        status: StepStatus,
    ) -> Self {
        Self {
            migration_id,
            step_id: step.id,
            resource_id: step.resource_id.clone(),
            kind: step.kind,
            principal: step.principal.clone(),
            nonce,
            tx_ref,
            status,
            timestamp: Utc::now(),
            prev_hash: [0u8; 32],
            hash: [0u8; 32],
        }
    }
}

/// Set of administrators reported by a resource's authoritative state
pub type AdminSet = BTreeSet<Principal>;

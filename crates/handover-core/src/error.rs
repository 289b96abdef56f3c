//! Error types for the core domain model
//!
//! Configuration-time failures (registry, plan) are fatal before any
//! submission occurs. Gateway and submission failures carry a
//! transient/fatal classification the executor uses to decide between
//! retry and halt.

use crate::types::{ResourceId, StepId, StepKind, StepStatus};

/// Registry construction and loading failures
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Two resources declared the same id
    #[error("duplicate resource id: {0}")]
    DuplicateId(ResourceId),

    /// A resource declared no capabilities at all
    #[error("resource {0} declares no capabilities")]
    NoCapabilities(ResourceId),

    /// Registry file could not be read
    #[error("registry file unreadable: {0}")]
    Io(#[from] std::io::Error),

    /// Registry file could not be parsed
    #[error("registry file malformed: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Plan validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// A resource mixes the single-owner and multi-admin control models:
    /// it asks for a revoke but nothing in the plan ever populates its
    /// ward set for the target
    #[error("resource {resource} declares revocable without grantable")]
    ConflictingCapabilities {
        /// Offending resource
        resource: ResourceId,
    },

    /// A revoke step has no grant/transfer for the same resource either in
    /// the plan or already confirmed
    #[error("revoke step {step} on {resource} has no confirmed or planned prerequisite")]
    MissingPrerequisite {
        /// Offending resource
        resource: ResourceId,
        /// The revoke step lacking a prerequisite
        step: StepId,
    },

    /// Steps are not in non-decreasing phase order
    #[error("step {step} breaks phase ordering")]
    PhaseOrderViolation {
        /// First out-of-order step
        step: StepId,
    },

    /// The step dependency graph is cyclic
    #[error("plan dependency graph contains a cycle")]
    CycleDetected,
}

/// Illegal step status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal step transition: {from} -> {to}")]
pub struct TransitionError {
    /// Status the step was in
    pub from: StepStatus,
    /// Status that was requested
    pub to: StepStatus,
}

/// Resource gateway failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The resource does not support the requested operation kind
    #[error("resource {resource} does not support {kind}")]
    Unsupported {
        /// Resource queried
        resource: ResourceId,
        /// Operation kind requested
        kind: StepKind,
    },

    /// The resource's authoritative state could not be reached
    #[error("resource {resource} unavailable: {reason}")]
    Unavailable {
        /// Resource queried
        resource: ResourceId,
        /// Transport-level reason
        reason: String,
    },
}

impl GatewayError {
    /// Whether retrying the call may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Unavailable { .. })
    }
}

/// Submission collaborator failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// Network/connectivity/fee-related failure; retried with backoff
    #[error("transient submission failure: {0}")]
    Transient(String),

    /// The submitter refused the nonce; the sequencer must resync
    #[error("nonce mismatch: submitter expected {expected}, got {got}")]
    NonceMismatch {
        /// Nonce the submitter expected next
        expected: u64,
        /// Nonce that was supplied
        got: u64,
    },

    /// Unrecoverable submission failure
    #[error("submission failed: {0}")]
    Fatal(String),
}

impl SubmitError {
    /// Whether the executor should retry with backoff
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, SubmitError::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_transient_classification() {
        let unavailable = GatewayError::Unavailable {
            resource: ResourceId::from("vat"),
            reason: "connection refused".to_string(),
        };
        assert!(unavailable.is_transient());

        let unsupported = GatewayError::Unsupported {
            resource: ResourceId::from("vat"),
            kind: StepKind::Transfer,
        };
        assert!(!unsupported.is_transient());
    }

    #[test]
    fn submit_transient_classification() {
        assert!(SubmitError::Transient("timeout".to_string()).is_transient());
        assert!(!SubmitError::NonceMismatch { expected: 4, got: 9 }.is_transient());
        assert!(!SubmitError::Fatal("rejected by node".to_string()).is_transient());
    }

    #[test]
    fn plan_error_display() {
        let err = PlanError::ConflictingCapabilities {
            resource: ResourceId::from("flap"),
        };
        assert!(err.to_string().contains("revocable without grantable"));
    }
}

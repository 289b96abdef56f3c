//! Interfaces the orchestrator consumes but does not implement.
//!
//! The capability interface (`ResourceGateway`) and the submission
//! collaborator (`Submitter`) are the seams to the outside world: the
//! resources' own logic, transaction transport, and signing all live on
//! the far side of these traits.

use crate::error::{GatewayError, SubmitError};
use crate::types::{AdminSet, Confirmation, Operation, Principal, ResourceId, StepKind, TxRef};
use std::time::Duration;

/// Capability interface of one managed resource.
///
/// `prepare` is a pure payload build; the resulting [`Operation`] is
/// submitted separately. `query_admins`/`query_owner` read authoritative
/// live state and are what the invariant guard and resume verification
/// trust — never the journal.
///
/// Implementations must expose idempotent grant semantics (granting an
/// existing admin is a no-op success) and treat revoking an unauthorized
/// principal as a declared no-op, so that resubmission after an ambiguous
/// timeout is safe.
#[async_trait::async_trait]
pub trait ResourceGateway: Send + Sync {
    /// Id of the resource this gateway fronts
    fn resource_id(&self) -> &ResourceId;

    /// Build the operation payload for one step kind and principal
    fn prepare(&self, kind: StepKind, principal: &Principal) -> Result<Operation, GatewayError>;

    /// Current administrator set (ward-model resources)
    async fn query_admins(&self) -> Result<AdminSet, GatewayError>;

    /// Current owner (single-owner resources)
    async fn query_owner(&self) -> Result<Principal, GatewayError>;
}

/// Submission collaborator: nonce source, transport, and confirmation.
#[async_trait::async_trait]
pub trait Submitter: Send + Sync {
    /// Externally-observed next sequence number for the account
    async fn next_nonce(&self, account: &Principal) -> Result<u64, SubmitError>;

    /// Submit an operation under the given nonce
    async fn submit(&self, op: &Operation, nonce: u64) -> Result<TxRef, SubmitError>;

    /// Wait up to `timeout` for the submission to settle
    async fn await_confirmation(
        &self,
        tx: &TxRef,
        timeout: Duration,
    ) -> Result<Confirmation, SubmitError>;
}

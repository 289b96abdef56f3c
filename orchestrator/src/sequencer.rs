//! Nonce sequencer
//!
//! Owns per-account sequence state; every submission nonce is obtained
//! through `reserve` and advanced nowhere else. Seeded from the external
//! collaborator's observed next nonce or the journal's highest confirmed
//! nonce + 1, whichever is greater, so a stale journal can never walk the
//! sequence backwards.

use crate::error::NonceError;
use dashmap::DashMap;
use handover_core::Principal;
use std::collections::BTreeSet;

#[derive(Debug, Default)]
struct AccountState {
    next: u64,
    in_flight: BTreeSet<u64>,
}

/// Per-account strictly increasing sequence numbers
#[derive(Debug, Default)]
pub struct NonceSequencer {
    accounts: DashMap<Principal, AccountState>,
}

impl NonceSequencer {
    /// Empty sequencer; accounts must be seeded before reserving
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize an account from the externally observed next nonce and
    /// the journal's highest confirmed nonce, defending against journal
    /// staleness by taking whichever is greater.
    pub fn seed(&self, account: &Principal, external_next: u64, journal_high: Option<u64>) {
        let next = external_next.max(journal_high.map_or(0, |high| high + 1));
        self.accounts.insert(
            account.clone(),
            AccountState {
                next,
                in_flight: BTreeSet::new(),
            },
        );
    }

    /// Reserve the next nonce for the account
    pub fn reserve(&self, account: &Principal) -> Result<u64, NonceError> {
        let mut state = self
            .accounts
            .get_mut(account)
            .ok_or_else(|| NonceError::Unseeded(account.clone()))?;
        let nonce = state.next;
        state.next += 1;
        state.in_flight.insert(nonce);
        Ok(nonce)
    }

    /// Mark a reserved nonce as settled (mined, whether applied or
    /// reverted)
    pub fn settle(&self, account: &Principal, nonce: u64) {
        if let Some(mut state) = self.accounts.get_mut(account) {
            state.in_flight.remove(&nonce);
        }
    }

    /// Return the most recent reservation unused (the submission never
    /// reached the ledger), keeping the sequence gap-free for the next
    /// step.
    pub fn release(&self, account: &Principal, nonce: u64) {
        if let Some(mut state) = self.accounts.get_mut(account) {
            state.in_flight.remove(&nonce);
            if state.next == nonce + 1 {
                state.next = nonce;
            }
        }
    }

    /// Check a freshly re-read external next nonce against tracked state.
    ///
    /// The external value is consistent if it sits between "everything in
    /// flight is still unmined" and "everything in flight has mined". A
    /// value below that floor means the external sequence jumped
    /// backwards; a value above the tracked next means it skipped past
    /// submissions we never made.
    pub fn resync(&self, account: &Principal, external_next: u64) -> Result<(), NonceError> {
        let state = self
            .accounts
            .get(account)
            .ok_or_else(|| NonceError::Unseeded(account.clone()))?;
        let in_flight = state.in_flight.len() as u64;
        let floor = state.next.saturating_sub(in_flight);
        if external_next < floor || external_next > state.next {
            return Err(NonceError::Conflict {
                account: account.clone(),
                external: external_next,
                tracked: state.next,
                in_flight,
            });
        }
        Ok(())
    }

    /// Currently tracked next nonce, if the account is seeded
    #[must_use]
    pub fn tracked_next(&self, account: &Principal) -> Option<u64> {
        self.accounts.get(account).map(|s| s.next)
    }
}

//! Scriptable fault schedule for the simulated ledger.

use handover_core::{ResourceId, StepKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};

/// Faults the simulated ledger injects into a run.
///
/// Keys are `(resource, kind)` so a test can target exactly one step.
#[derive(Debug, Default, Clone)]
pub struct FaultSchedule {
    /// The next N submissions fail with a transient error before reaching
    /// the ledger (network-level)
    pub transient_submit_failures: usize,
    /// Steps whose submission confirms as a business rejection
    pub reject: HashSet<(ResourceId, StepKind)>,
    /// Per-step count of confirmation waits that time out
    pub timeouts: HashMap<(ResourceId, StepKind), u32>,
    /// When a confirmation times out, whether the operation's effect
    /// nevertheless landed (true = landed, resubmission will be a no-op)
    pub effect_lands_on_timeout: bool,
    /// The next N authoritative-state queries fail as unavailable
    pub query_failures: usize,
}

impl FaultSchedule {
    /// No faults at all
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Fail the next `n` submissions transiently
    #[must_use]
    pub fn with_transient_submit_failures(mut self, n: usize) -> Self {
        self.transient_submit_failures = n;
        self
    }

    /// Confirm the given step as a business rejection
    #[must_use]
    pub fn with_rejection(mut self, resource: impl Into<ResourceId>, kind: StepKind) -> Self {
        self.reject.insert((resource.into(), kind));
        self
    }

    /// Time out the given step's first confirmation wait
    #[must_use]
    pub fn with_timeout_once(self, resource: impl Into<ResourceId>, kind: StepKind) -> Self {
        self.with_timeouts(resource, kind, 1)
    }

    /// Time out the given step's next `n` confirmation waits
    #[must_use]
    pub fn with_timeouts(
        mut self,
        resource: impl Into<ResourceId>,
        kind: StepKind,
        n: u32,
    ) -> Self {
        self.timeouts.insert((resource.into(), kind), n);
        self
    }

    /// On timeout, let the effect land anyway (ambiguous-timeout case)
    #[must_use]
    pub fn with_effect_landing_on_timeout(mut self) -> Self {
        self.effect_lands_on_timeout = true;
        self
    }

    /// Fail the next `n` admin/owner queries as unavailable
    #[must_use]
    pub fn with_query_failures(mut self, n: usize) -> Self {
        self.query_failures = n;
        self
    }

    /// Seeded random schedule over the given resources: a handful of
    /// transient submit failures and at most one timeout, never a
    /// business rejection (those are for targeted tests).
    #[must_use]
    pub fn seeded(seed: u64, resources: &[ResourceId]) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut schedule = Self::default().with_transient_submit_failures(rng.gen_range(0..3));
        if !resources.is_empty() && rng.gen_bool(0.5) {
            let victim = resources[rng.gen_range(0..resources.len())].clone();
            let kind = if rng.gen_bool(0.5) { StepKind::Grant } else { StepKind::Revoke };
            schedule = schedule.with_timeout_once(victim, kind);
            if rng.gen_bool(0.5) {
                schedule = schedule.with_effect_landing_on_timeout();
            }
        }
        schedule
    }
}

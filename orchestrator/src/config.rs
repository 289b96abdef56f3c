//! Executor configuration
//!
//! Retry/backoff/timeout knobs and the pipeline depth. Defaults are
//! conservative: serialized submission, a handful of transient retries,
//! and a bounded number of confirmation-timeout requeues.

use std::time::Duration;

/// Tuning for the step executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Transient submission retries per step before giving up
    pub max_submit_retries: u32,
    /// First backoff delay; doubles per retry
    pub backoff_base: Duration,
    /// Ceiling on the backoff delay
    pub backoff_cap: Duration,
    /// How long to wait for one confirmation before requeueing
    pub confirmation_timeout: Duration,
    /// Confirmation-timeout requeues per step before escalating to Failed
    pub max_requeues: u32,
    /// Submissions allowed ahead of confirmation, within one phase
    pub pipeline_depth: usize,
}

impl ExecutorConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With transient retry budget
    #[inline]
    #[must_use]
    pub fn with_max_submit_retries(mut self, retries: u32) -> Self {
        self.max_submit_retries = retries;
        self
    }

    /// With backoff base delay
    #[inline]
    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// With confirmation timeout
    #[inline]
    #[must_use]
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// With requeue budget
    #[inline]
    #[must_use]
    pub fn with_max_requeues(mut self, requeues: u32) -> Self {
        self.max_requeues = requeues;
        self
    }

    /// With pipeline depth (clamped to at least 1)
    #[inline]
    #[must_use]
    pub fn with_pipeline_depth(mut self, depth: usize) -> Self {
        self.pipeline_depth = depth.max(1);
        self
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_submit_retries: 5,
            backoff_base: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(8),
            confirmation_timeout: Duration::from_secs(30),
            max_requeues: 2,
            pipeline_depth: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides() {
        let config = ExecutorConfig::new()
            .with_max_submit_retries(1)
            .with_pipeline_depth(0);
        assert_eq!(config.max_submit_retries, 1);
        // Depth is clamped so the executor always makes progress
        assert_eq!(config.pipeline_depth, 1);
    }
}

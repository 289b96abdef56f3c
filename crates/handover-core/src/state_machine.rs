//! Step status state machine.
//!
//! `Pending -> Submitted -> {Confirmed, Failed}` with one sanctioned
//! backward edge: `Submitted -> Pending` on a confirmation timeout, so the
//! step can be resubmitted. A step may also fail straight from Pending
//! (guard veto, exhausted retry budget). Terminal statuses admit nothing.

use crate::error::TransitionError;
use crate::types::StepStatus;

/// Validates a step status transition.
pub fn validate_transition(from: StepStatus, to: StepStatus) -> Result<(), TransitionError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Statuses reachable from `from` in one transition
pub fn allowed_transitions(from: StepStatus) -> Vec<StepStatus> {
    use StepStatus::*;
    match from {
        // Pending -> Failed covers a guard veto or exhausted retry budget
        // before anything was submitted
        Pending => vec![Submitted, Failed],
        // Submitted -> Pending is the confirmation-timeout requeue path
        Submitted => vec![Confirmed, Failed, Pending],
        Confirmed => vec![],
        Failed => vec![],
    }
}

fn allowed(from: StepStatus, to: StepStatus) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_submits_or_fails() {
        assert!(validate_transition(StepStatus::Pending, StepStatus::Submitted).is_ok());
        assert!(validate_transition(StepStatus::Pending, StepStatus::Failed).is_ok());
        assert!(validate_transition(StepStatus::Pending, StepStatus::Confirmed).is_err());
    }

    #[test]
    fn submitted_resolves_or_requeues() {
        assert!(validate_transition(StepStatus::Submitted, StepStatus::Confirmed).is_ok());
        assert!(validate_transition(StepStatus::Submitted, StepStatus::Failed).is_ok());
        assert!(validate_transition(StepStatus::Submitted, StepStatus::Pending).is_ok());
    }

    #[test]
    fn terminal_statuses_are_sinks() {
        for terminal in [StepStatus::Confirmed, StepStatus::Failed] {
            assert!(allowed_transitions(terminal).is_empty());
            assert!(validate_transition(terminal, StepStatus::Pending).is_err());
            assert!(validate_transition(terminal, StepStatus::Submitted).is_err());
        }
    }

    #[test]
    fn no_confirmed_to_failed_crossover() {
        assert!(validate_transition(StepStatus::Confirmed, StepStatus::Failed).is_err());
        assert!(validate_transition(StepStatus::Failed, StepStatus::Confirmed).is_err());
    }
}

//! Resume behavior: continuing after a halt, idempotence against a full
//! run, and journal/live-state disagreement.

use handover_core::{Registry, ResourceId, StepKind, StepStatus, Submitter};
use handover_orchestrator::{
    ExecutionJournal, ExecutorConfig, MigrationError, MigrationHandle, ResumeError,
};
use handover_testkit::{deployer, governance, two_resource_registry, FaultSchedule, SimLedger};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> ExecutorConfig {
    ExecutorConfig::new()
        .with_backoff_base(Duration::from_millis(1))
        .with_confirmation_timeout(Duration::from_millis(50))
}

fn handle_over(
    registry: &Registry,
    ledger: &Arc<SimLedger>,
    journal_path: &Path,
) -> MigrationHandle {
    MigrationHandle::new(
        registry.clone(),
        governance(),
        deployer(),
        Arc::clone(ledger) as Arc<dyn Submitter>,
        ledger.gateways(registry),
        ExecutionJournal::open_file(journal_path).unwrap(),
        fast_config(),
    )
}

#[tokio::test]
async fn resume_completes_after_a_halt() {
    // Scenario: grant and transfer confirm, the revoke is rejected. A
    // second run resumes from the journal and finishes only the revoke.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    let registry = two_resource_registry();
    let ledger = SimLedger::bootstrap(&registry, &deployer());
    ledger.set_faults(FaultSchedule::none().with_rejection("vat", StepKind::Revoke));

    let original_migration = {
        let handle = handle_over(&registry, &ledger, &path);
        let err = handle.execute().await.unwrap_err();
        let (_, resource) = err.failed_step().expect("revoke failure names the step");
        assert_eq!(resource.as_str(), "vat");
        assert!(err.is_resumable());
        handle.journal().migration_id().unwrap()
    };

    // The operator clears the cause; a fresh process resumes
    ledger.set_faults(FaultSchedule::none());
    let handle = handle_over(&registry, &ledger, &path);
    let report = handle.resume().await.unwrap();

    // Same migration, only the revoke left to run
    assert_eq!(report.migration_id, original_migration);
    assert_eq!(report.steps_run, 1);

    // Run 1: grant(0), transfer(1), revoke(2, reverted). Run 2: revoke(3).
    assert_eq!(ledger.accepted_nonces(), vec![0, 1, 2, 3]);

    let vat = ResourceId::from("vat");
    assert!(ledger.admins(&vat).contains(&governance()));
    assert!(!ledger.admins(&vat).contains(&deployer()));
    assert_eq!(ledger.owner(&ResourceId::from("proxy")), Some(governance()));

    let status = handle.status();
    assert!(status.complete);
    assert!(handle.journal().verify_integrity().is_ok());
}

#[tokio::test]
async fn resume_never_resubmits_confirmed_steps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    let registry = two_resource_registry();
    let ledger = SimLedger::bootstrap(&registry, &deployer());

    {
        let handle = handle_over(&registry, &ledger, &path);
        handle.execute().await.unwrap();
    }
    let nonces_after_first = ledger.accepted_nonces();

    // Resuming a completed migration submits nothing
    let handle = handle_over(&registry, &ledger, &path);
    let report = handle.resume().await.unwrap();
    assert_eq!(report.steps_run, 0);
    assert_eq!(ledger.accepted_nonces(), nonces_after_first);
}

#[tokio::test]
async fn partial_run_plus_resume_matches_a_full_run() {
    // Resume idempotence: the final authoritative state is identical
    // whether the migration ran once or was interrupted and resumed
    let registry = two_resource_registry();

    let full = SimLedger::bootstrap(&registry, &deployer());
    {
        let dir = tempfile::tempdir().unwrap();
        let handle = handle_over(&registry, &full, &dir.path().join("journal.jsonl"));
        handle.execute().await.unwrap();
    }

    let interrupted = SimLedger::bootstrap(&registry, &deployer());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    interrupted.set_faults(FaultSchedule::none().with_rejection("vat", StepKind::Revoke));
    {
        let handle = handle_over(&registry, &interrupted, &path);
        handle.execute().await.unwrap_err();
    }
    interrupted.set_faults(FaultSchedule::none());
    {
        let handle = handle_over(&registry, &interrupted, &path);
        handle.resume().await.unwrap();
    }

    for spec in registry.iter() {
        assert_eq!(
            full.admins(&spec.id),
            interrupted.admins(&spec.id),
            "admin sets diverged on {}",
            spec.id
        );
        assert_eq!(
            full.owner(&spec.id),
            interrupted.owner(&spec.id),
            "ownership diverged on {}",
            spec.id
        );
    }
}

#[tokio::test]
async fn journal_live_state_disagreement_halts_resume() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    let registry = two_resource_registry();
    let ledger = SimLedger::bootstrap(&registry, &deployer());

    {
        let handle = handle_over(&registry, &ledger, &path);
        handle.execute().await.unwrap();
    }

    // Someone revokes the governance grant behind the orchestrator's back
    ledger.remove_admin_out_of_band(&ResourceId::from("vat"), &governance());

    let handle = handle_over(&registry, &ledger, &path);
    let err = handle.resume().await.unwrap_err();
    match err {
        MigrationError::Resume(ResumeError::Inconsistency { resource, kind }) => {
            assert_eq!(resource.as_str(), "vat");
            assert_eq!(kind, StepKind::Grant);
        }
        other => panic!("expected inconsistency, got {other}"),
    }

    // Manual reconciliation required; nothing was submitted
    let nonces = ledger.accepted_nonces();
    assert_eq!(nonces.len(), 3);
}

#[tokio::test]
async fn resume_with_empty_journal_runs_from_the_top() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    let registry = two_resource_registry();
    let ledger = SimLedger::bootstrap(&registry, &deployer());

    let handle = handle_over(&registry, &ledger, &path);
    let report = handle.resume().await.unwrap();
    assert_eq!(report.steps_run, 3);
    assert!(handle.status().complete);
}

#[tokio::test]
async fn submitted_but_unconfirmed_steps_are_rerun() {
    // A crash between submission and confirmation leaves a Submitted
    // record; the step is not Confirmed, so resume runs it again, and the
    // idempotent resource contract absorbs the duplicate
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.jsonl");
    let registry = two_resource_registry();
    let ledger = SimLedger::bootstrap(&registry, &deployer());

    let migration_id = {
        let handle = handle_over(&registry, &ledger, &path);
        let plan = handle.plan().unwrap();
        let grant = plan.find_step(&ResourceId::from("vat"), StepKind::Grant).unwrap();
        handle
            .journal()
            .append(handover_core::ExecutionRecord::for_step(
                plan.migration_id,
                grant,
                Some(0),
                None,
                StepStatus::Submitted,
            ))
            .unwrap();
        plan.migration_id
    };

    let handle = handle_over(&registry, &ledger, &path);
    let report = handle.resume().await.unwrap();
    assert_eq!(report.migration_id, migration_id);
    assert_eq!(report.steps_run, 3);
    assert!(handle.status().complete);
}

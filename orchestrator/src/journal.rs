//! Execution journal
//!
//! Append-only, hash-chained record of every step status transition. The
//! journal is the single durable source of truth for resumability; it is
//! never the authority for deciding whether a revoke is safe (the guard
//! queries live state for that), and it is never mutated in place.
//!
//! Two backings: in-memory (tests, rehearsals) and a JSON-lines file
//! synced on every append, re-verified against the hash chain on load.

use crate::error::JournalError;
use handover_core::{ExecutionRecord, MigrationId, ResourceId, StepKind, StepStatus};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Append-only execution record store
pub struct ExecutionJournal {
    inner: Mutex<Vec<ExecutionRecord>>,
    sink: Option<Mutex<File>>,
}

impl ExecutionJournal {
    /// Journal with no durable backing
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
            sink: None,
        }
    }

    /// Open (or create) a file-backed journal, loading any existing
    /// records and verifying the hash chain before trusting them.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref();
        let mut records = Vec::new();
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                records.push(serde_json::from_str::<ExecutionRecord>(&line)?);
            }
            verify_chain(&records)?;
        }
        let sink = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            inner: Mutex::new(records),
            sink: Some(Mutex::new(sink)),
        })
    }

    /// Append one record, chaining it onto the previous one. The caller's
    /// `prev_hash`/`hash` are overwritten.
    pub fn append(&self, mut record: ExecutionRecord) -> Result<(), JournalError> {
        let mut guard = self.inner.lock();
        record.prev_hash = guard.last().map_or([0u8; 32], |r| r.hash);
        record.hash = compute_hash(&record);

        if let Some(sink) = &self.sink {
            let mut file = sink.lock();
            let line = serde_json::to_string(&record)?;
            writeln!(file, "{line}")?;
            file.sync_data()?;
        }

        guard.push(record);
        Ok(())
    }

    /// Snapshot of all records, oldest first
    #[must_use]
    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.inner.lock().clone()
    }

    /// Whether any record has been appended
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Migration run the journal belongs to (from its first record)
    #[must_use]
    pub fn migration_id(&self) -> Option<MigrationId> {
        self.inner.lock().first().map(|r| r.migration_id)
    }

    /// Latest record for `(migration, resource, kind)`
    #[must_use]
    pub fn latest_record(
        &self,
        migration_id: MigrationId,
        resource: &ResourceId,
        kind: StepKind,
    ) -> Option<ExecutionRecord> {
        self.inner
            .lock()
            .iter()
            .rev()
            .find(|r| {
                r.migration_id == migration_id && &r.resource_id == resource && r.kind == kind
            })
            .cloned()
    }

    /// Latest recorded status for `(migration, resource, kind)`
    #[must_use]
    pub fn latest_status(
        &self,
        migration_id: MigrationId,
        resource: &ResourceId,
        kind: StepKind,
    ) -> Option<StepStatus> {
        self.latest_record(migration_id, resource, kind).map(|r| r.status)
    }

    /// Highest nonce among Confirmed records. All submissions in a run
    /// come from the single deployer account, so this is per-account by
    /// construction.
    #[must_use]
    pub fn highest_confirmed_nonce(&self) -> Option<u64> {
        self.inner
            .lock()
            .iter()
            .filter(|r| r.status == StepStatus::Confirmed)
            .filter_map(|r| r.nonce)
            .max()
    }

    /// Walk the hash chain and recompute every record hash
    pub fn verify_integrity(&self) -> Result<(), JournalError> {
        verify_chain(&self.inner.lock())
    }
}

impl std::fmt::Debug for ExecutionJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionJournal")
            .field("records", &self.inner.lock().len())
            .field("durable", &self.sink.is_some())
            .finish()
    }
}

fn verify_chain(records: &[ExecutionRecord]) -> Result<(), JournalError> {
    let mut prev = [0u8; 32];
    for (index, record) in records.iter().enumerate() {
        if record.prev_hash != prev {
            return Err(JournalError::IntegrityViolation { index });
        }
        if record.hash != compute_hash(record) {
            return Err(JournalError::IntegrityViolation { index });
        }
        prev = record.hash;
    }
    Ok(())
}

fn kind_byte(kind: StepKind) -> u8 {
    match kind {
        StepKind::Grant => 1,
        StepKind::Transfer => 2,
        StepKind::Revoke => 3,
    }
}

fn status_byte(status: StepStatus) -> u8 {
    match status {
        StepStatus::Pending => 0,
        StepStatus::Submitted => 1,
        StepStatus::Confirmed => 2,
        StepStatus::Failed => 3,
    }
}

fn compute_hash(record: &ExecutionRecord) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(record.migration_id.0.as_bytes());
    hasher.update(record.step_id.0.to_string().as_bytes());
    hasher.update(record.resource_id.as_str().as_bytes());
    hasher.update([0]);
    hasher.update([kind_byte(record.kind)]);
    hasher.update(record.principal.as_str().as_bytes());
    hasher.update([0]);
    match record.nonce {
        Some(nonce) => {
            hasher.update([1]);
            hasher.update(nonce.to_le_bytes());
        }
        None => hasher.update([0]),
    }
    if let Some(tx) = &record.tx_ref {
        hasher.update(tx.0.as_bytes());
    }
    hasher.update([0]);
    hasher.update([status_byte(record.status)]);
    hasher.update(record.timestamp.timestamp_millis().to_le_bytes());
    hasher.update(record.prev_hash);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use handover_core::{MigrationStep, Principal, TxRef};

    fn record(status: StepStatus) -> ExecutionRecord {
        let step = MigrationStep::new(
            ResourceId::from("vat"),
            StepKind::Grant,
            Principal::from("0xGOV"),
        );
        ExecutionRecord::for_step(MigrationId::new(), &step, Some(0), None, status)
    }

    #[test]
    fn chain_survives_appends() {
        let journal = ExecutionJournal::in_memory();
        journal.append(record(StepStatus::Submitted)).unwrap();
        journal.append(record(StepStatus::Confirmed)).unwrap();
        assert!(journal.verify_integrity().is_ok());

        let records = journal.records();
        assert_eq!(records[1].prev_hash, records[0].hash);
    }

    #[test]
    fn tampering_breaks_the_chain() {
        let journal = ExecutionJournal::in_memory();
        journal.append(record(StepStatus::Submitted)).unwrap();
        journal.append(record(StepStatus::Confirmed)).unwrap();

        let mut records = journal.records();
        records[0].tx_ref = Some(TxRef("0xforged".to_string()));
        assert!(matches!(
            verify_chain(&records),
            Err(JournalError::IntegrityViolation { index: 0 })
        ));
    }

    #[test]
    fn latest_status_wins() {
        let journal = ExecutionJournal::in_memory();
        let migration_id = MigrationId::new();
        let step = MigrationStep::new(
            ResourceId::from("vat"),
            StepKind::Grant,
            Principal::from("0xGOV"),
        );
        journal
            .append(ExecutionRecord::for_step(migration_id, &step, Some(0), None, StepStatus::Submitted))
            .unwrap();
        journal
            .append(ExecutionRecord::for_step(migration_id, &step, Some(0), None, StepStatus::Confirmed))
            .unwrap();

        assert_eq!(
            journal.latest_status(migration_id, &ResourceId::from("vat"), StepKind::Grant),
            Some(StepStatus::Confirmed)
        );
        assert_eq!(
            journal.latest_status(migration_id, &ResourceId::from("vat"), StepKind::Revoke),
            None
        );
    }

    #[test]
    fn highest_confirmed_nonce_ignores_unconfirmed() {
        let journal = ExecutionJournal::in_memory();
        let migration_id = MigrationId::new();
        let step = MigrationStep::new(
            ResourceId::from("vat"),
            StepKind::Grant,
            Principal::from("0xGOV"),
        );
        journal
            .append(ExecutionRecord::for_step(migration_id, &step, Some(3), None, StepStatus::Confirmed))
            .unwrap();
        journal
            .append(ExecutionRecord::for_step(migration_id, &step, Some(9), None, StepStatus::Submitted))
            .unwrap();

        assert_eq!(journal.highest_confirmed_nonce(), Some(3));
    }

    #[test]
    fn file_backed_journal_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");

        let migration_id = MigrationId::new();
        let step = MigrationStep::new(
            ResourceId::from("vat"),
            StepKind::Grant,
            Principal::from("0xGOV"),
        );
        {
            let journal = ExecutionJournal::open_file(&path).unwrap();
            journal
                .append(ExecutionRecord::for_step(migration_id, &step, Some(0), None, StepStatus::Submitted))
                .unwrap();
            journal
                .append(ExecutionRecord::for_step(migration_id, &step, Some(0), None, StepStatus::Confirmed))
                .unwrap();
        }

        let reloaded = ExecutionJournal::open_file(&path).unwrap();
        assert_eq!(reloaded.records().len(), 2);
        assert_eq!(reloaded.migration_id(), Some(migration_id));
        assert_eq!(
            reloaded.latest_status(migration_id, &ResourceId::from("vat"), StepKind::Grant),
            Some(StepStatus::Confirmed)
        );
    }

    #[test]
    fn corrupted_file_is_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        {
            let journal = ExecutionJournal::open_file(&path).unwrap();
            journal.append(record(StepStatus::Submitted)).unwrap();
            journal.append(record(StepStatus::Confirmed)).unwrap();
        }

        // Flip a byte in the first line
        let contents = std::fs::read_to_string(&path).unwrap();
        let tampered = contents.replacen("vat", "tav", 1);
        std::fs::write(&path, tampered).unwrap();

        assert!(matches!(
            ExecutionJournal::open_file(&path),
            Err(JournalError::IntegrityViolation { .. })
        ));
    }
}

//! Batched, retrying upsert of structured records into a relational store.

use async_trait::async_trait;
use nhatro_core::StructuredRecord;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};

use crate::retry::{RetryDisposition, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// Lock wait timed out or a deadlock was detected. Safe to retry the row.
    #[error("transient lock failure: {0}")]
    TransientLock(String),
    #[error("{0}")]
    Fatal(String),
}

impl DbError {
    pub fn disposition(&self) -> RetryDisposition {
        match self {
            DbError::TransientLock(_) => RetryDisposition::Retryable,
            DbError::Fatal(_) => RetryDisposition::NonRetryable,
        }
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("opening database session: {0}")]
    Connect(#[source] DbError),
    #[error("ensuring listing table: {0}")]
    Schema(#[source] DbError),
    #[error(
        "row {row} ({id}) failed after {attempts} attempt(s); {committed} row(s) committed before the failure: {source}"
    )]
    Aborted {
        row: usize,
        id: String,
        attempts: u32,
        committed: usize,
        #[source]
        source: DbError,
    },
    #[error("transaction control failed; {committed} row(s) committed before the failure: {source}")]
    Transaction {
        committed: usize,
        #[source]
        source: DbError,
    },
}

impl ImportError {
    /// Rows durably committed before the import stopped.
    pub fn committed(&self) -> usize {
        match self {
            ImportError::Connect(_) | ImportError::Schema(_) => 0,
            ImportError::Aborted { committed, .. } | ImportError::Transaction { committed, .. } => {
                *committed
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// One database session as seen by the import loop.
///
/// `upsert` must leave the surrounding transaction usable when it fails, so a
/// retried row does not poison rows already written in the same batch.
#[async_trait]
pub trait UpsertSession: Send {
    async fn ensure_schema(&mut self) -> Result<(), DbError>;
    async fn begin(&mut self) -> Result<(), DbError>;
    async fn upsert(&mut self, record: &StructuredRecord) -> Result<UpsertOutcome, DbError>;
    async fn commit(&mut self) -> Result<(), DbError>;
    async fn rollback(&mut self) -> Result<(), DbError>;
    async fn close(&mut self);
}

#[derive(Debug, Clone, Copy)]
pub struct ImportSettings {
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub processed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped_without_id: usize,
    pub retried_attempts: usize,
    pub batches_committed: usize,
}

/// Import `records` through an already-open session, then close it whatever
/// the outcome.
pub async fn run_import<S>(
    session: &mut S,
    records: &[StructuredRecord],
    settings: &ImportSettings,
) -> Result<ImportReport, ImportError>
where
    S: UpsertSession + ?Sized,
{
    let span = info_span!("db_import", records = records.len(), batch_size = settings.batch_size);
    let result = import_records(session, records, settings)
        .instrument(span)
        .await;
    session.close().await;
    result
}

/// Upsert every record with an id, committing every `batch_size` rows and once
/// more for the remainder. On failure the open batch is rolled back; earlier
/// batches stay committed.
pub async fn import_records<S>(
    session: &mut S,
    records: &[StructuredRecord],
    settings: &ImportSettings,
) -> Result<ImportReport, ImportError>
where
    S: UpsertSession + ?Sized,
{
    let batch_size = settings.batch_size.max(1);
    let eligible: Vec<&StructuredRecord> = records.iter().filter(|r| r.has_identity()).collect();
    let mut report = ImportReport {
        skipped_without_id: records.len() - eligible.len(),
        ..ImportReport::default()
    };
    if report.skipped_without_id > 0 {
        warn!(skipped = report.skipped_without_id, "records without an id are not imported");
    }

    session.ensure_schema().await.map_err(ImportError::Schema)?;
    if eligible.is_empty() {
        return Ok(report);
    }

    let mut committed = 0usize;
    session
        .begin()
        .await
        .map_err(|source| ImportError::Transaction { committed, source })?;

    for (row, record) in eligible.iter().enumerate() {
        match upsert_with_retry(session, record, &settings.retry).await {
            Ok((outcome, attempts)) => {
                report.processed += 1;
                report.retried_attempts += (attempts - 1) as usize;
                match outcome {
                    UpsertOutcome::Inserted => report.inserted += 1,
                    UpsertOutcome::Updated => report.updated += 1,
                }
            }
            Err((attempts, source)) => {
                error!(row, id = %record.id, attempts, error = %source, "upsert failed; aborting import");
                abandon_batch(session).await;
                return Err(ImportError::Aborted {
                    row,
                    id: record.id.clone(),
                    attempts,
                    committed,
                    source,
                });
            }
        }

        let done = row + 1;
        if done % batch_size == 0 {
            commit_batch(session, &mut committed, done, &mut report).await?;
            if done < eligible.len() {
                session
                    .begin()
                    .await
                    .map_err(|source| ImportError::Transaction { committed, source })?;
            }
        }
    }

    if eligible.len() % batch_size != 0 {
        commit_batch(session, &mut committed, eligible.len(), &mut report).await?;
    }

    info!(
        processed = report.processed,
        inserted = report.inserted,
        updated = report.updated,
        batches = report.batches_committed,
        "import finished"
    );
    Ok(report)
}

async fn upsert_with_retry<S>(
    session: &mut S,
    record: &StructuredRecord,
    policy: &RetryPolicy,
) -> Result<(UpsertOutcome, u32), (u32, DbError)>
where
    S: UpsertSession + ?Sized,
{
    let mut attempt = 1u32;
    loop {
        match session.upsert(record).await {
            Ok(outcome) => return Ok((outcome, attempt)),
            Err(err) if policy.should_retry(err.disposition(), attempt) => {
                warn!(
                    id = %record.id,
                    attempt,
                    max_attempts = policy.attempts(),
                    error = %err,
                    "lock contention on upsert; retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => return Err((attempt, err)),
        }
    }
}

async fn commit_batch<S>(
    session: &mut S,
    committed: &mut usize,
    done: usize,
    report: &mut ImportReport,
) -> Result<(), ImportError>
where
    S: UpsertSession + ?Sized,
{
    if let Err(source) = session.commit().await {
        abandon_batch(session).await;
        return Err(ImportError::Transaction {
            committed: *committed,
            source,
        });
    }
    *committed = done;
    report.batches_committed += 1;
    info!(committed = done, "batch committed");
    Ok(())
}

async fn abandon_batch<S>(session: &mut S)
where
    S: UpsertSession + ?Sized,
{
    if let Err(err) = session.rollback().await {
        error!(error = %err, "rollback of open batch failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    /// In-memory session: a committed table plus a pending batch.
    #[derive(Default)]
    struct FakeSession {
        committed: HashMap<String, StructuredRecord>,
        pending: Vec<StructuredRecord>,
        in_tx: bool,
        scripted_failures: HashMap<String, VecDeque<DbError>>,
        upsert_calls: usize,
        commits: usize,
        rollbacks: usize,
        closed: bool,
    }

    impl FakeSession {
        fn fail(mut self, id: &str, errors: Vec<DbError>) -> Self {
            self.scripted_failures
                .insert(id.to_string(), errors.into_iter().collect());
            self
        }
    }

    #[async_trait]
    impl UpsertSession for FakeSession {
        async fn ensure_schema(&mut self) -> Result<(), DbError> {
            Ok(())
        }

        async fn begin(&mut self) -> Result<(), DbError> {
            assert!(!self.in_tx, "nested transaction");
            self.in_tx = true;
            Ok(())
        }

        async fn upsert(&mut self, record: &StructuredRecord) -> Result<UpsertOutcome, DbError> {
            assert!(self.in_tx, "upsert outside a transaction");
            self.upsert_calls += 1;
            if let Some(err) = self
                .scripted_failures
                .get_mut(&record.id)
                .and_then(VecDeque::pop_front)
            {
                return Err(err);
            }
            let existed = self.committed.contains_key(&record.id)
                || self.pending.iter().any(|p| p.id == record.id);
            self.pending.retain(|p| p.id != record.id);
            self.pending.push(record.clone());
            Ok(if existed {
                UpsertOutcome::Updated
            } else {
                UpsertOutcome::Inserted
            })
        }

        async fn commit(&mut self) -> Result<(), DbError> {
            for record in self.pending.drain(..) {
                self.committed.insert(record.id.clone(), record);
            }
            self.in_tx = false;
            self.commits += 1;
            Ok(())
        }

        async fn rollback(&mut self) -> Result<(), DbError> {
            self.pending.clear();
            self.in_tx = false;
            self.rollbacks += 1;
            Ok(())
        }

        async fn close(&mut self) {
            self.closed = true;
        }
    }

    fn records(n: usize) -> Vec<StructuredRecord> {
        let ts = Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).single().unwrap();
        (0..n)
            .map(|i| {
                let content = format!("phòng số {i}");
                let mut record = StructuredRecord::empty(ts);
                record.id = nhatro_core::fingerprint(&content);
                record.content = content;
                record.price = 1_000_000 + i as i64;
                record
            })
            .collect()
    }

    fn settings(batch_size: usize, max_attempts: u32) -> ImportSettings {
        ImportSettings {
            batch_size,
            retry: RetryPolicy::fixed(max_attempts, Duration::ZERO),
        }
    }

    fn lock() -> DbError {
        DbError::TransientLock("lock timeout".to_string())
    }

    #[tokio::test]
    async fn commits_every_batch_plus_remainder() {
        let mut session = FakeSession::default();
        let report = import_records(&mut session, &records(5), &settings(2, 3))
            .await
            .unwrap();

        assert_eq!(report.processed, 5);
        assert_eq!(report.inserted, 5);
        assert_eq!(report.batches_committed, 3);
        assert_eq!(session.commits, 3);
        assert_eq!(session.committed.len(), 5);
        assert!(!session.in_tx);
    }

    #[tokio::test]
    async fn exact_multiple_of_batch_size_has_no_empty_commit() {
        let mut session = FakeSession::default();
        let report = import_records(&mut session, &records(4), &settings(2, 3))
            .await
            .unwrap();
        assert_eq!(report.batches_committed, 2);
        assert_eq!(session.commits, 2);
    }

    #[tokio::test]
    async fn transient_lock_is_retried_and_counted_once() {
        let rows = records(3);
        let mut session = FakeSession::default().fail(&rows[1].id, vec![lock(), lock()]);
        let report = import_records(&mut session, &rows, &settings(100, 3))
            .await
            .unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.inserted, 3);
        assert_eq!(report.retried_attempts, 2);
        assert_eq!(session.upsert_calls, 5);
        assert_eq!(session.committed.len(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_abort_but_keep_committed_batches() {
        let rows = records(5);
        let mut session = FakeSession::default().fail(&rows[3].id, vec![lock(), lock(), lock()]);
        let err = import_records(&mut session, &rows, &settings(2, 3))
            .await
            .unwrap_err();

        match &err {
            ImportError::Aborted {
                row,
                attempts,
                committed,
                source,
                ..
            } => {
                assert_eq!(*row, 3);
                assert_eq!(*attempts, 3);
                assert_eq!(*committed, 2);
                assert_eq!(source, &lock());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.committed(), 2);
        assert_eq!(session.committed.len(), 2);
        assert!(session.pending.is_empty());
        assert_eq!(session.rollbacks, 1);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let rows = records(2);
        let mut session = FakeSession::default().fail(
            &rows[0].id,
            vec![DbError::Fatal("value too long".to_string())],
        );
        let err = import_records(&mut session, &rows, &settings(10, 5))
            .await
            .unwrap_err();

        assert!(matches!(err, ImportError::Aborted { attempts: 1, .. }));
        assert_eq!(session.upsert_calls, 1);
        assert!(session.committed.is_empty());
    }

    #[tokio::test]
    async fn reimport_updates_instead_of_duplicating() {
        let rows = records(3);
        let mut session = FakeSession::default();
        import_records(&mut session, &rows, &settings(2, 3))
            .await
            .unwrap();
        let report = import_records(&mut session, &rows, &settings(2, 3))
            .await
            .unwrap();

        assert_eq!(report.updated, 3);
        assert_eq!(report.inserted, 0);
        assert_eq!(session.committed.len(), 3);
    }

    #[tokio::test]
    async fn records_without_id_are_skipped() {
        let mut rows = records(2);
        rows.push(StructuredRecord::empty(rows[0].timestamp));
        let mut session = FakeSession::default();
        let report = import_records(&mut session, &rows, &settings(10, 3))
            .await
            .unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.skipped_without_id, 1);
    }

    #[tokio::test]
    async fn session_is_closed_on_failure() {
        let rows = records(1);
        let mut session =
            FakeSession::default().fail(&rows[0].id, vec![DbError::Fatal("boom".to_string())]);
        let result = run_import(&mut session, &rows, &settings(10, 3)).await;
        assert!(result.is_err());
        assert!(session.closed);
        assert_eq!(session.rollbacks, 1);
    }
}

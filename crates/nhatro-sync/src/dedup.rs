use std::collections::HashSet;

use nhatro_core::StructuredRecord;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Duplicate,
    WithoutIdentity,
}

/// Tally for one page of offered records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub accepted: usize,
    pub duplicates: usize,
    pub without_identity: usize,
}

impl BatchOutcome {
    /// False means a paginated fetch can stop asking for more pages.
    pub fn added_any(&self) -> bool {
        self.accepted > 0
    }

    pub fn tally(&mut self, admission: Admission) {
        match admission {
            Admission::Accepted => self.accepted += 1,
            Admission::Duplicate => self.duplicates += 1,
            Admission::WithoutIdentity => self.without_identity += 1,
        }
    }

    pub fn absorb(&mut self, other: BatchOutcome) {
        self.accepted += other.accepted;
        self.duplicates += other.duplicates;
        self.without_identity += other.without_identity;
    }
}

/// Identities persisted so far plus everything accepted this run, in
/// acceptance order.
#[derive(Debug, Default)]
pub struct DedupStore {
    seen: HashSet<String>,
    records: Vec<StructuredRecord>,
    seeded: usize,
}

impl DedupStore {
    /// Seed from previously persisted records. Repeated or empty ids in the
    /// existing store collapse to their first occurrence.
    pub fn seeded(existing: impl IntoIterator<Item = StructuredRecord>) -> Self {
        let mut store = Self::default();
        let outcome = store.offer_batch(existing);
        if outcome.duplicates + outcome.without_identity > 0 {
            debug!(
                duplicates = outcome.duplicates,
                without_identity = outcome.without_identity,
                "collapsed seed rows"
            );
        }
        store.seeded = store.records.len();
        store
    }

    pub fn offer(&mut self, record: StructuredRecord) -> Admission {
        if !record.has_identity() {
            return Admission::WithoutIdentity;
        }
        if !self.seen.insert(record.id.clone()) {
            debug!(id = %record.id, "already seen");
            return Admission::Duplicate;
        }
        self.records.push(record);
        Admission::Accepted
    }

    pub fn offer_batch(
        &mut self,
        records: impl IntoIterator<Item = StructuredRecord>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for record in records {
            outcome.tally(self.offer(record));
        }
        outcome
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every record: the seeded ones first, then this run's.
    pub fn records(&self) -> &[StructuredRecord] {
        &self.records
    }

    pub fn new_records(&self) -> &[StructuredRecord] {
        &self.records[self.seeded..]
    }
}

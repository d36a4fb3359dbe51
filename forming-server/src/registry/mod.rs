pub mod filter;
pub mod memory;
pub mod query;
pub mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;
use forming_core::{Reading, SkipReason, SkipRecord, StoredRecord, Summary};
use jiff::Timestamp;

use query::ReadingQuery;

/// Append-only store for accepted readings and skip records.
///
/// Writes are durable when the call returns and reads observe every write
/// that completed before them. Implementations are shared between the
/// ingest loop and concurrent dashboard requests, so they must be safe to
/// use from many tasks without outside locking.
#[async_trait]
pub trait RecordRegistry: Clone + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persists an accepted reading and returns it with its assigned id.
    async fn store_reading(
        &self,
        reading: Reading,
        received_at: Timestamp,
    ) -> Result<StoredRecord, Self::Error>;

    /// Persists a rejected reading for audit.
    async fn store_skip(
        &self,
        reading: Reading,
        reason: SkipReason,
        skipped_at: Timestamp,
    ) -> Result<SkipRecord, Self::Error>;

    async fn list(&self, query: &ReadingQuery) -> Result<Vec<StoredRecord>, Self::Error>;

    /// Per-prefix totals over readings received at or after `since`,
    /// ordered by prefix label.
    async fn summarize(&self, since: Timestamp) -> Result<Vec<Summary>, Self::Error>;

    /// Distinct prefixes seen so far, ascending.
    async fn prefixes(&self) -> Result<Vec<String>, Self::Error>;

    /// Most recent skip records first.
    async fn list_skips(&self, limit: usize) -> Result<Vec<SkipRecord>, Self::Error>;
}

/// Groups `(label, weight)` rows into per-label totals ordered by label.
///
/// Weight totals saturate at the `i64` bounds instead of overflowing.
pub(crate) fn summarize_weights<L, I>(rows: I) -> Vec<Summary>
where
    L: Ord + Into<Box<str>>,
    I: IntoIterator<Item = (L, i64)>,
{
    let mut totals: BTreeMap<L, (u64, i64)> = BTreeMap::new();
    for (label, weight) in rows {
        let entry = totals.entry(label).or_default();
        entry.0 += 1;
        entry.1 = entry.1.saturating_add(weight);
    }

    totals
        .into_iter()
        .map(|(label, (count, total_weight))| Summary {
            prefix: label.into(),
            count,
            total_weight,
        })
        .collect()
}


#[cfg(test)]
pub(crate) mod unavailable {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("database is locked")]
    pub struct Locked;

    /// Registry whose every call fails, standing in for an unreachable store.
    #[derive(Clone, Default)]
    pub struct UnavailableRegistry;

    #[async_trait]
    impl RecordRegistry for UnavailableRegistry {
        type Error = Locked;

        async fn store_reading(&self, _: Reading, _: Timestamp) -> Result<StoredRecord, Locked> {
            Err(Locked)
        }

        async fn store_skip(
            &self,
            _: Reading,
            _: SkipReason,
            _: Timestamp,
        ) -> Result<SkipRecord, Locked> {
            Err(Locked)
        }

        async fn list(&self, _: &ReadingQuery) -> Result<Vec<StoredRecord>, Locked> {
            Err(Locked)
        }

        async fn summarize(&self, _: Timestamp) -> Result<Vec<Summary>, Locked> {
            Err(Locked)
        }

        async fn prefixes(&self) -> Result<Vec<String>, Locked> {
            Err(Locked)
        }

        async fn list_skips(&self, _: usize) -> Result<Vec<SkipRecord>, Locked> {
            Err(Locked)
        }
    }
}

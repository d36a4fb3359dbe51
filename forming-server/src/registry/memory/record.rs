use std::collections::BTreeSet;
use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use forming_core::{
    Reading, RecordId, SkipId, SkipReason, SkipRecord, StoredRecord, Summary, UNKNOWN_PREFIX,
};
use jiff::Timestamp;
use tokio::sync::RwLock;

use crate::registry::{RecordRegistry, query::ReadingQuery, summarize_weights};

/// Registry that keeps everything in process memory.
///
/// Ids are positions in the append-only vectors, so they are monotonic
/// for the lifetime of the process.
#[derive(Clone, Default)]
pub struct InMemoryRecordRegistry {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    readings: Vec<StoredRecord>,
    skips: Vec<SkipRecord>,
}

impl InMemoryRecordRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordRegistry for InMemoryRecordRegistry {
    type Error = Infallible;

    async fn store_reading(
        &self,
        reading: Reading,
        received_at: Timestamp,
    ) -> Result<StoredRecord, Self::Error> {
        let mut inner = self.inner.write().await;

        let record = StoredRecord {
            id: RecordId(inner.readings.len() as i64 + 1),
            reading,
            received_at,
        };
        inner.readings.push(record.clone());

        Ok(record)
    }

    async fn store_skip(
        &self,
        reading: Reading,
        reason: SkipReason,
        skipped_at: Timestamp,
    ) -> Result<SkipRecord, Self::Error> {
        let mut inner = self.inner.write().await;

        let record = SkipRecord {
            id: SkipId(inner.skips.len() as i64 + 1),
            reading,
            reason,
            skipped_at,
        };
        inner.skips.push(record.clone());

        Ok(record)
    }

    async fn list(&self, query: &ReadingQuery) -> Result<Vec<StoredRecord>, Self::Error> {
        let inner = self.inner.read().await;
        Ok(query.apply(&inner.readings))
    }

    async fn summarize(&self, since: Timestamp) -> Result<Vec<Summary>, Self::Error> {
        let inner = self.inner.read().await;

        let rows = inner
            .readings
            .iter()
            .filter(|r| r.received_at >= since)
            .map(|r| {
                let label = r.reading.prefix.as_deref().unwrap_or(UNKNOWN_PREFIX);
                (label, r.reading.weight)
            });

        Ok(summarize_weights(rows))
    }

    async fn prefixes(&self) -> Result<Vec<String>, Self::Error> {
        let inner = self.inner.read().await;

        let prefixes: BTreeSet<&str> = inner
            .readings
            .iter()
            .filter_map(|r| r.reading.prefix.as_deref())
            .collect();

        Ok(prefixes.into_iter().map(str::to_string).collect())
    }

    async fn list_skips(&self, limit: usize) -> Result<Vec<SkipRecord>, Self::Error> {
        let inner = self.inner.read().await;

        let mut skips = inner.skips.clone();
        skips.sort_by(|a, b| b.skipped_at.cmp(&a.skipped_at).then(b.id.cmp(&a.id)));
        skips.truncate(limit);

        Ok(skips)
    }
}

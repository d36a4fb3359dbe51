use forming_core::Summary;
use jiff::{SignedDuration, Timestamp};

use crate::query::QueryError;
use crate::registry::RecordRegistry;

/// Trailing window covered by [`Aggregator::summarize`].
pub const SUMMARY_WINDOW: SignedDuration = SignedDuration::from_hours(1);

/// Per-prefix totals over the last hour, recomputed on every call.
#[derive(Clone)]
pub struct Aggregator<R> {
    registry: Option<R>,
}

impl<R: RecordRegistry> Aggregator<R> {
    pub fn new(registry: Option<R>) -> Self {
        Self { registry }
    }

    pub async fn summarize(&self) -> Result<Vec<Summary>, QueryError> {
        self.summarize_at(Timestamp::now()).await
    }

    pub async fn summarize_at(&self, now: Timestamp) -> Result<Vec<Summary>, QueryError> {
        let Some(registry) = &self.registry else {
            return Ok(Vec::new());
        };
        registry
            .summarize(now - SUMMARY_WINDOW)
            .await
            .map_err(QueryError::storage)
    }
}

use forming_core::{SkipRecord, StoredRecord};
use jiff::tz::TimeZone;

use crate::config::QueryConfig;
use crate::registry::{
    RecordRegistry,
    filter::FilterCriteria,
    query::{FilterError, ReadingQuery},
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    InvalidFilter(#[from] FilterError),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] BoxError),
}

impl QueryError {
    pub(crate) fn storage<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        QueryError::StorageUnavailable(Box::new(error))
    }
}

/// Read side of the pipeline used by the dashboard.
///
/// Without a registry every read succeeds with no rows.
#[derive(Clone)]
pub struct QueryService<R> {
    registry: Option<R>,
    config: QueryConfig,
    tz: TimeZone,
}

impl<R: RecordRegistry> QueryService<R> {
    pub fn new(registry: Option<R>, config: QueryConfig, tz: TimeZone) -> Self {
        Self {
            registry,
            config,
            tz,
        }
    }

    /// Lists stored readings matching `criteria`.
    ///
    /// The row cap depends on whether a date range was given. Filters are
    /// validated even when no store is attached.
    pub async fn records(
        &self,
        criteria: &FilterCriteria,
    ) -> Result<Vec<StoredRecord>, QueryError> {
        let limit = if criteria.has_date_range() {
            self.config.range_limit
        } else {
            self.config.recent_limit
        };
        let query = ReadingQuery::build(criteria, &self.tz, limit)?;

        let Some(registry) = &self.registry else {
            return Ok(Vec::new());
        };
        registry.list(&query).await.map_err(QueryError::storage)
    }

    pub async fn prefixes(&self) -> Result<Vec<String>, QueryError> {
        let Some(registry) = &self.registry else {
            return Ok(Vec::new());
        };
        registry.prefixes().await.map_err(QueryError::storage)
    }

    pub async fn skip_log(&self) -> Result<Vec<SkipRecord>, QueryError> {
        let Some(registry) = &self.registry else {
            return Ok(Vec::new());
        };
        registry
            .list_skips(self.config.skip_log_limit)
            .await
            .map_err(QueryError::storage)
    }
}

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use forming_core::{
    Reading, RecordId, SkipId, SkipReason, SkipRecord, StatusCode, StoredRecord, Summary,
    UNKNOWN_PREFIX,
};
use jiff::Timestamp;
use sqlx::{
    QueryBuilder, Row, SqlitePool,
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
};

use crate::registry::{RecordRegistry, query::ReadingQuery, summarize_weights};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, thiserror::Error)]
pub enum SqliteRecordError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),
    #[error("invalid skip reason: {0}")]
    InvalidSkipReason(String),
}

#[derive(Clone)]
pub struct SqliteRecordRegistry {
    pool: SqlitePool,
}

impl SqliteRecordRegistry {
    /// Opens (creating if needed) the database at `path` and applies the
    /// schema.
    pub async fn new(
        path: impl AsRef<Path>,
        acquire_timeout: Duration,
    ) -> Result<Self, SqliteRecordError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn new_in_memory() -> Result<Self, SqliteRecordError> {
        // Every connection to `:memory:` is its own database, so the pool
        // must hold exactly one connection and never recycle it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordRegistry for SqliteRecordRegistry {
    type Error = SqliteRecordError;

    async fn store_reading(
        &self,
        reading: Reading,
        received_at: Timestamp,
    ) -> Result<StoredRecord, Self::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO readings (ts, count, status, weight, prefix, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(reading.ts.as_ref())
        .bind(reading.count)
        .bind(reading.status.0)
        .bind(reading.weight)
        .bind(reading.prefix.as_deref())
        .bind(received_at.as_millisecond())
        .execute(&self.pool)
        .await?;

        Ok(StoredRecord {
            id: RecordId(result.last_insert_rowid()),
            reading,
            received_at,
        })
    }

    async fn store_skip(
        &self,
        reading: Reading,
        reason: SkipReason,
        skipped_at: Timestamp,
    ) -> Result<SkipRecord, Self::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO skipped_readings (ts, count, status, weight, prefix, reason, skipped_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(reading.ts.as_ref())
        .bind(reading.count)
        .bind(reading.status.0)
        .bind(reading.weight)
        .bind(reading.prefix.as_deref())
        .bind(reason.as_str())
        .bind(skipped_at.as_millisecond())
        .execute(&self.pool)
        .await?;

        Ok(SkipRecord {
            id: SkipId(result.last_insert_rowid()),
            reading,
            reason,
            skipped_at,
        })
    }

    async fn list(&self, query: &ReadingQuery) -> Result<Vec<StoredRecord>, Self::Error> {
        let mut query_builder = QueryBuilder::new(
            "SELECT id, ts, count, status, weight, prefix, created_at FROM readings",
        );
        query.push_sql(&mut query_builder);

        let rows = query_builder.build().fetch_all(&self.pool).await?;

        rows.iter().map(map_row_to_record).collect()
    }

    async fn summarize(&self, since: Timestamp) -> Result<Vec<Summary>, Self::Error> {
        // Totals are folded in Rust: SQLite's SUM raises on i64 overflow.
        let rows = sqlx::query(
            r#"
            SELECT COALESCE(prefix, ?) AS label, weight
            FROM readings
            WHERE created_at >= ?
            "#,
        )
        .bind(UNKNOWN_PREFIX)
        .bind(since.as_millisecond())
        .fetch_all(&self.pool)
        .await?;

        let rows = rows
            .iter()
            .map(|r| Ok((r.try_get::<String, _>("label")?, r.try_get::<i64, _>("weight")?)))
            .collect::<Result<Vec<_>, SqliteRecordError>>()?;

        Ok(summarize_weights(rows))
    }

    async fn prefixes(&self) -> Result<Vec<String>, Self::Error> {
        let rows = sqlx::query(
            "SELECT DISTINCT prefix FROM readings WHERE prefix IS NOT NULL ORDER BY prefix ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("prefix").map_err(Into::into))
            .collect()
    }

    async fn list_skips(&self, limit: usize) -> Result<Vec<SkipRecord>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, ts, count, status, weight, prefix, reason, skipped_at
            FROM skipped_readings
            ORDER BY skipped_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row_to_skip).collect()
    }
}

fn map_row_to_reading(r: &SqliteRow) -> Result<Reading, SqliteRecordError> {
    Ok(Reading {
        ts: r.try_get::<String, _>("ts")?.into_boxed_str(),
        count: r.try_get("count")?,
        status: StatusCode(r.try_get("status")?),
        weight: r.try_get("weight")?,
        prefix: r
            .try_get::<Option<String>, _>("prefix")?
            .map(String::into_boxed_str),
    })
}

fn map_row_to_record(r: &SqliteRow) -> Result<StoredRecord, SqliteRecordError> {
    let created_at: i64 = r.try_get("created_at")?;
    let received_at = Timestamp::from_millisecond(created_at)
        .map_err(|_| SqliteRecordError::InvalidTimestamp(created_at))?;

    Ok(StoredRecord {
        id: RecordId(r.try_get("id")?),
        reading: map_row_to_reading(r)?,
        received_at,
    })
}

fn map_row_to_skip(r: &SqliteRow) -> Result<SkipRecord, SqliteRecordError> {
    let skipped_at_ms: i64 = r.try_get("skipped_at")?;
    let skipped_at = Timestamp::from_millisecond(skipped_at_ms)
        .map_err(|_| SqliteRecordError::InvalidTimestamp(skipped_at_ms))?;

    let reason: String = r.try_get("reason")?;
    let reason = reason
        .parse::<SkipReason>()
        .map_err(|_| SqliteRecordError::InvalidSkipReason(reason))?;

    Ok(SkipRecord {
        id: SkipId(r.try_get("id")?),
        reading: map_row_to_reading(r)?,
        reason,
        skipped_at,
    })
}

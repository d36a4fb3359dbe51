use forming_core::{SkipRecord, StoredRecord};
use jiff::{Timestamp, civil::Date};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::registry::filter::{FilterCriteria, SortMode};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }
}

/// Query string of `GET /records`. Empty values are treated as absent.
#[derive(Debug, Default, Deserialize)]
pub struct RecordsParams {
    pub start: Option<String>,
    pub end: Option<String>,
    pub prefix: Option<String>,
    pub status: Option<String>,
    pub sort: Option<String>,
}

fn parse_date(field: &str, value: Option<&str>) -> Result<Option<Date>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.parse().map(Some).map_err(|_| {
            ApiError::BadRequest(format!("Invalid {field} date '{v}', expected YYYY-MM-DD"))
        }),
        None => Ok(None),
    }
}

impl TryFrom<RecordsParams> for FilterCriteria {
    type Error = ApiError;

    fn try_from(params: RecordsParams) -> Result<Self, Self::Error> {
        let mut builder = FilterCriteria::builder();

        if let Some(start) = parse_date("start", params.start.as_deref())? {
            builder = builder.start(start);
        }
        if let Some(end) = parse_date("end", params.end.as_deref())? {
            builder = builder.end(end);
        }
        if let Some(prefix) = params.prefix {
            builder = builder.prefix(prefix);
        }
        if let Some(status) = params.status {
            builder = builder.status(status);
        }
        let sort = params
            .sort
            .as_deref()
            .map(SortMode::from_param)
            .unwrap_or_default();

        Ok(builder.sort(sort).build())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordResponse {
    pub id: i64,
    pub ts: String,
    pub prefix: Option<String>,
    pub count: i64,
    pub status: i64,
    pub status_text: String,
    pub weight: i64,
    pub received_at: Timestamp,
}

impl From<StoredRecord> for RecordResponse {
    fn from(record: StoredRecord) -> Self {
        let reading = record.reading;
        RecordResponse {
            id: record.id.0,
            ts: reading.ts.into(),
            prefix: reading.prefix.map(Into::into),
            count: reading.count,
            status: reading.status.0,
            status_text: reading.status.label().into_owned(),
            weight: reading.weight,
            received_at: record.received_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SkipResponse {
    pub id: i64,
    pub ts: String,
    pub prefix: Option<String>,
    pub count: i64,
    pub status: i64,
    pub weight: i64,
    pub reason: String,
    pub skipped_at: Timestamp,
}

impl From<SkipRecord> for SkipResponse {
    fn from(skip: SkipRecord) -> Self {
        let reading = skip.reading;
        SkipResponse {
            id: skip.id.0,
            ts: reading.ts.into(),
            prefix: reading.prefix.map(Into::into),
            count: reading.count,
            status: reading.status.0,
            weight: reading.weight,
            reason: skip.reason.to_string(),
            skipped_at: skip.skipped_at,
        }
    }
}

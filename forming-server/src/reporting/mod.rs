pub mod sheets;

use std::sync::Arc;

use async_trait::async_trait;
use forming_core::StoredRecord;
use tracing::{error, info, warn};

use crate::config::ReportingConfig;
use sheets::GoogleSheetsSink;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("failed to read credentials: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("unexpected response {status}: {body}")]
    Api { status: u16, body: String },
}

/// One row as it lands in the external sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub timestamp: String,
    pub prefix: String,
    pub count: i64,
    pub status: i64,
    pub weight: i64,
    pub status_text: String,
}

impl From<&StoredRecord> for ReportRow {
    fn from(record: &StoredRecord) -> Self {
        let reading = &record.reading;
        ReportRow {
            timestamp: reading.ts.to_string(),
            prefix: reading.prefix.as_deref().unwrap_or_default().to_string(),
            count: reading.count,
            status: reading.status.0,
            weight: reading.weight,
            status_text: reading.status.label().into_owned(),
        }
    }
}

impl ReportRow {
    /// Cell values in column order A..F.
    pub fn values(&self) -> serde_json::Value {
        serde_json::json!([
            self.timestamp,
            self.prefix,
            self.count,
            self.status,
            self.weight,
            self.status_text,
        ])
    }
}

/// Best-effort destination for accepted readings.
///
/// Callers bound each call with their own timeout and never let a failure
/// affect what was already stored.
#[async_trait]
pub trait ReportingSink: Send + Sync + 'static {
    async fn append_row(&self, row: ReportRow) -> Result<(), ReportError>;
}

/// Sink used when reporting is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl ReportingSink for NoopSink {
    async fn append_row(&self, _row: ReportRow) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Builds the configured sink, falling back to [`NoopSink`] when reporting
/// is absent or unusable. Never fails: reporting must not keep the
/// pipeline from starting.
pub async fn connect(config: Option<&ReportingConfig>) -> Arc<dyn ReportingSink> {
    let Some(config) = config else {
        info!("Reporting not configured, accepted readings stay local");
        return Arc::new(NoopSink);
    };

    match GoogleSheetsSink::from_config(config) {
        Ok(Some(sink)) => {
            if let Err(e) = sink.ensure_header().await {
                warn!(error = %e, "Failed to prepare sheet header");
            }
            info!(sheet = %config.sheet_name, "Google Sheets reporting enabled");
            Arc::new(sink)
        }
        Ok(None) => {
            warn!("Google Sheets credentials or spreadsheet id missing, reporting disabled");
            Arc::new(NoopSink)
        }
        Err(e) => {
            error!(error = %e, "Invalid reporting configuration, reporting disabled");
            Arc::new(NoopSink)
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use forming_core::{Classification, Reading, RecordId, SkipReason, StoredRecord, classify};
use jiff::Timestamp;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::mqtt::decode_reading;
use crate::registry::RecordRegistry;
use crate::reporting::{ReportRow, ReportingSink};

/// What happened to one reading. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored(RecordId),
    Skipped(SkipReason),
    StorageFailed,
    NoStorage,
}

/// Validates, stores and forwards readings one at a time.
///
/// Every reading results in at most one storage write. Only readings that
/// were stored are forwarded, once, and forwarding never changes the
/// outcome.
pub struct IngestCoordinator<R> {
    registry: Option<R>,
    reporter: Arc<dyn ReportingSink>,
    report_timeout: Duration,
}

impl<R: RecordRegistry> IngestCoordinator<R> {
    pub fn new(
        registry: Option<R>,
        reporter: Arc<dyn ReportingSink>,
        report_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            reporter,
            report_timeout,
        }
    }

    pub async fn ingest(&self, reading: Reading) -> IngestOutcome {
        let Some(registry) = &self.registry else {
            debug!(ts = %reading.ts, "No store attached, dropping reading");
            return IngestOutcome::NoStorage;
        };

        match classify(&reading) {
            Classification::Skipped(reason) => {
                let prefix = reading.prefix.clone();
                match registry.store_skip(reading, reason, Timestamp::now()).await {
                    Ok(skip) => {
                        info!(skip_id = skip.id.0, prefix = ?prefix, %reason, "Reading skipped")
                    }
                    Err(e) => error!(
                        error = ?e,
                        prefix = ?prefix,
                        %reason,
                        "Failed to record skipped reading"
                    ),
                }
                IngestOutcome::Skipped(reason)
            }
            Classification::Accepted => {
                let record = match registry.store_reading(reading, Timestamp::now()).await {
                    Ok(record) => record,
                    Err(e) => {
                        error!(error = ?e, "Failed to store reading");
                        return IngestOutcome::StorageFailed;
                    }
                };
                debug!(
                    record_id = record.id.0,
                    prefix = ?record.reading.prefix,
                    weight = record.reading.weight,
                    "Stored reading"
                );

                self.forward(&record).await;
                IngestOutcome::Stored(record.id)
            }
        }
    }

    async fn forward(&self, record: &StoredRecord) {
        let row = ReportRow::from(record);
        match tokio::time::timeout(self.report_timeout, self.reporter.append_row(row)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, record_id = record.id.0, "Failed to forward reading");
            }
            Err(_) => {
                warn!(
                    record_id = record.id.0,
                    timeout_ms = self.report_timeout.as_millis() as u64,
                    "Forwarding reading timed out"
                );
            }
        }
    }
}

/// Drains raw message bodies from `rx` and ingests them in arrival order.
///
/// Bodies that do not decode are logged and dropped. A reading that is
/// already being ingested when `cancel` fires is finished first.
pub async fn run_ingest_loop<R: RecordRegistry>(
    mut rx: mpsc::Receiver<Vec<u8>>,
    coordinator: IngestCoordinator<R>,
    cancel: CancellationToken,
) {
    info!("Ingest loop started");

    loop {
        let payload = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Ingest loop shutting down");
                break;
            }
            payload = rx.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };

        let reading = match decode_reading(&payload) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(error = %e, bytes = payload.len(), "Dropping undecodable message");
                continue;
            }
        };

        let outcome = coordinator.ingest(reading).await;
        debug!(?outcome, "Reading ingested");
    }
}

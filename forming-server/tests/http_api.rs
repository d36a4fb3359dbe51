use std::net::SocketAddr;

use async_trait::async_trait;
use forming_core::{Reading, SkipReason, SkipRecord, StatusCode, StoredRecord, Summary};
use forming_server::AppState;
use forming_server::aggregate::Aggregator;
use forming_server::api::{self, models::ApiResponse};
use forming_server::config::QueryConfig;
use forming_server::query::QueryService;
use forming_server::registry::RecordRegistry;
use forming_server::registry::memory::InMemoryRecordRegistry;
use forming_server::registry::query::ReadingQuery;
use jiff::Timestamp;
use jiff::tz::TimeZone;
use serde_json::Value;
use tokio::net::TcpListener;

#[derive(Debug, thiserror::Error)]
#[error("disk I/O error")]
struct DiskError;

#[derive(Clone)]
struct BrokenRegistry;

#[async_trait]
impl RecordRegistry for BrokenRegistry {
    type Error = DiskError;

    async fn store_reading(&self, _: Reading, _: Timestamp) -> Result<StoredRecord, DiskError> {
        Err(DiskError)
    }

    async fn store_skip(
        &self,
        _: Reading,
        _: SkipReason,
        _: Timestamp,
    ) -> Result<SkipRecord, DiskError> {
        Err(DiskError)
    }

    async fn list(&self, _: &ReadingQuery) -> Result<Vec<StoredRecord>, DiskError> {
        Err(DiskError)
    }

    async fn summarize(&self, _: Timestamp) -> Result<Vec<Summary>, DiskError> {
        Err(DiskError)
    }

    async fn prefixes(&self) -> Result<Vec<String>, DiskError> {
        Err(DiskError)
    }

    async fn list_skips(&self, _: usize) -> Result<Vec<SkipRecord>, DiskError> {
        Err(DiskError)
    }
}

async fn spawn_api<R: RecordRegistry>(registry: Option<R>) -> SocketAddr {
    let state = AppState {
        query: QueryService::new(registry.clone(), QueryConfig::default(), TimeZone::UTC),
        aggregator: Aggregator::new(registry),
    };
    let app = api::router().with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn get(addr: SocketAddr, path: &str) -> (u16, ApiResponse<Value>) {
    let response = reqwest::get(format!("http://{addr}{path}")).await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

fn reading(prefix: &str, weight: i64, status: i64) -> Reading {
    Reading {
        ts: "2024-05-01 08:00:00".into(),
        count: 7,
        status: StatusCode(status),
        weight,
        prefix: Some(prefix.into()),
    }
}

#[tokio::test]
async fn health_is_ok() {
    let addr = spawn_api(Some(InMemoryRecordRegistry::new())).await;

    let body = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn records_are_filtered_and_labelled() {
    let registry = InMemoryRecordRegistry::new();
    let now = Timestamp::now();
    registry.store_reading(reading("L1", 250, 25), now).await.unwrap();
    registry.store_reading(reading("L2", 300, 73), now).await.unwrap();
    registry.store_reading(reading("L1", 280, 73), now).await.unwrap();
    let addr = spawn_api(Some(registry)).await;

    let (status, body) = get(addr, "/records?prefix=L1&status=all&sort=weight_asc").await;

    assert_eq!(status, 200);
    assert!(body.success);
    let data = body.data.unwrap();
    let rows = data.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["weight"], 250);
    assert_eq!(rows[0]["status_text"], "Under Weight");
    assert_eq!(rows[1]["weight"], 280);

    let (_, body) = get(addr, "/prefixes").await;
    assert_eq!(body.data.unwrap(), serde_json::json!(["L1", "L2"]));

    let (_, body) = get(addr, "/summary").await;
    assert_eq!(
        body.data.unwrap(),
        serde_json::json!([
            { "prefix": "L1", "count": 2, "total_weight": 530 },
            { "prefix": "L2", "count": 1, "total_weight": 300 },
        ])
    );
}

#[tokio::test]
async fn invalid_filters_are_bad_requests() {
    let addr = spawn_api(Some(InMemoryRecordRegistry::new())).await;

    let (status, body) = get(addr, "/records?status=heavy").await;
    assert_eq!(status, 400);
    assert!(!body.success);
    assert!(body.message.is_some());

    let (status, _) = get(addr, "/records?start=yesterday").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn degraded_mode_serves_empty_data() {
    let addr = spawn_api::<InMemoryRecordRegistry>(None).await;

    for path in ["/records", "/summary", "/prefixes", "/skip-log"] {
        let (status, body) = get(addr, path).await;
        assert_eq!(status, 200, "{path}");
        assert_eq!(body.data.unwrap(), serde_json::json!([]), "{path}");
    }
}

#[tokio::test]
async fn storage_failure_is_unavailable() {
    let addr = spawn_api(Some(BrokenRegistry)).await;

    for path in ["/records", "/summary", "/prefixes", "/skip-log"] {
        let (status, body) = get(addr, path).await;
        assert_eq!(status, 503, "{path}");
        assert!(!body.success);
    }
}

pub mod error;
pub mod models;
pub mod records;

use axum::{Router, routing::get};

use crate::AppState;
use crate::registry::RecordRegistry;

pub fn router<R: RecordRegistry>() -> Router<AppState<R>> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/records", get(records::list_records::<R>))
        .route("/summary", get(records::summary::<R>))
        .route("/prefixes", get(records::prefixes::<R>))
        .route("/skip-log", get(records::skip_log::<R>))
}

async fn health_handler() -> &'static str {
    "OK"
}

use axum::{
    Json,
    extract::{Query, State},
};
use forming_core::Summary;

use super::error::ApiError;
use super::models::{ApiResponse, RecordResponse, RecordsParams, SkipResponse};
use crate::AppState;
use crate::registry::{RecordRegistry, filter::FilterCriteria};

pub async fn list_records<R: RecordRegistry>(
    State(state): State<AppState<R>>,
    Query(params): Query<RecordsParams>,
) -> Result<Json<ApiResponse<Vec<RecordResponse>>>, ApiError> {
    let criteria = FilterCriteria::try_from(params)?;
    let records = state.query.records(&criteria).await?;

    Ok(Json(ApiResponse::ok(
        records.into_iter().map(RecordResponse::from).collect(),
    )))
}

pub async fn summary<R: RecordRegistry>(
    State(state): State<AppState<R>>,
) -> Result<Json<ApiResponse<Vec<Summary>>>, ApiError> {
    Ok(Json(ApiResponse::ok(state.aggregator.summarize().await?)))
}

pub async fn prefixes<R: RecordRegistry>(
    State(state): State<AppState<R>>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    Ok(Json(ApiResponse::ok(state.query.prefixes().await?)))
}

pub async fn skip_log<R: RecordRegistry>(
    State(state): State<AppState<R>>,
) -> Result<Json<ApiResponse<Vec<SkipResponse>>>, ApiError> {
    let skips = state.query.skip_log().await?;
    Ok(Json(ApiResponse::ok(
        skips.into_iter().map(SkipResponse::from).collect(),
    )))
}

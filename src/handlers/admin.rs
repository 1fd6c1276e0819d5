//! Admin surface: listing, inspection, and the approve/reject decisions.
//! Decisions go through the lifecycle engine only; listing never mutates.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use uuid::Uuid;

use crate::{error::AppResult, lifecycle, models::RequestFilters, AppState};

pub async fn list_requests(
    State(state): State<AppState>,
    Query(filters): Query<RequestFilters>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let requests = state.store.list(&filters).await?;

    info!(
        count = requests.len(),
        status = filters.status.as_deref().unwrap_or("all"),
        date_range = ?filters.date_range,
        "Listed return requests"
    );

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "data": requests,
            "count": requests.len(),
        })),
    ))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let request = state.store.get(id).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "success": true, "data": request })),
    ))
}

pub async fn approve_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let request = lifecycle::approve(state.store.as_ref(), state.gateway.as_ref(), id).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "message": "Request approved successfully.",
            "data": request,
        })),
    ))
}

pub async fn reject_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let request = lifecycle::reject(state.store.as_ref(), id).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "message": "Request has been rejected.",
            "data": request,
        })),
    ))
}

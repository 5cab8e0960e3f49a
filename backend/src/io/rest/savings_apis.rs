//! # REST API for Savings
//!
//! Savings create/update/delete with status messages, and the per-type
//! groups of the savings screen.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use log::info;
use serde_json::json;

use super::error_response;
use crate::AppState;
use shared::{SaveSavingRequest, SavingStatusResponse, ToggleGroupRequest};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_savings).post(create_saving))
        .route("/groups", get(get_groups))
        .route("/groups/toggle", post(toggle_group))
        .route("/:id", put(update_saving).delete(delete_saving))
}

/// Failed writes still answer with the status message the form shows
fn status_response(created: bool, status: SavingStatusResponse) -> axum::response::Response {
    let code = match (status.success, created) {
        (true, true) => StatusCode::CREATED,
        (true, false) => StatusCode::OK,
        (false, _) => StatusCode::BAD_GATEWAY,
    };
    (code, Json(status)).into_response()
}

pub async fn list_savings(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/savings");

    match state.savings_service.list().await {
        Ok(savings) => (StatusCode::OK, Json(savings)).into_response(),
        Err(e) => error_response("list savings", e),
    }
}

pub async fn create_saving(
    State(state): State<AppState>,
    Json(request): Json<SaveSavingRequest>,
) -> impl IntoResponse {
    info!("POST /api/savings - request: {:?}", request);

    match state.savings_service.save(None, request).await {
        Ok(status) => status_response(true, status),
        Err(e) => error_response("add saving", e),
    }
}

pub async fn update_saving(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SaveSavingRequest>,
) -> impl IntoResponse {
    info!("PUT /api/savings/{} - request: {:?}", id, request);

    match state.savings_service.save(Some(&id), request).await {
        Ok(status) => status_response(false, status),
        Err(e) => error_response("update saving", e),
    }
}

pub async fn delete_saving(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    info!("DELETE /api/savings/{}", id);

    match state.savings_service.delete(&id).await {
        Ok(status) => status_response(false, status),
        Err(e) => error_response("delete saving", e),
    }
}

pub async fn get_groups(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/savings/groups");

    match state.savings_service.groups().await {
        Ok(groups) => (StatusCode::OK, Json(groups)).into_response(),
        Err(e) => error_response("group savings", e),
    }
}

pub async fn toggle_group(
    State(state): State<AppState>,
    Json(request): Json<ToggleGroupRequest>,
) -> impl IntoResponse {
    info!("POST /api/savings/groups/toggle - {}", request.savings_type);

    let expanded = state.savings_service.toggle_group(&request.savings_type).await;
    (StatusCode::OK, Json(json!({ "expanded": expanded }))).into_response()
}

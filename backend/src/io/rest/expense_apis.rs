//! # REST API for Expenses
//!
//! The expense table with its totals, and expense create/update/delete.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, put},
    Router,
};
use log::info;

use super::error_response;
use crate::AppState;
use shared::SaveExpenseRequest;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_expense_table).post(create_expense))
        .route("/:id", put(update_expense).delete(delete_expense))
}

pub async fn get_expense_table(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/expenses");

    match state.expense_service.table().await {
        Ok(table) => (StatusCode::OK, Json(table)).into_response(),
        Err(e) => error_response("load expense table", e),
    }
}

pub async fn create_expense(
    State(state): State<AppState>,
    Json(request): Json<SaveExpenseRequest>,
) -> impl IntoResponse {
    info!("POST /api/expenses - request: {:?}", request);

    match state.expense_service.create(request).await {
        Ok(expense) => (StatusCode::CREATED, Json(expense)).into_response(),
        Err(e) => error_response("create expense", e),
    }
}

pub async fn update_expense(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SaveExpenseRequest>,
) -> impl IntoResponse {
    info!("PUT /api/expenses/{} - request: {:?}", id, request);

    match state.expense_service.update(&id, request).await {
        Ok(expense) => (StatusCode::OK, Json(expense)).into_response(),
        Err(e) => error_response("update expense", e),
    }
}

pub async fn delete_expense(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    info!("DELETE /api/expenses/{}", id);

    match state.expense_service.delete(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response("delete expense", e),
    }
}

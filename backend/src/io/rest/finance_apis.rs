//! # REST API for Finance Entries
//!
//! Income, expense, and saving entries of the finance screen, batch delete,
//! and the summary totals.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use log::info;

use super::error_response;
use crate::AppState;
use shared::{DeleteFinancesRequest, DeleteFinancesResponse, SaveFinanceRequest};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_finances).post(create_finance))
        .route("/summary", get(get_summary))
        .route("/delete", post(delete_finances))
        .route("/:id", get(get_finance).put(update_finance).delete(delete_finance))
}

pub async fn list_finances(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/finances");

    match state.finance_service.list().await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(e) => error_response("list finance entries", e),
    }
}

pub async fn create_finance(
    State(state): State<AppState>,
    Json(request): Json<SaveFinanceRequest>,
) -> impl IntoResponse {
    info!("POST /api/finances - request: {:?}", request);

    match state.finance_service.add(request).await {
        Ok(record) => {
            state.finance_overview.invalidate().await;
            (StatusCode::CREATED, Json(record)).into_response()
        }
        Err(e) => error_response("create finance entry", e),
    }
}

pub async fn get_finance(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    info!("GET /api/finances/{}", id);

    match state.finance_service.get(&id).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => error_response("get finance entry", e),
    }
}

pub async fn update_finance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SaveFinanceRequest>,
) -> impl IntoResponse {
    info!("PUT /api/finances/{} - request: {:?}", id, request);

    match state.finance_service.update(&id, request).await {
        Ok(record) => {
            state.finance_overview.invalidate().await;
            (StatusCode::OK, Json(record)).into_response()
        }
        Err(e) => error_response("update finance entry", e),
    }
}

pub async fn delete_finance(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    info!("DELETE /api/finances/{}", id);

    match state.finance_service.delete(&id).await {
        Ok(()) => {
            state.finance_overview.invalidate().await;
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_response("delete finance entry", e),
    }
}

/// Delete the selected entries. A partial failure still reports an error,
/// but the deletions that succeeded are not rolled back.
pub async fn delete_finances(
    State(state): State<AppState>,
    Json(request): Json<DeleteFinancesRequest>,
) -> impl IntoResponse {
    info!("POST /api/finances/delete - {} ids", request.ids.len());

    let result = state.finance_service.delete_records(&request.ids).await;
    state.finance_overview.invalidate().await;
    match result {
        Ok(deleted_count) => (StatusCode::OK, Json(DeleteFinancesResponse { deleted_count })).into_response(),
        Err(e) => error_response("delete finance entries", e),
    }
}

pub async fn get_summary(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/finances/summary");

    match state.finance_overview.current().await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => error_response("load finance summary", e),
    }
}

#[cfg(test)]
mod tests {
    use crate::io::rest::tests::send;
    use crate::tests::test_app;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_requires_sign_in() {
        let (app, _ctx) = test_app(None);
        let (status, body) = send(&app, "GET", "/api/finances", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "no user is signed in");
    }

    #[tokio::test]
    async fn test_create_list_and_summary() {
        let (app, _ctx) = test_app(Some("u"));

        let (status, created) = send(
            &app,
            "POST",
            "/api/finances",
            Some(json!({ "kind": "income", "amount": 500.0, "name": "Salary" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["type"], 1);
        assert!(created["incomeId"].is_string());

        let (_, summary) = send(&app, "GET", "/api/finances/summary", None).await;
        assert_eq!(summary["incomeTotal"], 500.0);

        send(
            &app,
            "POST",
            "/api/finances",
            Some(json!({ "kind": "income", "amount": 250.0 })),
        )
        .await;
        let (status, listed) = send(&app, "GET", "/api/finances", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 2);

        let (_, summary) = send(&app, "GET", "/api/finances/summary", None).await;
        assert_eq!(summary["incomeTotal"], 750.0);
    }

    #[tokio::test]
    async fn test_negative_amount_is_bad_request() {
        let (app, ctx) = test_app(Some("u"));
        let (status, _) = send(
            &app,
            "POST",
            "/api/finances",
            Some(json!({ "kind": "expense", "amount": -5.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(ctx.store.len(crate::storage::Collection::Finances).await, 0);
    }

    #[tokio::test]
    async fn test_batch_delete_and_missing_entry() {
        let (app, _ctx) = test_app(Some("u"));
        let mut ids = Vec::new();
        for amount in [1.0, 2.0] {
            let (_, created) = send(
                &app,
                "POST",
                "/api/finances",
                Some(json!({ "kind": "saving", "amount": amount })),
            )
            .await;
            ids.push(created["id"].as_str().unwrap().to_string());
        }

        let (status, body) = send(&app, "POST", "/api/finances/delete", Some(json!({ "ids": ids }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deletedCount"], 2);

        let (status, _) = send(&app, "GET", &format!("/api/finances/{}", ids[0]), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

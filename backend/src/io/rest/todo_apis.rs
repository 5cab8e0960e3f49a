//! # REST API for Todos
//!
//! Todo CRUD, completion toggling, and per-occurrence completion of recurring
//! calendar-synced items.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDate;
use log::info;
use serde_json::json;

use super::error_response;
use crate::AppState;
use shared::{SaveTodoRequest, TodoListResponse};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_todos).post(create_todo))
        .route("/:id", put(update_todo).delete(delete_todo))
        .route("/:id/toggle", post(toggle_todo))
        .route("/:id/complete-all", post(complete_all_occurrences))
        .route("/:id/occurrences/:date/complete", post(complete_occurrence))
}

pub async fn list_todos(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/todos");

    match state.todo_service.list().await {
        Ok(todos) => (StatusCode::OK, Json(TodoListResponse { todos })).into_response(),
        Err(e) => error_response("list todos", e),
    }
}

pub async fn create_todo(State(state): State<AppState>, Json(request): Json<SaveTodoRequest>) -> impl IntoResponse {
    info!("POST /api/todos - request: {:?}", request);

    match state.todo_service.add(request).await {
        Ok(todo) => (StatusCode::CREATED, Json(todo)).into_response(),
        Err(e) => error_response("add todo", e),
    }
}

pub async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SaveTodoRequest>,
) -> impl IntoResponse {
    info!("PUT /api/todos/{} - request: {:?}", id, request);

    match state.todo_service.edit(&id, request).await {
        Ok(todo) => (StatusCode::OK, Json(todo)).into_response(),
        Err(e) => error_response("update todo", e),
    }
}

pub async fn delete_todo(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    info!("DELETE /api/todos/{}", id);

    match state.todo_service.remove(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response("delete todo", e),
    }
}

pub async fn toggle_todo(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    info!("POST /api/todos/{}/toggle", id);

    match state.todo_service.toggle(&id).await {
        Ok(todo) => (StatusCode::OK, Json(todo)).into_response(),
        Err(e) => error_response("toggle todo", e),
    }
}

pub async fn complete_all_occurrences(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    info!("POST /api/todos/{}/complete-all", id);

    match state.todo_service.complete_all(&id).await {
        Ok(patched) => (StatusCode::OK, Json(json!({ "patchedOccurrences": patched }))).into_response(),
        Err(e) => error_response("complete all occurrences", e),
    }
}

pub async fn complete_occurrence(
    State(state): State<AppState>,
    Path((id, date)): Path<(String, NaiveDate)>,
) -> impl IntoResponse {
    info!("POST /api/todos/{}/occurrences/{}/complete", id, date);

    match state.todo_service.complete_occurrence(&id, date).await {
        Ok(found) => (StatusCode::OK, Json(json!({ "completed": found }))).into_response(),
        Err(e) => error_response("complete occurrence", e),
    }
}

#[cfg(test)]
mod tests {
    use crate::io::rest::tests::send;
    use crate::tests::test_app;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_synced_todo_lifecycle() {
        let (app, ctx) = test_app(Some("u"));

        let (status, todo) = send(
            &app,
            "POST",
            "/api/todos",
            Some(json!({ "title": "Pay card bill", "dueDate": "2024-05-10", "addToCalendar": true })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(todo["calendarEventId"], "evt-1");
        let id = todo["id"].as_str().unwrap().to_string();

        let (status, toggled) = send(&app, "POST", &format!("/api/todos/{}/toggle", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(toggled["completed"], true);
        assert_eq!(
            ctx.calendar.event("evt-1").unwrap().summary.as_deref(),
            Some("✔ Pay card bill")
        );

        let (_, listed) = send(&app, "GET", "/api/todos", None).await;
        assert_eq!(listed["todos"].as_array().unwrap().len(), 1);

        let (status, _) = send(&app, "DELETE", &format!("/api/todos/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(ctx.calendar.calls().contains(&"delete evt-1".to_string()));
    }

    #[tokio::test]
    async fn test_past_due_date_is_bad_request() {
        let (app, _ctx) = test_app(Some("u"));
        let (status, body) = send(
            &app,
            "POST",
            "/api/todos",
            Some(json!({ "title": "Late", "dueDate": "2024-04-01" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("in the past"));
    }

    #[tokio::test]
    async fn test_occurrence_of_unsynced_todo() {
        let (app, _ctx) = test_app(Some("u"));
        let (_, todo) = send(&app, "POST", "/api/todos", Some(json!({ "title": "Stretch" }))).await;
        let id = todo["id"].as_str().unwrap();

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/todos/{}/occurrences/2024-05-03/complete", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["completed"], false);

        let (status, _) = send(&app, "POST", "/api/todos/missing/toggle", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

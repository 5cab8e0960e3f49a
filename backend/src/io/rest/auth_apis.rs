//! # REST API for Authentication
//!
//! Sign-in, sign-out, and the session probe the client uses to decide
//! between the login screen and the dashboard.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use log::info;

use super::error_response;
use crate::AppState;
use shared::{SessionResponse, SignInRequest};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sign-in", post(sign_in))
        .route("/sign-out", post(sign_out))
        .route("/session", get(session))
}

pub async fn sign_in(State(state): State<AppState>, Json(request): Json<SignInRequest>) -> impl IntoResponse {
    // Never log the password
    info!("POST /api/auth/sign-in - email: {}", request.email);

    match state.auth_service.sign_in(request).await {
        Ok(user) => (
            StatusCode::OK,
            Json(SessionResponse {
                resolved: true,
                user: Some(user),
            }),
        )
            .into_response(),
        Err(e) => error_response("sign in", e),
    }
}

pub async fn sign_out(State(state): State<AppState>) -> impl IntoResponse {
    info!("POST /api/auth/sign-out");

    match state.auth_service.sign_out().await {
        Ok(()) => (StatusCode::OK, Json(state.auth_service.state().session_response())).into_response(),
        Err(e) => error_response("sign out", e),
    }
}

pub async fn session(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/auth/session");
    (StatusCode::OK, Json(state.auth_service.state().session_response())).into_response()
}

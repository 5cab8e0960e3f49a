//! # REST API Interface Layer
//!
//! JSON endpoints for the browser client, one module per screen.
//!
//! ## Key Responsibilities
//!
//! - **API Endpoints**: One route per view-controller operation
//! - **Error Handling**: Translating domain errors into HTTP status codes
//! - **Serialization**: JSON request and response bodies
//! - **Logging**: One log line per request, plus every failure

pub mod auth_apis;
pub mod expense_apis;
pub mod finance_apis;
pub mod savings_apis;
pub mod todo_apis;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use log::error;

use crate::domain::ValidationError;
use crate::integrations::identity::AuthError;
use crate::storage::StoreError;
use shared::{ErrorResponse, RecordError};

/// Status code for a domain error, looking through any added context
pub fn status_for(e: &anyhow::Error) -> StatusCode {
    for cause in e.chain() {
        if cause.is::<ValidationError>() {
            return StatusCode::BAD_REQUEST;
        }
        if let Some(auth) = cause.downcast_ref::<AuthError>() {
            return match auth {
                AuthError::NotSignedIn | AuthError::Rejected(_) | AuthError::Expired(_) => StatusCode::UNAUTHORIZED,
            };
        }
        match cause.downcast_ref::<StoreError>() {
            Some(StoreError::NotFound { .. }) => return StatusCode::NOT_FOUND,
            Some(StoreError::Unauthorized) => return StatusCode::UNAUTHORIZED,
            _ => {}
        }
        if cause.is::<RecordError>() {
            return StatusCode::BAD_REQUEST;
        }
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Log `e` under `what` and turn it into a JSON error response
pub fn error_response(what: &str, e: anyhow::Error) -> Response {
    let status = status_for(&e);
    error!("Failed to {}: {:#}", what, e);
    (status, Json(ErrorResponse { error: e.to_string() })).into_response()
}

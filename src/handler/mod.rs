use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::service::auth::AuthError;

pub mod auth;
pub mod health;
pub mod me;

const AUTH_FAILED_CODE: &str = "authentication_failed";
const AUTH_FAILED_MESSAGE: &str = "authentication failed";

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

pub(crate) fn error_response(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
) -> Response {
    (
        status,
        Json(ErrorResponse {
            code: code.to_string(),
            message: message.into(),
        }),
    )
        .into_response()
}

pub(crate) fn auth_failed(status: StatusCode) -> Response {
    error_response(status, AUTH_FAILED_CODE, AUTH_FAILED_MESSAGE)
}

/// Logs the real cause and answers with the generic failure body.
pub(crate) fn auth_error_response(err: AuthError) -> Response {
    if err.is_client_error() {
        tracing::info!(error = %err, "authentication rejected");
        auth_failed(StatusCode::UNAUTHORIZED)
    } else {
        tracing::error!(error = %err, "authentication failed");
        auth_failed(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

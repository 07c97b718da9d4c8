use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::kernel::session::SessionError;

/// Request-level errors for the HTTP surface.
///
/// Crawl-run failures never travel this path — they are reported on the
/// event stream (`error` / `fir_status` events) so the job stays
/// resumable. This type covers everything that is rejected before or
/// outside an orchestrator invocation.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The portal session could not reach readiness; retry later.
    #[error("system is initializing, please wait")]
    SessionUnavailable,

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("portal automation failed: {0}")]
    Automation(#[from] portal_automation::AutomationError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotInitialized | SessionError::SiteUnavailable(_) => {
                ApiError::SessionUnavailable
            }
        }
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::SessionUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Automation(_) | ApiError::Database(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(json!({ "success": false, "error": self.to_string() }));
        (status, body).into_response()
    }
}

//! Session readiness and OTP login endpoints.
//!
//! These drive the portal's login flow on the shared session before any
//! job exists; together with the crawl orchestrator they are the only
//! consumers of the session manager.

use std::time::Duration;

use axum::extract::Extension;
use axum::Json;
use portal_automation::AutomationError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::common::ApiError;
use crate::server::app::AppState;

/// Attempts at pushing the mobile number into a flaky login form.
const SEND_OTP_ATTEMPTS: u32 = 3;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub ready: bool,
    pub is_logged_in: bool,
    pub status: &'static str,
}

/// GET /api/status — session readiness for the polling UI.
pub async fn status(Extension(state): Extension<AppState>) -> Json<StatusResponse> {
    let sessions = &state.deps.sessions;
    Json(StatusResponse {
        ready: sessions.is_ready(),
        is_logged_in: sessions.is_logged_in(),
        status: sessions.state().as_str(),
    })
}

#[derive(Deserialize)]
pub struct SendOtpRequest {
    pub mobile: String,
}

/// POST /api/send-otp — enter the mobile number and trigger the OTP.
///
/// Self-heals: a session that died since the last call is fully
/// re-initialized before the form is touched, and transient form failures
/// are retried a few times before giving up.
pub async fn send_otp(
    Extension(state): Extension<AppState>,
    Json(body): Json<SendOtpRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.mobile.trim().is_empty() {
        return Err(ApiError::Validation("mobile number required".to_string()));
    }

    let sessions = &state.deps.sessions;
    if !sessions.is_ready() {
        sessions.ensure_ready().await?;
        if !sessions.is_ready() {
            // Another caller's initialization is still in flight.
            return Err(ApiError::SessionUnavailable);
        }
    }

    let mut last_err = AutomationError::SiteUnavailable;
    for attempt in 1..=SEND_OTP_ATTEMPTS {
        let lease = sessions.lease().await?;
        match lease.session().request_otp(&body.mobile).await {
            Ok(()) => return Ok(Json(json!({ "success": true }))),
            Err(err) => {
                tracing::warn!(attempt, error = %err, "send-otp attempt failed");
                if err.is_session_lost() {
                    sessions.mark_lost();
                }
                last_err = err;
            }
        }
        drop(lease);
        if attempt < SEND_OTP_ATTEMPTS {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
    Err(ApiError::Automation(last_err))
}

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub otp: String,
}

/// POST /api/verify-otp — submit the OTP; success flips the logged-in
/// flag that gates crawling.
pub async fn verify_otp(
    Extension(state): Extension<AppState>,
    Json(body): Json<VerifyOtpRequest>,
) -> Result<Json<Value>, ApiError> {
    let sessions = &state.deps.sessions;
    let lease = sessions.lease().await?;
    lease.session().submit_otp(&body.otp).await?;
    sessions.set_logged_in(true);
    Ok(Json(json!({ "success": true })))
}

/// POST /api/resend-otp
pub async fn resend_otp(
    Extension(state): Extension<AppState>,
) -> Result<Json<Value>, ApiError> {
    let lease = state.deps.sessions.lease().await?;
    lease.session().resend_otp().await?;
    Ok(Json(json!({ "success": true })))
}

//! Search-space browsing and crawl job endpoints.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::Extension;
use axum::response::sse::{Event, Sse};
use axum::Json;
use chrono::{NaiveDate, Utc};
use futures::Stream;
use portal_automation::SelectOption;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::event_stream;
use crate::common::ApiError;
use crate::kernel::jobs::{CrawlJob, Orchestrator, ProgressPublisher, SearchParams};
use crate::server::app::AppState;

/// Events buffered between the orchestrator and a slow subscriber.
const EVENT_BUFFER: usize = 256;

/// The portal UI and API exchange dates as DD/MM/YYYY.
fn parse_portal_date(raw: &str, field: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y")
        .map_err(|_| ApiError::Validation(format!("{field} must be a DD/MM/YYYY date")))
}

/// GET /api/districts — district list straight from the live session.
pub async fn districts(
    Extension(state): Extension<AppState>,
) -> Result<Json<Vec<SelectOption>>, ApiError> {
    let sessions = &state.deps.sessions;
    if !sessions.is_ready() {
        return Err(ApiError::SessionUnavailable);
    }
    let lease = sessions.lease().await?;
    let districts = lease.session().list_districts().await?;
    Ok(Json(districts))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetStationsRequest {
    pub district_value: String,
}

/// POST /api/get-stations — select a district and list its stations.
pub async fn get_stations(
    Extension(state): Extension<AppState>,
    Json(body): Json<GetStationsRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.district_value.trim().is_empty() {
        return Err(ApiError::Validation("district id required".to_string()));
    }
    let sessions = &state.deps.sessions;
    if !sessions.is_ready() {
        return Err(ApiError::SessionUnavailable);
    }
    let lease = sessions.lease().await?;
    lease.session().select_district(&body.district_value).await?;
    let stations = lease.session().list_stations().await?;
    Ok(Json(json!({ "success": true, "stations": stations })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFirsRequest {
    pub districts: Vec<String>,
    pub from_date: String,
    pub to_date: String,
    #[serde(default)]
    pub request_name: Option<String>,
    #[serde(default)]
    pub selected_stations: Vec<String>,
}

/// POST /api/search-firs — validate, persist a new job, and stream its
/// progress events until a terminal event.
pub async fn search_firs(
    Extension(state): Extension<AppState>,
    Json(body): Json<SearchFirsRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if body.districts.is_empty() {
        return Err(ApiError::Validation("at least one district required".to_string()));
    }
    let from_date = parse_portal_date(&body.from_date, "fromDate")?;
    let to_date = parse_portal_date(&body.to_date, "toDate")?;
    if from_date > to_date {
        return Err(ApiError::Validation("fromDate is after toDate".to_string()));
    }
    if !state.deps.sessions.is_ready() {
        return Err(ApiError::SessionUnavailable);
    }

    let params = SearchParams {
        districts: body.districts,
        from_date,
        to_date,
        selected_stations: body.selected_stations,
    };
    let name = body
        .request_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("Search_{}", Utc::now().timestamp_millis()));

    let (publisher, rx) = ProgressPublisher::channel(EVENT_BUFFER);
    let orchestrator = Orchestrator::new(Arc::clone(&state.deps));
    tokio::spawn(async move {
        orchestrator.start(name, params, publisher).await;
    });

    Ok(event_stream(rx))
}

#[derive(Deserialize)]
pub struct JobIdRequest {
    pub id: Uuid,
}

/// POST /api/resume-request — flip a stopped job back to processing and
/// stream the resumed run.
pub async fn resume_request(
    Extension(state): Extension<AppState>,
    Json(body): Json<JobIdRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let job = state
        .deps
        .store
        .get_job(body.id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {}", body.id)))?;
    if !state.deps.sessions.is_ready() {
        return Err(ApiError::SessionUnavailable);
    }

    let (publisher, rx) = ProgressPublisher::channel(EVENT_BUFFER);
    let orchestrator = Orchestrator::new(Arc::clone(&state.deps));
    tokio::spawn(async move {
        orchestrator.resume(job.id, publisher).await;
    });

    Ok(event_stream(rx))
}

/// POST /api/stop-request — cooperative stop; the orchestrator observes
/// it at its next cancellation check.
pub async fn stop_request(
    Extension(state): Extension<AppState>,
    Json(body): Json<JobIdRequest>,
) -> Result<Json<Value>, ApiError> {
    let stopped = state.deps.store.stop_job(body.id).await?;
    if !stopped {
        tracing::debug!(job_id = %body.id, "stop request ignored, job not processing");
    }
    Ok(Json(json!({ "success": stopped })))
}

/// GET /api/requests — all jobs with their progress state.
pub async fn list_requests(
    Extension(state): Extension<AppState>,
) -> Result<Json<Vec<CrawlJob>>, ApiError> {
    let jobs = state.deps.store.list_jobs().await?;
    Ok(Json(jobs))
}

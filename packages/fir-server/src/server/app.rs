//! Application setup and router wiring.

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::CrawlDeps;
use crate::server::routes::{auth, files, search};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<CrawlDeps>,
}

/// Build the Axum application router over the crawl engine.
pub fn build_app(deps: Arc<CrawlDeps>) -> Router {
    let state = AppState { deps };

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        // Session readiness + login
        .route("/api/status", get(auth::status))
        .route("/api/send-otp", post(auth::send_otp))
        .route("/api/verify-otp", post(auth::verify_otp))
        .route("/api/resend-otp", post(auth::resend_otp))
        // Search space browsing
        .route("/api/districts", get(search::districts))
        .route("/api/get-stations", post(search::get_stations))
        // Crawl jobs
        .route("/api/search-firs", post(search::search_firs))
        .route("/api/resume-request", post(search::resume_request))
        .route("/api/stop-request", post(search::stop_request))
        .route("/api/requests", get(search::list_requests))
        // Artifacts
        .route("/api/download-fir", post(files::download_fir))
        .route("/api/files", get(files::list_files))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

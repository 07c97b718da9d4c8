//! HTTP bridge to the browser-driver sidecar.
//!
//! The sidecar owns the headless browser and all DOM specifics (selectors,
//! postback waits, the export-menu dance, dialog dismissal). This client
//! forwards each capability call as a JSON POST and maps transport
//! failures into the automation error taxonomy.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::error::AutomationError;
use crate::session::{PortalDriver, PortalSession};
use crate::types::{portal_date, DiscoveredFir, SelectOption};

/// Default budget for ordinary form interactions.
const OP_TIMEOUT: Duration = Duration::from_secs(60);
/// Navigations and search postbacks on the portal routinely crawl.
const NAV_TIMEOUT: Duration = Duration::from_secs(90);
/// Export popups can take the better part of two minutes to respond.
const EXPORT_TIMEOUT: Duration = Duration::from_secs(120);

/// Driver-side response envelope.
#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    data: Option<T>,
}

pub struct HttpDriver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDriver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PortalDriver for HttpDriver {
    async fn open_session(&self) -> Result<Arc<dyn PortalSession>, AutomationError> {
        #[derive(Deserialize)]
        struct Opened {
            #[serde(rename = "sessionId")]
            session_id: String,
        }

        let opened: Opened = post_op(
            &self.client,
            &format!("{}/session", self.base_url),
            "open_session",
            json!({}),
            NAV_TIMEOUT,
        )
        .await?;

        Ok(Arc::new(HttpSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            session_id: opened.session_id,
        }))
    }
}

pub struct HttpSession {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl HttpSession {
    fn op_url(&self, op: &str) -> String {
        format!("{}/session/{}/{}", self.base_url, self.session_id, op)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        op: &'static str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<T, AutomationError> {
        post_op(&self.client, &self.op_url(op), op, body, timeout).await
    }

    async fn call_unit(
        &self,
        op: &'static str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        let _: serde_json::Value = self.call(op, body, timeout).await?;
        Ok(())
    }
}

async fn post_op<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    op: &'static str,
    body: serde_json::Value,
    timeout: Duration,
) -> Result<T, AutomationError> {
    let response = client
        .post(url)
        .timeout(timeout)
        .json(&body)
        .send()
        .await
        .map_err(|e| classify_transport(op, e))?;

    if response.status() == reqwest::StatusCode::GONE
        || response.status() == reqwest::StatusCode::NOT_FOUND
    {
        return Err(AutomationError::SessionLost);
    }
    if response.status() == reqwest::StatusCode::BAD_GATEWAY
        || response.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE
    {
        return Err(AutomationError::SiteUnavailable);
    }

    let envelope: Envelope<T> = response
        .json()
        .await
        .map_err(|e| AutomationError::Driver(format!("{op}: malformed driver response: {e}")))?;

    if !envelope.success {
        let message = envelope.error.unwrap_or_else(|| "unknown driver failure".to_string());
        return Err(classify_failure(op, message));
    }

    envelope
        .data
        .ok_or_else(|| AutomationError::Driver(format!("{op}: driver response missing payload")))
}

fn classify_transport(op: &'static str, err: reqwest::Error) -> AutomationError {
    if err.is_timeout() {
        AutomationError::Timeout { op }
    } else if err.is_connect() {
        AutomationError::Driver(format!("{op}: driver unreachable: {err}"))
    } else {
        AutomationError::Driver(format!("{op}: {err}"))
    }
}

/// Map driver-reported failures onto the taxonomy by message shape; the
/// sidecar reports puppeteer-style errors as free text.
fn classify_failure(op: &'static str, message: String) -> AutomationError {
    let lower = message.to_lowercase();
    if lower.contains("detached") || lower.contains("destroyed") || lower.contains("closed") {
        AutomationError::SessionLost
    } else if lower.contains("timeout") || lower.contains("timed out") {
        AutomationError::Timeout { op }
    } else if lower.contains("not responding") || lower.contains("net::") {
        AutomationError::SiteUnavailable
    } else if lower.contains("not found") || lower.contains("selector") {
        AutomationError::ElementMissing(message)
    } else {
        AutomationError::Driver(format!("{op}: {message}"))
    }
}

#[async_trait]
impl PortalSession for HttpSession {
    async fn is_alive(&self) -> bool {
        self.client
            .get(format!("{}/session/{}", self.base_url, self.session_id))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn navigate_home(&self) -> Result<(), AutomationError> {
        self.call_unit("navigate-home", json!({}), NAV_TIMEOUT).await
    }

    async fn switch_language(&self) -> Result<(), AutomationError> {
        self.call_unit("switch-language", json!({}), OP_TIMEOUT).await
    }

    async fn open_fir_search(&self) -> Result<(), AutomationError> {
        self.call_unit("open-fir-search", json!({}), NAV_TIMEOUT).await
    }

    async fn request_otp(&self, mobile: &str) -> Result<(), AutomationError> {
        self.call_unit("request-otp", json!({ "mobile": mobile }), OP_TIMEOUT)
            .await
    }

    async fn submit_otp(&self, otp: &str) -> Result<(), AutomationError> {
        self.call_unit("submit-otp", json!({ "otp": otp }), OP_TIMEOUT).await
    }

    async fn resend_otp(&self) -> Result<(), AutomationError> {
        self.call_unit("resend-otp", json!({}), OP_TIMEOUT).await
    }

    async fn list_districts(&self) -> Result<Vec<SelectOption>, AutomationError> {
        #[derive(Deserialize)]
        struct Districts {
            districts: Vec<SelectOption>,
        }
        let d: Districts = self.call("districts", json!({}), OP_TIMEOUT).await?;
        Ok(d.districts)
    }

    async fn select_district(&self, district: &str) -> Result<(), AutomationError> {
        self.call_unit(
            "select-district",
            json!({ "district": district }),
            NAV_TIMEOUT,
        )
        .await
    }

    async fn list_stations(&self) -> Result<Vec<SelectOption>, AutomationError> {
        #[derive(Deserialize)]
        struct Stations {
            stations: Vec<SelectOption>,
        }
        let s: Stations = self.call("stations", json!({}), OP_TIMEOUT).await?;
        Ok(s.stations)
    }

    async fn select_station(&self, station: &str) -> Result<(), AutomationError> {
        self.call_unit("select-station", json!({ "station": station }), OP_TIMEOUT)
            .await
    }

    async fn set_search_date(&self, date: NaiveDate) -> Result<(), AutomationError> {
        self.call_unit("set-date", json!({ "date": portal_date(date) }), OP_TIMEOUT)
            .await
    }

    async fn run_search(&self) -> Result<bool, AutomationError> {
        #[derive(Deserialize)]
        struct Searched {
            #[serde(rename = "hasResults")]
            has_results: bool,
        }
        let s: Searched = self.call("search", json!({}), NAV_TIMEOUT).await?;
        Ok(s.has_results)
    }

    async fn extract_firs(&self) -> Result<Vec<DiscoveredFir>, AutomationError> {
        #[derive(Deserialize)]
        struct Extracted {
            firs: Vec<DiscoveredFir>,
        }
        let e: Extracted = self.call("extract-firs", json!({}), OP_TIMEOUT).await?;
        Ok(e.firs)
    }

    async fn trigger_fir_download(
        &self,
        token: &str,
        dir: &Path,
    ) -> Result<(), AutomationError> {
        self.call_unit(
            "download-fir",
            json!({ "token": token, "dir": dir.to_string_lossy() }),
            EXPORT_TIMEOUT,
        )
        .await
    }
}

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::AutomationError;
use crate::types::{DiscoveredFir, SelectOption};

/// Factory for portal sessions.
///
/// Opening a session launches (or attaches to) a browser context on the
/// driver side with a clean cookie jar. The crawl engine keeps exactly one
/// session alive at a time; this trait exists so tests can substitute a
/// scripted portal.
#[async_trait]
pub trait PortalDriver: Send + Sync {
    async fn open_session(&self) -> Result<std::sync::Arc<dyn PortalSession>, AutomationError>;
}

/// One live authenticated browser context against the portal.
///
/// Operations are stateless per call but the underlying page is shared,
/// stateful navigation — callers must never run two of these concurrently
/// against the same session. Each call may take seconds to minutes and may
/// fail transiently.
#[async_trait]
pub trait PortalSession: Send + Sync {
    /// Cheap liveness probe for the underlying browser context.
    async fn is_alive(&self) -> bool;

    // --- bootstrap steps, run once per session by the session manager ---

    /// Load the portal homepage.
    async fn navigate_home(&self) -> Result<(), AutomationError>;

    /// Flip the portal UI to English. The portal works either way, so
    /// failures here are tolerable.
    async fn switch_language(&self) -> Result<(), AutomationError>;

    /// Walk the FIR-view modal flow until the search page is reachable.
    async fn open_fir_search(&self) -> Result<(), AutomationError>;

    // --- login ---

    /// Enter the mobile number and request an OTP.
    async fn request_otp(&self, mobile: &str) -> Result<(), AutomationError>;

    /// Submit the received OTP and wait for the search page to load.
    async fn submit_otp(&self, otp: &str) -> Result<(), AutomationError>;

    async fn resend_otp(&self) -> Result<(), AutomationError>;

    // --- search space ---

    /// Districts available in the search form.
    async fn list_districts(&self) -> Result<Vec<SelectOption>, AutomationError>;

    /// Select a district and wait for its station list to repopulate.
    /// Selecting the already-selected district is a no-op on the driver
    /// side, so repeated calls within a district pass are cheap.
    async fn select_district(&self, district: &str) -> Result<(), AutomationError>;

    /// Stations of the currently selected district, in portal order.
    /// Placeholder entries are filtered out on the driver side.
    async fn list_stations(&self) -> Result<Vec<SelectOption>, AutomationError>;

    async fn select_station(&self, station: &str) -> Result<(), AutomationError>;

    async fn set_search_date(&self, date: NaiveDate) -> Result<(), AutomationError>;

    /// Trigger the search postback. Returns `false` when the portal came
    /// back with no results grid (no records, or the click did not take) —
    /// that is an empty unit, not an error.
    async fn run_search(&self) -> Result<bool, AutomationError>;

    /// Extract FIR rows from the results grid.
    async fn extract_firs(&self) -> Result<Vec<DiscoveredFir>, AutomationError>;

    // --- artifact ---

    /// Kick off the PDF export for a record into `dir`. The export runs in
    /// a popup on the driver side; the file materializes in `dir` some time
    /// after this returns. The caller owns waiting and timeout.
    async fn trigger_fir_download(&self, token: &str, dir: &Path)
        -> Result<(), AutomationError>;
}

//! Progress events pushed to the caller during a crawl run.
//!
//! Events are framed as `event: <name>\ndata: <json>\n\n` on the wire.
//! `paused`, `complete` and `error` are terminal: nothing may be emitted
//! on a channel after one of them.

use portal_automation::DiscoveredFir;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Severity tag on `log` events, mirrored by the caller's UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Warning,
    Error,
}

/// Payload of a `fir_found` event: the extracted record plus where it was
/// found.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirFound {
    #[serde(flatten)]
    pub fir: DiscoveredFir,
    pub district_id: String,
    pub station_name: String,
}

/// Download lifecycle reported on `fir_status` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirStatusUpdate {
    pub fir_no: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
}

impl FirStatusUpdate {
    pub fn new(fir_no: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            fir_no: fir_no.into(),
            status: status.into(),
            path: None,
            error: None,
            downloaded: None,
            total: None,
        }
    }
}

/// One event on a job invocation's progress channel.
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    Log { msg: String, kind: LogKind },
    FirFound(FirFound),
    FirStatus(FirStatusUpdate),
    Paused { job_id: Uuid },
    Complete { total: i64, downloaded: i64 },
    Error { msg: String },
}

impl CrawlEvent {
    /// Wire-level event name.
    pub fn name(&self) -> &'static str {
        match self {
            CrawlEvent::Log { .. } => "log",
            CrawlEvent::FirFound(_) => "fir_found",
            CrawlEvent::FirStatus(_) => "fir_status",
            CrawlEvent::Paused { .. } => "paused",
            CrawlEvent::Complete { .. } => "complete",
            CrawlEvent::Error { .. } => "error",
        }
    }

    /// Terminal events close the channel for the invocation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CrawlEvent::Paused { .. } | CrawlEvent::Complete { .. } | CrawlEvent::Error { .. }
        )
    }

    /// Wire-level payload, always a single JSON object.
    pub fn data(&self) -> serde_json::Value {
        match self {
            CrawlEvent::Log { msg, kind } => json!({ "msg": msg, "type": kind }),
            CrawlEvent::FirFound(found) => {
                serde_json::to_value(found).unwrap_or_else(|_| json!({}))
            }
            CrawlEvent::FirStatus(update) => {
                serde_json::to_value(update).unwrap_or_else(|_| json!({}))
            }
            CrawlEvent::Paused { job_id } => json!({ "jobId": job_id }),
            CrawlEvent::Complete { total, downloaded } => {
                json!({ "total": total, "downloaded": downloaded })
            }
            CrawlEvent::Error { msg } => json!({ "msg": msg }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_the_wire_vocabulary() {
        let found = CrawlEvent::FirFound(FirFound {
            fir: DiscoveredFir {
                fir_no: "1/2024".into(),
                fir_date: "01/01/2024".into(),
                brief: String::new(),
                fir_status: String::new(),
                print_token: None,
            },
            district_id: "D1".into(),
            station_name: "Kotwali".into(),
        });
        assert_eq!(found.name(), "fir_found");
        assert_eq!(
            CrawlEvent::Log { msg: "x".into(), kind: LogKind::Info }.name(),
            "log"
        );
        assert_eq!(
            CrawlEvent::FirStatus(FirStatusUpdate::new("1/2024", "downloading")).name(),
            "fir_status"
        );
        assert_eq!(CrawlEvent::Paused { job_id: Uuid::new_v4() }.name(), "paused");
        assert_eq!(CrawlEvent::Complete { total: 0, downloaded: 0 }.name(), "complete");
        assert_eq!(CrawlEvent::Error { msg: "boom".into() }.name(), "error");
    }

    #[test]
    fn only_paused_complete_error_are_terminal() {
        assert!(CrawlEvent::Paused { job_id: Uuid::new_v4() }.is_terminal());
        assert!(CrawlEvent::Complete { total: 1, downloaded: 1 }.is_terminal());
        assert!(CrawlEvent::Error { msg: "x".into() }.is_terminal());
        assert!(!CrawlEvent::Log { msg: "x".into(), kind: LogKind::Info }.is_terminal());
        assert!(!CrawlEvent::FirStatus(FirStatusUpdate::new("1", "pending")).is_terminal());
    }

    #[test]
    fn fir_found_payload_flattens_record_fields() {
        let event = CrawlEvent::FirFound(FirFound {
            fir: DiscoveredFir {
                fir_no: "0042/2024".into(),
                fir_date: "05/02/2024".into(),
                brief: "brief".into(),
                fir_status: "Closed".into(),
                print_token: Some("tok".into()),
            },
            district_id: "D7".into(),
            station_name: "City Kotwali".into(),
        });
        let data = event.data();
        assert_eq!(data["firNo"], "0042/2024");
        assert_eq!(data["printToken"], "tok");
        assert_eq!(data["districtId"], "D7");
        assert_eq!(data["stationName"], "City Kotwali");
    }

    #[test]
    fn fir_status_payload_omits_absent_fields() {
        let mut update = FirStatusUpdate::new("1/2024", "downloaded");
        update.path = Some("/tmp/1_2024.pdf".into());
        update.downloaded = Some(3);
        update.total = Some(5);
        let data = CrawlEvent::FirStatus(update).data();
        assert_eq!(data["status"], "downloaded");
        assert_eq!(data["downloaded"], 3);
        assert!(data.get("error").is_none());
    }

    #[test]
    fn log_payload_uses_type_field() {
        let data = CrawlEvent::Log { msg: "hi".into(), kind: LogKind::Warning }.data();
        assert_eq!(data["type"], "warning");
        assert_eq!(data["msg"], "hi");
    }
}

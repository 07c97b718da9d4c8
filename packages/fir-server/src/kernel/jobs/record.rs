use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Artifact download lifecycle of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Downloaded,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Downloaded => "downloaded",
            DownloadStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DownloadStatus::Pending),
            "downloading" => Some(DownloadStatus::Downloading),
            "downloaded" => Some(DownloadStatus::Downloaded),
            "failed" => Some(DownloadStatus::Failed),
            _ => None,
        }
    }
}

/// One discovered FIR, owned by a job.
///
/// Natural key is (job_id, fir_no); a record is persisted once per key and
/// rediscovery on resume reuses the existing row instead of creating a
/// duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirRecord {
    pub id: i64,
    pub job_id: Uuid,
    pub fir_no: String,
    pub fir_date: String,
    pub district_id: String,
    pub station_label: String,
    pub brief: String,
    pub fir_status: String,
    pub download_status: DownloadStatus,
    pub pdf_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a newly discovered record.
#[derive(Debug, Clone)]
pub struct NewFirRecord {
    pub job_id: Uuid,
    pub fir_no: String,
    pub fir_date: String,
    pub district_id: String,
    pub station_label: String,
    pub brief: String,
    pub fir_status: String,
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable search parameters of a crawl job.
///
/// Persisted verbatim at job creation and reused on resume, so a pause
/// and a resume always walk the same search space in the same order. The
/// checkpoint skip rule compares positions within these lists, which is
/// why they must never be re-supplied by the caller on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub districts: Vec<String>,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    /// Station filter; empty means every station of every district.
    #[serde(default)]
    pub selected_stations: Vec<String>,
}

/// Job lifecycle status.
///
/// There is deliberately no failed state: an unrecoverable run leaves the
/// job `processing` so a later resume can retry from the last checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Stopped,
    Completed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Stopped => "stopped",
            JobStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(JobStatus::Processing),
            "stopped" => Some(JobStatus::Stopped),
            "completed" => Some(JobStatus::Completed),
            _ => None,
        }
    }
}

/// The last fully completed work unit of a job.
///
/// Written only after every record of the unit has been processed, never
/// mid-unit, and never moving backwards in the unit ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub date: NaiveDate,
    pub district_id: String,
    pub station_id: String,
}

impl Checkpoint {
    /// Whether a whole district pass lies strictly before this checkpoint
    /// and can be skipped without touching the portal.
    ///
    /// District position is resolved against the current run's district
    /// list; a checkpoint district that is no longer in the list disables
    /// skipping (dedupe still protects the counts).
    pub fn skips_district(&self, date: NaiveDate, district_idx: usize, districts: &[String]) -> bool {
        match districts.iter().position(|d| *d == self.district_id) {
            Some(cp_idx) => (date, district_idx) < (self.date, cp_idx),
            None => false,
        }
    }

    /// Whether a station within the checkpointed district pass is already
    /// covered by this checkpoint (the checkpoint unit itself included —
    /// a checkpoint means that unit finished).
    pub fn skips_station(
        &self,
        date: NaiveDate,
        district_id: &str,
        station_idx: usize,
        station_ids: &[String],
    ) -> bool {
        if date != self.date || district_id != self.district_id {
            return false;
        }
        match station_ids.iter().position(|s| *s == self.station_id) {
            Some(cp_idx) => station_idx <= cp_idx,
            None => false,
        }
    }
}

/// A requested crawl over a date range, district set and optional station
/// filter, together with its durable progress state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlJob {
    pub id: Uuid,
    pub name: String,
    pub params: SearchParams,
    pub status: JobStatus,
    pub total_firs: i64,
    pub downloaded_firs: i64,
    pub checkpoint: Option<Checkpoint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CrawlJob {
    pub fn new(name: String, params: SearchParams) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            params,
            status: JobStatus::Processing,
            total_firs: 0,
            downloaded_firs: 0,
            checkpoint: None,
            created_at: now,
            updated_at: now,
        }
    }
}

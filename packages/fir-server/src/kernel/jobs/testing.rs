//! Test doubles for the crawl engine: an in-memory store and a scripted
//! portal session/driver pair.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use portal_automation::{
    AutomationError, DiscoveredFir, PortalDriver, PortalSession, SelectOption,
};
use uuid::Uuid;

use super::job::{Checkpoint, CrawlJob, JobStatus};
use super::record::{DownloadStatus, FirRecord, NewFirRecord};
use super::store::CrawlStore;

/// What the scripted session does when asked to export a PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    /// Drop a complete PDF into the target directory.
    WriteFile,
    /// Drop only an in-progress browser temp file.
    WritePartial,
    /// Do nothing; the caller's wait will time out.
    Nothing,
    /// Fail the trigger call itself.
    Error,
}

/// In-memory `CrawlStore` with hooks for simulating out-of-band stop
/// commands and inspecting checkpoint history.
pub struct MemoryCrawlStore {
    jobs: Mutex<HashMap<Uuid, CrawlJob>>,
    records: Mutex<BTreeMap<(Uuid, String), FirRecord>>,
    next_record_id: AtomicI64,
    checkpoint_log: Mutex<Vec<Checkpoint>>,
    /// When > 0: flip the job to `stopped` once this many records have
    /// been inserted.
    stop_after_inserts: AtomicUsize,
    inserts: AtomicUsize,
    /// When > 0: flip the job to `stopped` once this many records have
    /// reached `downloaded`.
    stop_after_downloads: AtomicUsize,
    downloads: AtomicUsize,
}

impl MemoryCrawlStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            records: Mutex::new(BTreeMap::new()),
            next_record_id: AtomicI64::new(1),
            checkpoint_log: Mutex::new(Vec::new()),
            stop_after_inserts: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            stop_after_downloads: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn seed_job(&self, job: CrawlJob) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }

    pub fn force_status(&self, id: Uuid, status: JobStatus) {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.status = status;
        }
    }

    pub fn stop_after_inserts(&self, count: usize) {
        self.stop_after_inserts.store(count, Ordering::SeqCst);
    }

    pub fn stop_after_downloads(&self, count: usize) {
        self.stop_after_downloads.store(count, Ordering::SeqCst);
    }

    pub fn job(&self, id: Uuid) -> Option<CrawlJob> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    pub fn records_for(&self, id: Uuid) -> Vec<FirRecord> {
        self.records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.job_id == id)
            .cloned()
            .collect()
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.checkpoint_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrawlStore for MemoryCrawlStore {
    async fn create_job(&self, job: &CrawlJob) -> Result<()> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<CrawlJob>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn list_jobs(&self) -> Result<Vec<CrawlJob>> {
        let mut jobs: Vec<_> = self.jobs.lock().unwrap().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn set_status(&self, id: Uuid, status: JobStatus) -> Result<()> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.status = status;
        }
        Ok(())
    }

    async fn stop_job(&self, id: Uuid) -> Result<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Processing => {
                job.status = JobStatus::Stopped;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fetch_status(&self, id: Uuid) -> Result<Option<JobStatus>> {
        Ok(self.jobs.lock().unwrap().get(&id).map(|j| j.status))
    }

    async fn update_progress(&self, id: Uuid, total: i64, downloaded: i64) -> Result<()> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.total_firs = total;
            job.downloaded_firs = downloaded;
        }
        Ok(())
    }

    async fn save_checkpoint(
        &self,
        id: Uuid,
        checkpoint: &Checkpoint,
        total: i64,
        downloaded: i64,
    ) -> Result<()> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.checkpoint = Some(checkpoint.clone());
            job.total_firs = total;
            job.downloaded_firs = downloaded;
        }
        self.checkpoint_log.lock().unwrap().push(checkpoint.clone());
        Ok(())
    }

    async fn complete_job(&self, id: Uuid, total: i64, downloaded: i64) -> Result<()> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.status = JobStatus::Completed;
            job.total_firs = total;
            job.downloaded_firs = downloaded;
        }
        Ok(())
    }

    async fn find_record(&self, job_id: Uuid, fir_no: &str) -> Result<Option<FirRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(job_id, fir_no.to_string()))
            .cloned())
    }

    async fn insert_record(&self, record: &NewFirRecord) -> Result<FirRecord> {
        let stored = FirRecord {
            id: self.next_record_id.fetch_add(1, Ordering::SeqCst),
            job_id: record.job_id,
            fir_no: record.fir_no.clone(),
            fir_date: record.fir_date.clone(),
            district_id: record.district_id.clone(),
            station_label: record.station_label.clone(),
            brief: record.brief.clone(),
            fir_status: record.fir_status.clone(),
            download_status: DownloadStatus::Pending,
            pdf_path: None,
            created_at: Utc::now(),
        };
        self.records
            .lock()
            .unwrap()
            .insert((record.job_id, record.fir_no.clone()), stored.clone());

        let inserted = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        let threshold = self.stop_after_inserts.load(Ordering::SeqCst);
        if threshold > 0 && inserted >= threshold {
            self.force_status(record.job_id, JobStatus::Stopped);
        }
        Ok(stored)
    }

    async fn update_record_download(
        &self,
        job_id: Uuid,
        fir_no: &str,
        status: DownloadStatus,
        pdf_path: Option<&str>,
    ) -> Result<()> {
        if let Some(record) = self
            .records
            .lock()
            .unwrap()
            .get_mut(&(job_id, fir_no.to_string()))
        {
            record.download_status = status;
            if let Some(path) = pdf_path {
                record.pdf_path = Some(path.to_string());
            }
        }
        if status == DownloadStatus::Downloaded {
            let downloaded = self.downloads.fetch_add(1, Ordering::SeqCst) + 1;
            let threshold = self.stop_after_downloads.load(Ordering::SeqCst);
            if threshold > 0 && downloaded >= threshold {
                self.force_status(job_id, JobStatus::Stopped);
            }
        }
        Ok(())
    }

    async fn reset_processing_jobs(&self) -> Result<u64> {
        let mut count = 0;
        for job in self.jobs.lock().unwrap().values_mut() {
            if job.status == JobStatus::Processing {
                job.status = JobStatus::Stopped;
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Scripted portal session: districts, stations per district, and FIR
/// results per (district, station, date) unit.
pub struct MockPortalSession {
    alive: AtomicBool,
    districts: Mutex<Vec<SelectOption>>,
    stations: Mutex<HashMap<String, Vec<SelectOption>>>,
    results: Mutex<HashMap<(String, String, String), Vec<DiscoveredFir>>>,
    selected_district: Mutex<Option<String>>,
    selected_station: Mutex<Option<String>>,
    search_date: Mutex<Option<NaiveDate>>,
    default_download: Mutex<DownloadMode>,
    token_downloads: Mutex<HashMap<String, DownloadMode>>,
    select_district_failures: AtomicU32,
}

fn unit_key(district: &str, station: &str, date: NaiveDate) -> (String, String, String) {
    (district.to_string(), station.to_string(), date.to_string())
}

pub fn option(label: &str, value: &str) -> SelectOption {
    SelectOption {
        label: label.to_string(),
        value: value.to_string(),
    }
}

pub fn fir(fir_no: &str, token: Option<&str>) -> DiscoveredFir {
    DiscoveredFir {
        fir_no: fir_no.to_string(),
        fir_date: "01/03/2024".to_string(),
        brief: format!("brief for {fir_no}"),
        fir_status: "Registered".to_string(),
        print_token: token.map(str::to_string),
    }
}

impl MockPortalSession {
    pub fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            districts: Mutex::new(Vec::new()),
            stations: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
            selected_district: Mutex::new(None),
            selected_station: Mutex::new(None),
            search_date: Mutex::new(None),
            default_download: Mutex::new(DownloadMode::WriteFile),
            token_downloads: Mutex::new(HashMap::new()),
            select_district_failures: AtomicU32::new(0),
        }
    }

    pub fn with_download_mode(self, mode: DownloadMode) -> Self {
        *self.default_download.lock().unwrap() = mode;
        self
    }

    pub fn with_district(self, district: SelectOption, stations: Vec<SelectOption>) -> Self {
        self.stations
            .lock()
            .unwrap()
            .insert(district.value.clone(), stations);
        self.districts.lock().unwrap().push(district);
        self
    }

    pub fn with_results(
        self,
        district: &str,
        station: &str,
        date: NaiveDate,
        firs: Vec<DiscoveredFir>,
    ) -> Self {
        self.results
            .lock()
            .unwrap()
            .insert(unit_key(district, station, date), firs);
        self
    }

    pub fn with_token_mode(self, token: &str, mode: DownloadMode) -> Self {
        self.token_downloads
            .lock()
            .unwrap()
            .insert(token.to_string(), mode);
        self
    }

    /// Make the next `count` district selections fail with a timeout.
    pub fn fail_district_selections(&self, count: u32) {
        self.select_district_failures.store(count, Ordering::SeqCst);
    }

    fn current_unit(&self) -> Option<(String, String, NaiveDate)> {
        let district = self.selected_district.lock().unwrap().clone()?;
        let station = self.selected_station.lock().unwrap().clone()?;
        let date = (*self.search_date.lock().unwrap())?;
        Some((district, station, date))
    }

    fn current_results(&self) -> Vec<DiscoveredFir> {
        match self.current_unit() {
            Some((district, station, date)) => self
                .results
                .lock()
                .unwrap()
                .get(&unit_key(&district, &station, date))
                .cloned()
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }
}

impl Default for MockPortalSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PortalSession for MockPortalSession {
    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn navigate_home(&self) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn switch_language(&self) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn open_fir_search(&self) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn request_otp(&self, _mobile: &str) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn submit_otp(&self, _otp: &str) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn resend_otp(&self) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn list_districts(&self) -> Result<Vec<SelectOption>, AutomationError> {
        Ok(self.districts.lock().unwrap().clone())
    }

    async fn select_district(&self, district: &str) -> Result<(), AutomationError> {
        if self.select_district_failures.load(Ordering::SeqCst) > 0 {
            self.select_district_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(AutomationError::Timeout {
                op: "select-district",
            });
        }
        *self.selected_district.lock().unwrap() = Some(district.to_string());
        *self.selected_station.lock().unwrap() = None;
        Ok(())
    }

    async fn list_stations(&self) -> Result<Vec<SelectOption>, AutomationError> {
        let selected = self.selected_district.lock().unwrap().clone();
        match selected {
            Some(district) => Ok(self
                .stations
                .lock()
                .unwrap()
                .get(&district)
                .cloned()
                .unwrap_or_default()),
            None => Err(AutomationError::ElementMissing(
                "no district selected".to_string(),
            )),
        }
    }

    async fn select_station(&self, station: &str) -> Result<(), AutomationError> {
        *self.selected_station.lock().unwrap() = Some(station.to_string());
        Ok(())
    }

    async fn set_search_date(&self, date: NaiveDate) -> Result<(), AutomationError> {
        *self.search_date.lock().unwrap() = Some(date);
        Ok(())
    }

    async fn run_search(&self) -> Result<bool, AutomationError> {
        Ok(!self.current_results().is_empty())
    }

    async fn extract_firs(&self) -> Result<Vec<DiscoveredFir>, AutomationError> {
        Ok(self.current_results())
    }

    async fn trigger_fir_download(
        &self,
        token: &str,
        dir: &Path,
    ) -> Result<(), AutomationError> {
        let mode = self
            .token_downloads
            .lock()
            .unwrap()
            .get(token)
            .copied()
            .unwrap_or(*self.default_download.lock().unwrap());
        match mode {
            DownloadMode::WriteFile => {
                tokio::fs::write(dir.join("export.pdf"), b"%PDF-1.4 test artifact")
                    .await
                    .map_err(|e| AutomationError::Driver(e.to_string()))?;
                Ok(())
            }
            DownloadMode::WritePartial => {
                tokio::fs::write(dir.join("export.pdf.crdownload"), b"partial")
                    .await
                    .map_err(|e| AutomationError::Driver(e.to_string()))?;
                Ok(())
            }
            DownloadMode::Nothing => Ok(()),
            DownloadMode::Error => Err(AutomationError::Driver("export click failed".to_string())),
        }
    }
}

/// Driver handing out one shared scripted session.
pub struct MockPortalDriver {
    session: Arc<MockPortalSession>,
}

impl MockPortalDriver {
    pub fn new(session: Arc<MockPortalSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl PortalDriver for MockPortalDriver {
    async fn open_session(&self) -> Result<Arc<dyn PortalSession>, AutomationError> {
        Ok(self.session.clone())
    }
}

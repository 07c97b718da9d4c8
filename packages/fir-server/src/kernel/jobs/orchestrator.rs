//! The job orchestrator: walks the (date x district x station) search
//! space in a fixed order, drives each unit through the portal session,
//! and persists enough progress to resume an interrupted job without
//! re-counting or re-downloading anything.
//!
//! Failure policy: a dead unit-level call (district selection, search,
//! extraction) aborts the run with an `error` event and leaves the job
//! `processing` so a later resume retries from the last checkpoint. A
//! single record's failed download is recorded on that record only. A
//! stop command is a cooperative signal observed between units, between
//! records, and at intervals inside an artifact wait — never a thrown
//! error.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use portal_automation::{portal_date, DiscoveredFir, PortalSession, SelectOption};
use uuid::Uuid;

use super::events::{CrawlEvent, FirFound, FirStatusUpdate, LogKind};
use super::job::{Checkpoint, CrawlJob, JobStatus, SearchParams};
use super::publisher::ProgressPublisher;
use super::record::{DownloadStatus, NewFirRecord};
use crate::kernel::artifact::{ArtifactDest, FetchOutcome, StopGate};
use crate::kernel::deps::CrawlDeps;

/// Cooperative-cancellation outcome threaded through the unit loops
/// instead of unwinding through error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Cumulative counts carried in memory across the run; persisted
/// best-effort as they change and authoritatively at each checkpoint.
struct RunState {
    total: i64,
    downloaded: i64,
}

pub struct Orchestrator {
    deps: Arc<CrawlDeps>,
}

impl Orchestrator {
    pub fn new(deps: Arc<CrawlDeps>) -> Self {
        Self { deps }
    }

    /// Create and persist a fresh job, then run it. The job row exists
    /// before the first automation call so a crash mid-run still leaves a
    /// discoverable, resumable job behind.
    pub async fn start(
        &self,
        name: String,
        params: SearchParams,
        publisher: ProgressPublisher,
    ) -> Uuid {
        let job = CrawlJob::new(name, params);
        let job_id = job.id;
        if let Err(err) = self.deps.store.create_job(&job).await {
            publisher
                .log(LogKind::Error, format!("DB error: {err:#}"))
                .await;
            publisher
                .send(CrawlEvent::Error {
                    msg: format!("could not create job: {err:#}"),
                })
                .await;
            return job_id;
        }
        publisher
            .log(LogKind::Success, format!("Started request {job_id}"))
            .await;
        self.run(job, &publisher).await;
        job_id
    }

    /// Re-run a stopped job under its original id and persisted search
    /// parameters. Position is reconstructed from the checkpoint; already
    /// known records are deduplicated by natural key.
    pub async fn resume(&self, job_id: Uuid, publisher: ProgressPublisher) {
        let job = match self.deps.store.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                publisher
                    .send(CrawlEvent::Error {
                        msg: format!("job {job_id} not found"),
                    })
                    .await;
                return;
            }
            Err(err) => {
                publisher
                    .send(CrawlEvent::Error {
                        msg: format!("could not load job {job_id}: {err:#}"),
                    })
                    .await;
                return;
            }
        };

        if let Err(err) = self
            .deps
            .store
            .set_status(job_id, JobStatus::Processing)
            .await
        {
            publisher
                .send(CrawlEvent::Error {
                    msg: format!("could not mark job processing: {err:#}"),
                })
                .await;
            return;
        }
        publisher
            .log(LogKind::Info, format!("Resuming request {job_id}"))
            .await;
        self.run(job, &publisher).await;
    }

    async fn run(&self, job: CrawlJob, publisher: &ProgressPublisher) {
        let mut state = RunState {
            total: job.total_firs,
            downloaded: job.downloaded_firs,
        };

        match self.crawl(&job, &mut state, publisher).await {
            Ok(Flow::Continue) => {
                if let Err(err) = self
                    .deps
                    .store
                    .complete_job(job.id, state.total, state.downloaded)
                    .await
                {
                    publisher
                        .log(LogKind::Error, format!("Failed to persist completion: {err:#}"))
                        .await;
                }
                publisher
                    .log(
                        LogKind::Success,
                        format!(
                            "Search completed. Total FIRs: {}, downloaded: {}",
                            state.total, state.downloaded
                        ),
                    )
                    .await;
                publisher
                    .send(CrawlEvent::Complete {
                        total: state.total,
                        downloaded: state.downloaded,
                    })
                    .await;
            }
            Ok(Flow::Stop) => {
                publisher.send(CrawlEvent::Paused { job_id: job.id }).await;
            }
            Err(err) => {
                tracing::error!(job_id = %job.id, error = %format!("{err:#}"), "crawl run aborted");
                publisher
                    .send(CrawlEvent::Error {
                        msg: format!("{err:#}"),
                    })
                    .await;
            }
        }
    }

    async fn crawl(
        &self,
        job: &CrawlJob,
        state: &mut RunState,
        publisher: &ProgressPublisher,
    ) -> Result<Flow> {
        let params = &job.params;
        let station_filter: HashSet<&str> = params
            .selected_stations
            .iter()
            .map(String::as_str)
            .collect();
        let checkpoint = job.checkpoint.as_ref();

        let mut date = params.from_date;
        while date <= params.to_date {
            if let Some(cp) = checkpoint {
                if date < cp.date {
                    publisher
                        .log(LogKind::Info, format!("Jumping past date {}", portal_date(date)))
                        .await;
                    date = next_day(date)?;
                    continue;
                }
            }

            publisher
                .log(
                    LogKind::Info,
                    format!("--- Processing date: {} ---", portal_date(date)),
                )
                .await;

            for (district_idx, district_id) in params.districts.iter().enumerate() {
                if let Some(cp) = checkpoint {
                    if cp.skips_district(date, district_idx, &params.districts) {
                        continue;
                    }
                }
                let flow = self
                    .crawl_district(job, date, district_id, checkpoint, &station_filter, state, publisher)
                    .await?;
                if flow == Flow::Stop {
                    return Ok(Flow::Stop);
                }
            }

            date = next_day(date)?;
        }
        Ok(Flow::Continue)
    }

    /// One district pass for one date: select it, walk its stations. The
    /// session lease is held for the whole pass — the station iteration
    /// depends on the district staying selected on the shared page.
    #[allow(clippy::too_many_arguments)]
    async fn crawl_district(
        &self,
        job: &CrawlJob,
        date: NaiveDate,
        district_id: &str,
        checkpoint: Option<&Checkpoint>,
        station_filter: &HashSet<&str>,
        state: &mut RunState,
        publisher: &ProgressPublisher,
    ) -> Result<Flow> {
        publisher
            .log(LogKind::Info, format!("Selecting district {district_id}..."))
            .await;

        let lease = self
            .deps
            .sessions
            .lease()
            .await
            .context("Portal session unavailable")?;
        let session = lease.session();

        session
            .select_district(district_id)
            .await
            .with_context(|| format!("Failed to select district {district_id}"))?;
        let stations = session
            .list_stations()
            .await
            .with_context(|| format!("Failed to list stations of district {district_id}"))?;
        let station_ids: Vec<String> = stations.iter().map(|s| s.value.clone()).collect();

        for (station_idx, station) in stations.iter().enumerate() {
            if !station_filter.is_empty() && !station_filter.contains(station.value.as_str()) {
                continue;
            }
            if let Some(cp) = checkpoint {
                if cp.skips_station(date, district_id, station_idx, &station_ids) {
                    continue;
                }
            }

            if self.is_stopped(job.id).await? {
                publisher
                    .log(LogKind::Warning, format!("Request {} stopped by user.", job.id))
                    .await;
                return Ok(Flow::Stop);
            }

            let flow = self
                .crawl_station(job, date, district_id, station, session, state, publisher)
                .await?;
            if flow == Flow::Stop {
                return Ok(Flow::Stop);
            }

            // The unit is fully processed; this is the only place the
            // checkpoint moves, and it never moves backwards.
            let unit = Checkpoint {
                date,
                district_id: district_id.to_string(),
                station_id: station.value.clone(),
            };
            if let Err(err) = self
                .deps
                .store
                .save_checkpoint(job.id, &unit, state.total, state.downloaded)
                .await
            {
                publisher
                    .log(LogKind::Error, format!("Failed to persist checkpoint: {err:#}"))
                    .await;
            }
        }
        Ok(Flow::Continue)
    }

    #[allow(clippy::too_many_arguments)]
    async fn crawl_station(
        &self,
        job: &CrawlJob,
        date: NaiveDate,
        district_id: &str,
        station: &SelectOption,
        session: &Arc<dyn PortalSession>,
        state: &mut RunState,
        publisher: &ProgressPublisher,
    ) -> Result<Flow> {
        publisher
            .log(LogKind::Info, format!("Scraping station: {}...", station.label))
            .await;

        session
            .select_station(&station.value)
            .await
            .with_context(|| format!("Failed to select station {}", station.label))?;
        session
            .set_search_date(date)
            .await
            .context("Failed to set search date")?;

        if !session.run_search().await.context("Search failed")? {
            publisher
                .log(
                    LogKind::Info,
                    format!("No results or search failed for {}", station.label),
                )
                .await;
            return Ok(Flow::Continue);
        }

        let firs = session
            .extract_firs()
            .await
            .context("Failed to extract search results")?;
        publisher
            .log(
                LogKind::Info,
                format!("Found {} FIRs at {}.", firs.len(), station.label),
            )
            .await;

        for fir in &firs {
            if self.is_stopped(job.id).await? {
                publisher
                    .log(
                        LogKind::Warning,
                        format!("Request {} stopped by user (during record loop).", job.id),
                    )
                    .await;
                return Ok(Flow::Stop);
            }
            let flow = self
                .process_record(job, district_id, station, fir, session, state, publisher)
                .await?;
            if flow == Flow::Stop {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    /// Handle one discovered record: dedupe by natural key, persist it,
    /// and fetch its artifact if it has one and isn't already downloaded.
    #[allow(clippy::too_many_arguments)]
    async fn process_record(
        &self,
        job: &CrawlJob,
        district_id: &str,
        station: &SelectOption,
        fir: &DiscoveredFir,
        session: &Arc<dyn PortalSession>,
        state: &mut RunState,
        publisher: &ProgressPublisher,
    ) -> Result<Flow> {
        let existing = self
            .deps
            .store
            .find_record(job.id, &fir.fir_no)
            .await
            .context("Failed to look up record")?;

        // New iff the natural key is unseen, regardless of checkpoint
        // position; rediscovery on resume never bumps the count.
        let is_new = existing.is_none();
        if is_new {
            state.total += 1;
        }

        publisher
            .send(CrawlEvent::FirFound(FirFound {
                fir: fir.clone(),
                district_id: district_id.to_string(),
                station_name: station.label.clone(),
            }))
            .await;

        let record = match existing {
            Some(record) => Some(record),
            None => match self
                .deps
                .store
                .insert_record(&NewFirRecord {
                    job_id: job.id,
                    fir_no: fir.fir_no.clone(),
                    fir_date: fir.fir_date.clone(),
                    district_id: district_id.to_string(),
                    station_label: station.label.clone(),
                    brief: fir.brief.clone(),
                    fir_status: fir.fir_status.clone(),
                })
                .await
            {
                Ok(record) => Some(record),
                Err(err) => {
                    publisher
                        .log(
                            LogKind::Error,
                            format!("DB insert failed for {}: {err:#}", fir.fir_no),
                        )
                        .await;
                    None
                }
            },
        };
        if is_new {
            self.persist_progress(job.id, state).await;
        }

        let Some(token) = fir.print_token.as_deref() else {
            publisher
                .send(CrawlEvent::FirStatus(FirStatusUpdate::new(
                    &fir.fir_no,
                    "no_token",
                )))
                .await;
            return Ok(Flow::Continue);
        };

        if record.as_ref().map(|r| r.download_status) == Some(DownloadStatus::Downloaded) {
            publisher
                .log(LogKind::Info, format!("Skipping {} (already downloaded)", fir.fir_no))
                .await;
            return Ok(Flow::Continue);
        }

        publisher
            .log(
                LogKind::Info,
                format!("Downloading PDF for {}. This can take 40-60 seconds...", fir.fir_no),
            )
            .await;
        publisher
            .send(CrawlEvent::FirStatus(FirStatusUpdate::new(
                &fir.fir_no,
                "downloading",
            )))
            .await;
        self.persist_download(job.id, &fir.fir_no, DownloadStatus::Downloading, None)
            .await;

        let dest = ArtifactDest {
            job_name: &job.name,
            district_id,
            station_label: &station.label,
            fir_no: &fir.fir_no,
        };
        let gate = StopGate {
            store: self.deps.store.as_ref(),
            job_id: job.id,
        };

        match self.deps.fetcher.fetch(session, token, &dest, Some(gate)).await {
            FetchOutcome::Downloaded(path) => {
                state.downloaded += 1;
                let path = path.to_string_lossy().into_owned();
                self.persist_download(
                    job.id,
                    &fir.fir_no,
                    DownloadStatus::Downloaded,
                    Some(&path),
                )
                .await;
                self.persist_progress(job.id, state).await;

                let mut update = FirStatusUpdate::new(&fir.fir_no, "downloaded");
                update.path = Some(path);
                update.downloaded = Some(state.downloaded);
                update.total = Some(state.total);
                publisher.send(CrawlEvent::FirStatus(update)).await;
                publisher
                    .log(LogKind::Success, format!("Successfully downloaded {}", fir.fir_no))
                    .await;
                Ok(Flow::Continue)
            }
            FetchOutcome::Failed(reason) => {
                self.persist_download(job.id, &fir.fir_no, DownloadStatus::Failed, None)
                    .await;
                publisher
                    .log(
                        LogKind::Error,
                        format!("Failed to download {}: {}", fir.fir_no, reason),
                    )
                    .await;
                let mut update = FirStatusUpdate::new(&fir.fir_no, "failed");
                update.error = Some(reason);
                publisher.send(CrawlEvent::FirStatus(update)).await;
                Ok(Flow::Continue)
            }
            FetchOutcome::Stopped => {
                self.persist_download(job.id, &fir.fir_no, DownloadStatus::Failed, None)
                    .await;
                publisher
                    .log(
                        LogKind::Warning,
                        format!("Download aborted for {} by user.", fir.fir_no),
                    )
                    .await;
                let mut update = FirStatusUpdate::new(&fir.fir_no, "failed");
                update.error = Some("stopped by user".to_string());
                publisher.send(CrawlEvent::FirStatus(update)).await;
                Ok(Flow::Stop)
            }
        }
    }

    /// Cancellation gate: reads the job registry status, which is
    /// read-after-write consistent with the stop command.
    async fn is_stopped(&self, job_id: Uuid) -> Result<bool> {
        let status = self
            .deps
            .store
            .fetch_status(job_id)
            .await
            .context("Failed to read job status")?;
        Ok(status == Some(JobStatus::Stopped))
    }

    /// Count writes are best-effort: the stream stays authoritative for
    /// the live run, and checkpoint persistence re-asserts the counts.
    async fn persist_progress(&self, job_id: Uuid, state: &RunState) {
        if let Err(err) = self
            .deps
            .store
            .update_progress(job_id, state.total, state.downloaded)
            .await
        {
            tracing::warn!(job_id = %job_id, error = %format!("{err:#}"), "progress write failed");
        }
    }

    async fn persist_download(
        &self,
        job_id: Uuid,
        fir_no: &str,
        status: DownloadStatus,
        path: Option<&str>,
    ) {
        if let Err(err) = self
            .deps
            .store
            .update_record_download(job_id, fir_no, status, path)
            .await
        {
            tracing::warn!(
                job_id = %job_id,
                fir_no,
                error = %format!("{err:#}"),
                "record status write failed"
            );
        }
    }
}

fn next_day(date: NaiveDate) -> Result<NaiveDate> {
    date.succ_opt().context("Date range overflow")
}

//! Artifact (FIR PDF) fetching at the boundary to the browser download.
//!
//! The driver triggers the portal's export popup and the browser drops the
//! file somewhere in the target directory a while later. Each fetch runs
//! in a private scratch workspace so a retry can never collide with a
//! stale leftover from an earlier attempt or another job sharing the
//! download root; the finished file is atomically renamed into its final
//! per-job/per-district/per-station location.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use portal_automation::PortalSession;
use uuid::Uuid;

use super::jobs::store::CrawlStore;
use crate::kernel::jobs::job::JobStatus;

/// Subdirectory of the download root holding in-flight scratch workspaces.
const STAGING_DIR: &str = ".staging";

#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    /// Ceiling for the file to fully materialize after the trigger.
    pub timeout: Duration,
    /// How often to look for the file and re-check the stop flag.
    pub poll_interval: Duration,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Where a fetched artifact ends up.
pub struct ArtifactDest<'a> {
    pub job_name: &'a str,
    pub district_id: &'a str,
    pub station_label: &'a str,
    pub fir_no: &'a str,
}

/// Cooperative stop signal checked before and during the wait.
pub struct StopGate<'a> {
    pub store: &'a dyn CrawlStore,
    pub job_id: Uuid,
}

impl StopGate<'_> {
    async fn is_stopped(&self) -> bool {
        match self.store.fetch_status(self.job_id).await {
            Ok(status) => status == Some(JobStatus::Stopped),
            Err(err) => {
                tracing::warn!(job_id = %self.job_id, error = %err, "stop check failed");
                false
            }
        }
    }
}

/// Outcome of a single artifact fetch. Failures never abort anything
/// beyond the one record they belong to.
#[derive(Debug)]
pub enum FetchOutcome {
    Downloaded(PathBuf),
    Stopped,
    Failed(String),
}

/// Replace anything that is not ASCII alphanumeric so a FIR number like
/// `0123/2024` becomes a safe file name.
pub fn sanitize_fir_no(fir_no: &str) -> String {
    fir_no
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

pub struct ArtifactFetcher {
    root: PathBuf,
    config: ArtifactConfig,
}

impl ArtifactFetcher {
    pub fn new(root: PathBuf, config: ArtifactConfig) -> Self {
        Self { root, config }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fetch one record's PDF through the live session.
    pub async fn fetch(
        &self,
        session: &Arc<dyn PortalSession>,
        token: &str,
        dest: &ArtifactDest<'_>,
        stop: Option<StopGate<'_>>,
    ) -> FetchOutcome {
        if let Some(gate) = &stop {
            if gate.is_stopped().await {
                return FetchOutcome::Stopped;
            }
        }

        let scratch = self.root.join(STAGING_DIR).join(Uuid::new_v4().to_string());
        if let Err(err) = tokio::fs::create_dir_all(&scratch).await {
            return FetchOutcome::Failed(format!("could not create scratch dir: {err}"));
        }

        let outcome = self.fetch_into_scratch(session, token, dest, stop, &scratch).await;
        remove_scratch(&scratch).await;
        outcome
    }

    async fn fetch_into_scratch(
        &self,
        session: &Arc<dyn PortalSession>,
        token: &str,
        dest: &ArtifactDest<'_>,
        stop: Option<StopGate<'_>>,
        scratch: &Path,
    ) -> FetchOutcome {
        if let Err(err) = session.trigger_fir_download(token, scratch).await {
            return FetchOutcome::Failed(format!("export trigger failed: {err}"));
        }

        let started = Instant::now();
        let completed = loop {
            if started.elapsed() > self.config.timeout {
                return FetchOutcome::Failed(format!(
                    "artifact did not materialize within {}s",
                    self.config.timeout.as_secs()
                ));
            }
            tokio::time::sleep(self.config.poll_interval).await;

            if let Some(gate) = &stop {
                if gate.is_stopped().await {
                    return FetchOutcome::Stopped;
                }
            }

            match completed_pdf_in(scratch).await {
                Ok(Some(path)) => break path,
                Ok(None) => continue,
                Err(err) => {
                    return FetchOutcome::Failed(format!("scratch dir unreadable: {err}"))
                }
            }
        };

        let final_dir = self
            .root
            .join(dest.job_name)
            .join(dest.district_id)
            .join(dest.station_label);
        if let Err(err) = tokio::fs::create_dir_all(&final_dir).await {
            return FetchOutcome::Failed(format!("could not create destination dir: {err}"));
        }
        let final_path = final_dir.join(format!("{}.pdf", sanitize_fir_no(dest.fir_no)));

        // A retry replaces whatever an earlier attempt left behind.
        let _ = tokio::fs::remove_file(&final_path).await;
        if let Err(err) = tokio::fs::rename(&completed, &final_path).await {
            return FetchOutcome::Failed(format!("could not move artifact into place: {err}"));
        }
        FetchOutcome::Downloaded(final_path)
    }
}

/// A download is complete once a non-empty `.pdf` sits in the workspace
/// with no in-progress browser temp file next to it.
async fn completed_pdf_in(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut pdf = None;
    let mut in_progress = false;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some("pdf") => {
                if entry.metadata().await?.len() > 0 {
                    pdf = Some(path);
                }
            }
            Some("crdownload") => in_progress = true,
            _ => {}
        }
    }
    Ok(if in_progress { None } else { pdf })
}

async fn remove_scratch(scratch: &Path) {
    if let Err(err) = tokio::fs::remove_dir_all(scratch).await {
        tracing::debug!(path = %scratch.display(), error = %err, "scratch cleanup failed");
    }
}

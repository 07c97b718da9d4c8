//! Durable state behind the orchestrator: the job registry (lifecycle
//! status used for cooperative stop/resume) and the checkpoint store
//! (last completed unit + cumulative counts), plus the per-job record
//! table the dedupe rule is evaluated against.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::job::{Checkpoint, CrawlJob, JobStatus};
use super::record::{DownloadStatus, FirRecord, NewFirRecord};

#[async_trait]
pub trait CrawlStore: Send + Sync {
    async fn create_job(&self, job: &CrawlJob) -> Result<()>;

    async fn get_job(&self, id: Uuid) -> Result<Option<CrawlJob>>;

    async fn list_jobs(&self) -> Result<Vec<CrawlJob>>;

    async fn set_status(&self, id: Uuid, status: JobStatus) -> Result<()>;

    /// Stop command: `processing -> stopped`, permitted only while
    /// processing. Returns whether the transition happened.
    async fn stop_job(&self, id: Uuid) -> Result<bool>;

    /// Current lifecycle status — the cancellation gate. Must observe the
    /// most recent stop command (read-after-write).
    async fn fetch_status(&self, id: Uuid) -> Result<Option<JobStatus>>;

    /// Persist cumulative counts mid-unit so an interrupted run resumes
    /// with accurate totals.
    async fn update_progress(&self, id: Uuid, total: i64, downloaded: i64) -> Result<()>;

    /// Advance the checkpoint to a fully completed unit, together with the
    /// counts as of that unit. The only call that moves the checkpoint.
    async fn save_checkpoint(
        &self,
        id: Uuid,
        checkpoint: &Checkpoint,
        total: i64,
        downloaded: i64,
    ) -> Result<()>;

    async fn complete_job(&self, id: Uuid, total: i64, downloaded: i64) -> Result<()>;

    /// Look up a record by its natural key (job id, FIR number).
    async fn find_record(&self, job_id: Uuid, fir_no: &str) -> Result<Option<FirRecord>>;

    async fn insert_record(&self, record: &NewFirRecord) -> Result<FirRecord>;

    async fn update_record_download(
        &self,
        job_id: Uuid,
        fir_no: &str,
        status: DownloadStatus,
        pdf_path: Option<&str>,
    ) -> Result<()>;

    /// Force every `processing` job to `stopped` so work interrupted by a
    /// shutdown or crash is resumable instead of silently abandoned.
    async fn reset_processing_jobs(&self) -> Result<u64>;
}

pub struct PostgresCrawlStore {
    pool: PgPool,
}

impl PostgresCrawlStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn job_from_row(row: &sqlx::postgres::PgRow) -> Result<CrawlJob> {
    let status: String = row.get("status");
    let checkpoint: Option<serde_json::Value> = row.get("checkpoint");
    Ok(CrawlJob {
        id: row.get("id"),
        name: row.get("name"),
        params: serde_json::from_value(row.get("search_params"))
            .context("Malformed search_params")?,
        status: JobStatus::parse(&status)
            .ok_or_else(|| anyhow!("Unknown job status '{status}'"))?,
        total_firs: row.get("total_firs"),
        downloaded_firs: row.get("downloaded_firs"),
        checkpoint: checkpoint
            .map(serde_json::from_value)
            .transpose()
            .context("Malformed checkpoint")?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<FirRecord> {
    let status: String = row.get("download_status");
    Ok(FirRecord {
        id: row.get("id"),
        job_id: row.get("job_id"),
        fir_no: row.get("fir_no"),
        fir_date: row.get("fir_date"),
        district_id: row.get("district_id"),
        station_label: row.get("station_label"),
        brief: row.get("brief"),
        fir_status: row.get("fir_status"),
        download_status: DownloadStatus::parse(&status)
            .ok_or_else(|| anyhow!("Unknown download status '{status}'"))?,
        pdf_path: row.get("pdf_path"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl CrawlStore for PostgresCrawlStore {
    async fn create_job(&self, job: &CrawlJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO crawl_jobs (id, name, search_params, status, total_firs, downloaded_firs, checkpoint, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(serde_json::to_value(&job.params)?)
        .bind(job.status.as_str())
        .bind(job.total_firs)
        .bind(job.downloaded_firs)
        .bind(job.checkpoint.as_ref().map(serde_json::to_value).transpose()?)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to create crawl job")?;
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<CrawlJob>> {
        let row = sqlx::query("SELECT * FROM crawl_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch crawl job")?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn list_jobs(&self) -> Result<Vec<CrawlJob>> {
        let rows = sqlx::query("SELECT * FROM crawl_jobs ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list crawl jobs")?;
        rows.iter().map(job_from_row).collect()
    }

    async fn set_status(&self, id: Uuid, status: JobStatus) -> Result<()> {
        sqlx::query("UPDATE crawl_jobs SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update job status")?;
        Ok(())
    }

    async fn stop_job(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE crawl_jobs SET status = 'stopped', updated_at = NOW() WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to stop job")?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch_status(&self, id: Uuid) -> Result<Option<JobStatus>> {
        let row = sqlx::query("SELECT status FROM crawl_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch job status")?;
        row.map(|r| {
            let status: String = r.get("status");
            JobStatus::parse(&status).ok_or_else(|| anyhow!("Unknown job status '{status}'"))
        })
        .transpose()
    }

    async fn update_progress(&self, id: Uuid, total: i64, downloaded: i64) -> Result<()> {
        sqlx::query(
            "UPDATE crawl_jobs SET total_firs = $1, downloaded_firs = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(total)
        .bind(downloaded)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update job progress")?;
        Ok(())
    }

    async fn save_checkpoint(
        &self,
        id: Uuid,
        checkpoint: &Checkpoint,
        total: i64,
        downloaded: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET checkpoint = $1,
                total_firs = $2,
                downloaded_firs = $3,
                updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(serde_json::to_value(checkpoint)?)
        .bind(total)
        .bind(downloaded)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to save checkpoint")?;
        Ok(())
    }

    async fn complete_job(&self, id: Uuid, total: i64, downloaded: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET status = 'completed',
                total_firs = $1,
                downloaded_firs = $2,
                updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(total)
        .bind(downloaded)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to complete job")?;
        Ok(())
    }

    async fn find_record(&self, job_id: Uuid, fir_no: &str) -> Result<Option<FirRecord>> {
        let row = sqlx::query("SELECT * FROM fir_records WHERE job_id = $1 AND fir_no = $2")
            .bind(job_id)
            .bind(fir_no)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to find record")?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn insert_record(&self, record: &NewFirRecord) -> Result<FirRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO fir_records (job_id, fir_no, fir_date, district_id, station_label, brief, fir_status, download_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
            RETURNING *
            "#,
        )
        .bind(record.job_id)
        .bind(&record.fir_no)
        .bind(&record.fir_date)
        .bind(&record.district_id)
        .bind(&record.station_label)
        .bind(&record.brief)
        .bind(&record.fir_status)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert record")?;
        record_from_row(&row)
    }

    async fn update_record_download(
        &self,
        job_id: Uuid,
        fir_no: &str,
        status: DownloadStatus,
        pdf_path: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE fir_records
            SET download_status = $1,
                pdf_path = COALESCE($2, pdf_path)
            WHERE job_id = $3 AND fir_no = $4
            "#,
        )
        .bind(status.as_str())
        .bind(pdf_path)
        .bind(job_id)
        .bind(fir_no)
        .execute(&self.pool)
        .await
        .context("Failed to update record download status")?;
        Ok(())
    }

    async fn reset_processing_jobs(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE crawl_jobs SET status = 'stopped', updated_at = NOW() WHERE status = 'processing'",
        )
        .execute(&self.pool)
        .await
        .context("Failed to reset processing jobs")?;
        Ok(result.rows_affected())
    }
}

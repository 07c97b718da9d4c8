use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Base URL of the browser-driver sidecar.
    pub driver_url: String,
    /// Root directory downloaded FIR PDFs land under.
    pub download_root: PathBuf,
    /// Ceiling for a single artifact to materialize on disk.
    pub artifact_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            driver_url: env::var("PORTAL_DRIVER_URL")
                .unwrap_or_else(|_| "http://localhost:9222".to_string()),
            download_root: env::var("DOWNLOAD_ROOT")
                .unwrap_or_else(|_| "download".to_string())
                .into(),
            artifact_timeout: Duration::from_secs(
                env::var("ARTIFACT_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()
                    .context("ARTIFACT_TIMEOUT_SECS must be a valid number")?,
            ),
        })
    }
}

use anyhow::{Context, Result};
use std::time::Duration;

/// MIMIT regional average road fuel prices, published on weekdays.
pub const DEFAULT_CSV_URL: &str =
    "https://www.mimit.gov.it/images/stories/carburanti/MediaRegionaleStradale.csv";

pub const DEFAULT_RETENTION_DAYS: i32 = 30;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: String,
    pub csv_url: String,
    pub retention_days: i32,
    pub fetch_timeout: Duration,
}

impl Config {
    /// Read and validate configuration once at startup. Components receive
    /// this struct instead of reading the environment ad hoc.
    pub fn from_env() -> Result<Self> {
        let db_url = std::env::var("DB_URL").context("DB_URL env var missing")?;
        let csv_url =
            std::env::var("CSV_URL").unwrap_or_else(|_| DEFAULT_CSV_URL.to_string());
        let retention_days: i32 = std::env::var("RETENTION_DAYS")
            .unwrap_or_else(|_| DEFAULT_RETENTION_DAYS.to_string())
            .parse()
            .context("RETENTION_DAYS must be an integer")?;
        anyhow::ensure!(retention_days > 0, "RETENTION_DAYS must be positive");
        let fetch_timeout_secs: u64 = std::env::var("FETCH_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_FETCH_TIMEOUT_SECS.to_string())
            .parse()
            .context("FETCH_TIMEOUT_SECS must be an integer")?;

        Ok(Self {
            db_url,
            csv_url,
            retention_days,
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
        })
    }
}

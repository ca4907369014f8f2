use std::path::PathBuf;
use std::time::Duration;

use bookmeta_core::chunking::{validate_chunk_size, DEFAULT_CHUNK_SIZE};
use bookmeta_core::isbn::MAX_SYNC_BATCH;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3001`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    /// A single `*` allows any origin.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). Progress streams are
    /// exempt.
    pub request_timeout_secs: u64,
    /// How long background tasks get to stop after shutdown starts (default: `5`).
    pub shutdown_timeout_secs: u64,
    /// CSV file books are saved to (default: `ai_responses.csv`).
    pub csv_file_path: PathBuf,
    /// Chunk size used when a job request does not give one (default: `50`).
    pub default_chunk_size: usize,
    /// Maximum ISBNs accepted by the synchronous endpoints (default: `50`).
    pub max_sync_batch: usize,
    /// Pause between two chunks of a job, in milliseconds (default: `1000`).
    pub chunk_delay_ms: u64,
    /// How long finished jobs are kept, in hours (default: `24`).
    pub job_retention_hours: i64,
    /// Interval between retention sweeps, in seconds (default: `3600`).
    pub job_sweep_interval_secs: u64,
    /// Maximum request body size for uploads, in bytes (default: 10 MiB).
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `HOST`                    | `0.0.0.0`               |
    /// | `PORT`                    | `3001`                  |
    /// | `CORS_ORIGINS`            | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `5`                     |
    /// | `CSV_FILE_PATH`           | `ai_responses.csv`      |
    /// | `DEFAULT_CHUNK_SIZE`      | `50`                    |
    /// | `MAX_SYNC_BATCH`          | `50`                    |
    /// | `CHUNK_DELAY_MS`          | `1000`                  |
    /// | `JOB_RETENTION_HOURS`     | `24`                    |
    /// | `JOB_SWEEP_INTERVAL_SECS` | `3600`                  |
    /// | `MAX_UPLOAD_BYTES`        | `10485760`              |
    ///
    /// Panics on values that do not parse or fail [`validate`](Self::validate);
    /// misconfiguration should fail at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3001".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let csv_file_path = std::env::var("CSV_FILE_PATH")
            .unwrap_or_else(|_| "ai_responses.csv".into())
            .into();

        let config = Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: parse_var("SHUTDOWN_TIMEOUT_SECS", 5),
            csv_file_path,
            default_chunk_size: parse_var("DEFAULT_CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
            max_sync_batch: parse_var("MAX_SYNC_BATCH", MAX_SYNC_BATCH),
            chunk_delay_ms: parse_var("CHUNK_DELAY_MS", 1_000),
            job_retention_hours: parse_var("JOB_RETENTION_HOURS", 24),
            job_sweep_interval_secs: parse_var("JOB_SWEEP_INTERVAL_SECS", 3_600),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
        };

        if let Err(e) = config.validate() {
            panic!("Invalid configuration: {e}");
        }
        config
    }

    /// Reject values that parse but cannot drive the server.
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_secs == 0 {
            return Err("REQUEST_TIMEOUT_SECS must be greater than 0".into());
        }
        if self.job_sweep_interval_secs == 0 {
            return Err("JOB_SWEEP_INTERVAL_SECS must be greater than 0".into());
        }
        validate_chunk_size(self.default_chunk_size)
            .map_err(|e| format!("DEFAULT_CHUNK_SIZE: {e}"))?;
        Ok(())
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    pub fn job_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.job_retention_hours)
    }

    pub fn job_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.job_sweep_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Read `name` as `T`, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be a valid value: {e}")),
        Err(_) => default,
    }
}

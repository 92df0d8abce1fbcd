//! Configuration management for the re-dating engine.
//!
//! Loads configuration from a TOML file; every field has a default so a
//! minimal file (or none at all) still yields a working setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub share: ShareConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareConfig {
    /// Local mount point of the SMB/CIFS share
    pub mount_point: PathBuf,

    /// Path below the mount point to operate in
    #[serde(default)]
    pub base_path: PathBuf,

    /// Coarsest timestamp granularity the share protocol stores, in seconds.
    /// CIFS mounts commonly truncate to whole seconds.
    #[serde(default = "default_time_resolution_secs")]
    pub time_resolution_secs: u32,

    /// Structurally validate PDF files before mutating them
    #[serde(default = "default_true")]
    pub validate_pdfs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of pooled share connections
    #[serde(default = "default_pool_size")]
    pub size: usize,

    /// How long a transaction waits for a free connection before the
    /// checkout is treated as a transient failure
    #[serde(default = "default_checkout_timeout_secs")]
    pub checkout_timeout_secs: u64,

    /// Per network call deadline
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per network call site (first try included)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay after each failed attempt
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on a single backoff delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum transactions in flight at once
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Capture a content checksum in each backup record
    #[serde(default = "default_true")]
    pub verify_checksums: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_time_resolution_secs() -> u32 {
    1
}

fn default_pool_size() -> usize {
    3
}

fn default_checkout_timeout_secs() -> u64 {
    30
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_workers() -> usize {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::new(),
            base_path: PathBuf::new(),
            time_resolution_secs: default_time_resolution_secs(),
            validate_pdfs: true,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            checkout_timeout_secs: default_checkout_timeout_secs(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            verify_checksums: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pool.size == 0 {
            anyhow::bail!("pool.size must be at least 1");
        }
        if self.batch.max_workers == 0 {
            anyhow::bail!("batch.max_workers must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.share.time_resolution_secs == 0 {
            anyhow::bail!("share.time_resolution_secs must be at least 1");
        }
        Ok(())
    }

    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_secs(self.pool.checkout_timeout_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.pool.call_timeout_secs)
    }

    pub fn time_resolution(&self) -> Duration {
        Duration::from_secs(u64::from(self.share.time_resolution_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_minimal_file_uses_defaults() -> anyhow::Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "[share]\nmount_point = \"/mnt/nas\"")?;

        let config = Config::from_file(file.path())?;
        assert_eq!(config.share.mount_point, PathBuf::from("/mnt/nas"));
        assert_eq!(config.pool.size, 3);
        assert_eq!(config.batch.max_workers, 5);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert!((config.retry.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.share.time_resolution_secs, 1);
        assert!(config.share.validate_pdfs);
        assert!(config.batch.verify_checksums);
        Ok(())
    }

    #[test]
    fn test_overrides() -> anyhow::Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(
            file,
            "[share]\nmount_point = \"/mnt/nas\"\ntime_resolution_secs = 2\n\n\
             [pool]\nsize = 8\n\n[batch]\nmax_workers = 16\nverify_checksums = false"
        )?;

        let config = Config::from_file(file.path())?;
        assert_eq!(config.pool.size, 8);
        assert_eq!(config.batch.max_workers, 16);
        assert_eq!(config.time_resolution(), Duration::from_secs(2));
        assert!(!config.batch.verify_checksums);
        Ok(())
    }

    #[test]
    fn test_zero_pool_rejected() -> anyhow::Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "[share]\nmount_point = \"/mnt/nas\"\n\n[pool]\nsize = 0")?;

        assert!(Config::from_file(file.path()).is_err());
        Ok(())
    }
}

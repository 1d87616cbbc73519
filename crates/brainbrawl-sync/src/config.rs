//! Runtime configuration loaded from environment variables.
//!
//! All settings have sensible defaults so a session can start with zero
//! configuration.

use std::path::PathBuf;
use std::time::Duration;

use brainbrawl_shared::constants::{
    DEFAULT_BUS_CAPACITY, DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_OPEN_RETRIES, DEFAULT_OPEN_RETRY_MS,
    DEFAULT_RESYNC_SECS,
};
use brainbrawl_store::{StoreLocation, StoreOptions};

/// Default `tracing` filter when neither `RUST_LOG` nor `BRAINBRAWL_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "brainbrawl_sync=debug,brainbrawl_store=info,warn";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Database file.
    /// Env: `BRAINBRAWL_DB_PATH`
    /// Default: `brainbrawl.db` in the platform data directory.
    pub db_path: Option<PathBuf>,

    /// Extra open attempts while another process holds the database lock.
    /// Env: `BRAINBRAWL_OPEN_RETRIES`
    /// Default: `5`
    pub open_retries: u32,

    /// Delay between open attempts.
    /// Env: `BRAINBRAWL_OPEN_RETRY_MS`
    /// Default: `200`
    pub open_retry_delay: Duration,

    /// SQLite busy timeout for a single attempt.
    /// Env: `BRAINBRAWL_BUSY_TIMEOUT_MS`
    /// Default: `2000`
    pub busy_timeout: Duration,

    /// Interval between unsolicited `updateGame` snapshots from the master.
    /// Env: `BRAINBRAWL_RESYNC_SECS`
    /// Default: `10`
    pub resync_interval: Duration,

    /// Capacity of the master -> observer broadcast channel. Observers that
    /// fall further behind than this lose messages and resync.
    /// Env: `BRAINBRAWL_BUS_CAPACITY`
    /// Default: `64`
    pub bus_capacity: usize,

    /// Fallback `tracing` filter; `RUST_LOG` still takes precedence.
    /// Env: `BRAINBRAWL_LOG`
    pub log_filter: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            open_retries: DEFAULT_OPEN_RETRIES,
            open_retry_delay: Duration::from_millis(DEFAULT_OPEN_RETRY_MS),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_SECS),
            bus_capacity: DEFAULT_BUS_CAPACITY,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("BRAINBRAWL_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(n) = parse_var(&lookup, "BRAINBRAWL_OPEN_RETRIES") {
            config.open_retries = n;
        }

        if let Some(ms) = parse_var(&lookup, "BRAINBRAWL_OPEN_RETRY_MS") {
            config.open_retry_delay = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_var(&lookup, "BRAINBRAWL_BUSY_TIMEOUT_MS") {
            config.busy_timeout = Duration::from_millis(ms);
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "BRAINBRAWL_RESYNC_SECS") {
            if secs == 0 {
                tracing::warn!("BRAINBRAWL_RESYNC_SECS must be positive, using default");
            } else {
                config.resync_interval = Duration::from_secs(secs);
            }
        }

        if let Some(capacity) = parse_var::<usize>(&lookup, "BRAINBRAWL_BUS_CAPACITY") {
            // tokio's broadcast channel panics on a zero capacity
            if capacity == 0 {
                tracing::warn!("BRAINBRAWL_BUS_CAPACITY must be positive, using default");
            } else {
                config.bus_capacity = capacity;
            }
        }

        if let Some(filter) = lookup("BRAINBRAWL_LOG") {
            config.log_filter = filter;
        }

        config
    }

    /// Options for [`StoreHandle::open`](brainbrawl_store::StoreHandle::open).
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            location: match &self.db_path {
                Some(path) => StoreLocation::Path(path.clone()),
                None => StoreLocation::DataDir,
            },
            busy_timeout: self.busy_timeout,
            open_retries: self.open_retries,
            retry_delay: self.open_retry_delay,
        }
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AgoraError, Result};

pub const DEFAULT_DATA_DIR: &str = ".agora";
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Everything needed to open a store over one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub lock_timeout: Duration,
    pub lock_retry_interval: Duration,
    pub cache_capacity: usize,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            lock_retry_interval: DEFAULT_LOCK_RETRY_INTERVAL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Resolve configuration from `AGORA_*` environment variables, falling
    /// back to defaults for anything unset or empty.
    pub fn from_env() -> Result<Self> {
        let data_dir = env_value("AGORA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let mut config = Self::new(data_dir);
        if let Some(ms) = env_number("AGORA_LOCK_TIMEOUT_MS")? {
            config.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_number("AGORA_LOCK_RETRY_MS")? {
            config.lock_retry_interval = Duration::from_millis(ms);
        }
        if let Some(capacity) = env_number("AGORA_CACHE_CAPACITY")? {
            config.cache_capacity = capacity as usize;
        }
        Ok(config)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval = interval;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_number(key: &str) -> Result<Option<u64>> {
    env_value(key)
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|_| AgoraError::Validation(format!("{key} must be a number, got '{raw}'")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env-var tests must not run concurrently.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "AGORA_DATA_DIR",
            "AGORA_LOCK_TIMEOUT_MS",
            "AGORA_LOCK_RETRY_MS",
            "AGORA_CACHE_CAPACITY",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn defaults_when_env_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let config = StoreConfig::from_env().unwrap();
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.lock_timeout, DEFAULT_LOCK_TIMEOUT);
        assert_eq!(config.lock_retry_interval, DEFAULT_LOCK_RETRY_INTERVAL);
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
    }

    #[test]
    fn env_overrides_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        unsafe {
            std::env::set_var("AGORA_DATA_DIR", "/tmp/agora-test");
            std::env::set_var("AGORA_LOCK_TIMEOUT_MS", "250");
            std::env::set_var("AGORA_CACHE_CAPACITY", " 8 ");
        }
        let config = StoreConfig::from_env().unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/agora-test"));
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.cache_capacity, 8);

        unsafe { std::env::set_var("AGORA_LOCK_RETRY_MS", "soon") };
        let err = StoreConfig::from_env().unwrap_err();
        assert_eq!(err.code(), "validation_failed");

        clear_env();
    }
}

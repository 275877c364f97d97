use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_MIN_THREADS: usize = 1;
pub const DEFAULT_MAX_THREADS: usize = 255;
pub const DEFAULT_TASK_QUEUE_SIZE: usize = 255;
pub const DEFAULT_MAX_IDLE_TIME_MS: u64 = 60_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Configuration for a `BoundedThreadPool`.
///
/// Every field has a default, so a JSON document only needs the fields it
/// overrides:
///
/// ```rust
/// use btpool::config::PoolConfig;
///
/// let config = PoolConfig::from_json_str(r#"{ "max_threads": 8, "queue_size": 16 }"#).unwrap();
/// assert_eq!(config.max_threads, 8);
/// assert_eq!(config.min_threads, 1);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Pool name, used as the worker thread name prefix.
    /// `None` picks `btpool<N>` from a process-wide counter.
    pub name: Option<String>,

    /// Workers spawned by `start()` and kept alive while idle.
    pub min_threads: usize,

    /// Hard cap on live workers.
    pub max_threads: usize,

    /// Backlog capacity. Zero means jobs are only accepted when a worker can
    /// take them immediately.
    pub queue_size: usize,

    /// Idle time after which one surplus worker may exit.
    pub max_idle_time_ms: u64,

    /// Timeout of a worker's backlog pull.
    pub poll_interval_ms: u64,

    /// Idle-thread watermark for `is_low_on_threads`.
    pub low_threads: usize,

    /// Daemon pools detach from their owner on drop; non-daemon pools stop
    /// and drain first.
    pub daemon: bool,

    /// Stack size of worker threads in bytes. `None` keeps the platform
    /// default.
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: None,
            min_threads: DEFAULT_MIN_THREADS,
            max_threads: DEFAULT_MAX_THREADS,
            queue_size: DEFAULT_TASK_QUEUE_SIZE,
            max_idle_time_ms: DEFAULT_MAX_IDLE_TIME_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            low_threads: 0,
            daemon: false,
            stack_size: None,
        }
    }
}

impl PoolConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_min_threads(mut self, min_threads: usize) -> Self {
        self.min_threads = min_threads;
        self
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn with_max_idle_time_ms(mut self, max_idle_time_ms: u64) -> Self {
        self.max_idle_time_ms = max_idle_time_ms;
        self
    }

    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn with_low_threads(mut self, low_threads: usize) -> Self {
        self.low_threads = low_threads;
        self
    }

    pub fn with_daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    pub fn max_idle_time(&self) -> Duration {
        Duration::from_millis(self.max_idle_time_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check the thread bounds and timings for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::Invalid("max_threads must be at least 1".to_string()));
        }
        if self.min_threads > self.max_threads {
            return Err(ConfigError::Invalid(format!(
                "min_threads ({}) exceeds max_threads ({})",
                self.min_threads, self.max_threads
            )));
        }
        if self.low_threads > self.max_threads {
            return Err(ConfigError::Invalid(format!(
                "low_threads ({}) exceeds max_threads ({})",
                self.low_threads, self.max_threads
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be at least 1".to_string()));
        }
        if matches!(&self.name, Some(name) if name.contains('\0')) {
            return Err(ConfigError::Invalid("name must not contain NUL bytes".to_string()));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: PoolConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

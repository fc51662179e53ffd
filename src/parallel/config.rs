//! Configuration for parallel map execution

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default prefix for worker thread names
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "pardo-worker";

/// Configuration for parallel execution
///
/// Missing fields take their defaults when deserialized, so an application
/// can embed this in its own config file and only override what it needs:
///
/// ```
/// use pardo::ParallelConfig;
///
/// let config: ParallelConfig = serde_json::from_str(r#"{ "max_parallelism": 3 }"#).unwrap();
/// assert_eq!(config.max_parallelism, 3);
/// assert_eq!(config.thread_name_prefix, "pardo-worker");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Maximum number of concurrent workers (default: num_cpus)
    pub max_parallelism: usize,
    /// Prefix for worker thread names; workers are named `<prefix>-<n>`
    pub thread_name_prefix: String,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_parallelism: num_cpus::get(),
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }
}

impl ParallelConfig {
    /// Set the maximum number of concurrent workers
    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism;
        self
    }

    /// Set the worker thread name prefix
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Check the configuration can build a pool
    pub fn validate(&self) -> Result<()> {
        if self.max_parallelism == 0 {
            return Err(Error::invalid_config("max_parallelism must be at least 1"));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(Error::invalid_config("thread_name_prefix must not be empty"));
        }
        Ok(())
    }

    /// Number of workers a pool for `total_items` units needs
    pub(crate) fn workers_for(&self, total_items: usize) -> usize {
        self.max_parallelism.min(total_items).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ParallelConfig::default();
        assert!(config.max_parallelism >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let config = ParallelConfig::default().with_max_parallelism(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_parallelism"));
    }

    #[test]
    fn test_blank_prefix_rejected() {
        let config = ParallelConfig::default().with_thread_name_prefix("  ");
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_workers_capped_by_items() {
        let config = ParallelConfig::default().with_max_parallelism(8);
        assert_eq!(config.workers_for(3), 3);
        assert_eq!(config.workers_for(100), 8);
        assert_eq!(config.workers_for(0), 1);
    }
}

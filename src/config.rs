//! Repository configuration
//!
//! All tunables live here. Everything has a default so that
//! `RepositoryConfig::default()` yields a working single-process setup.

use serde::Deserialize;

/// Top-level configuration for one repository instance
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Logical repository name, carried in invalidation messages and bundles
    pub name: String,

    /// Maximum number of clean entries kept in a session's node cache.
    /// Dirty entries are pinned and do not count against this limit.
    pub cache_capacity: usize,

    /// Work pipeline tunables
    pub work: WorkConfig,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            name: "default".into(),
            cache_capacity: 1000,
            work: WorkConfig::default(),
        }
    }
}

/// Tunables for the asynchronous work pipeline
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkConfig {
    /// Worker tasks per named queue
    pub workers_per_queue: usize,

    /// Bundles admitted per queue before submit starts applying backpressure
    pub queue_capacity: usize,

    /// Delivery attempts per listener before dead-lettering (first try included)
    pub max_attempts: u32,

    /// Base backoff between retries, doubled per attempt, with jitter
    pub retry_backoff_ms: u64,

    /// How long a committing session blocks on a saturated queue before the
    /// bundle is accepted anyway with a warning
    pub submit_timeout_ms: u64,
}

impl Default for WorkConfig {
    fn default() -> Self {
        Self {
            workers_per_queue: 2,
            queue_capacity: 128,
            max_attempts: 3,
            retry_backoff_ms: 50,
            submit_timeout_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = RepositoryConfig::default();
        assert_eq!(config.name, "default");
        assert!(config.cache_capacity > 0);
        assert!(config.work.workers_per_queue > 0);
        assert!(config.work.max_attempts >= 1);
    }

    #[test]
    fn test_partial_config_from_json() {
        let config: RepositoryConfig = serde_json::from_str(
            r#"{"name": "docs", "work": {"max_attempts": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.name, "docs");
        assert_eq!(config.work.max_attempts, 5);
        // Unspecified fields fall back to defaults
        assert_eq!(config.work.workers_per_queue, 2);
        assert_eq!(config.cache_capacity, 1000);
    }
}

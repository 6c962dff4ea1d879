use std::env;
use std::time::Duration;

use crate::DEFAULT_REQUEST_TIMEOUT;

/// Environment variable that overrides the worker pool size.
pub const POOL_SIZE_ENV: &str = "EMBEDNET_POOL_SIZE";

/// Environment variable that overrides the maximum pending request count.
pub const MAX_PENDING_ENV: &str = "EMBEDNET_MAX_PENDING";

/// Tunables for the broker, its worker pool, and shutdown.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Number of workers in the pool.
    pub pool_size: usize,

    /// Maximum number of accepted requests waiting for a free worker.
    /// Submissions beyond this bound are backpressured, not dropped.
    pub max_pending: usize,

    /// Timeout applied when the caller does not pass one explicitly.
    pub default_timeout: Duration,

    /// How long shutdown waits for in-flight requests to settle before
    /// force-cancelling the remainder.
    pub grace_timeout: Duration,
}

impl BrokerConfig {
    pub fn new() -> Self {
        Self {
            pool_size: 4,
            max_pending: 64,
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
            grace_timeout: Duration::from_secs(5),
        }
    }

    /// Builds a config with `EMBEDNET_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Some(size) = positive_from_env(POOL_SIZE_ENV) {
            config.pool_size = size;
        }
        if let Some(bound) = positive_from_env(MAX_PENDING_ENV) {
            config.max_pending = bound;
        }
        config
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_grace_timeout(mut self, timeout: Duration) -> Self {
        self.grace_timeout = timeout;
        self
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses an environment variable as a positive count.
pub fn positive_from_env(key: &str) -> Option<usize> {
    let raw = env::var(key).ok()?;
    parse_positive(&raw)
}

fn parse_positive(raw: &str) -> Option<usize> {
    let value = raw.trim().parse::<usize>().ok()?;
    (value > 0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_positive_rejects_invalid_values() {
        assert_eq!(parse_positive("0"), None);
        assert_eq!(parse_positive("-1"), None);
        assert_eq!(parse_positive("abc"), None);
    }

    #[test]
    fn parse_positive_accepts_positive_values() {
        assert_eq!(parse_positive("8"), Some(8));
        assert_eq!(parse_positive(" 4 "), Some(4));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = BrokerConfig::new()
            .with_pool_size(2)
            .with_max_pending(10)
            .with_grace_timeout(Duration::from_millis(50));

        assert_eq!(config.pool_size, 2);
        assert_eq!(config.max_pending, 10);
        assert_eq!(config.grace_timeout, Duration::from_millis(50));
        assert_eq!(config.default_timeout, DEFAULT_REQUEST_TIMEOUT);
    }
}

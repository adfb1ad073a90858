//! Page source settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Settings for [`crate::source::HttpSource`]. Every field has a default, so
/// `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Global per-request timeout
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Fallback endpoint tried with `?u=<url>` when a direct fetch fails
    pub proxy_url: Option<String>,
    /// Politeness delay after each network fetch is drawn from
    /// `[min_delay_secs, max_delay_secs]`
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
    /// How long fetched pages are served from the cache
    pub cache_ttl_secs: u64,
    /// Seed for the delay generator; entropy when absent
    pub seed: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy_url: None,
            min_delay_secs: 0.0,
            max_delay_secs: 0.0,
            cache_ttl_secs: 300,
            seed: None,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Delay bounds, ordered and clamped to non-negative values
    pub fn delay_range(&self) -> (f64, f64) {
        let min = self.min_delay_secs.max(0.0);
        let max = self.max_delay_secs.max(0.0);
        if min <= max {
            (min, max)
        } else {
            (max, min)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: SourceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SourceConfig::default());
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_json() {
        let config: SourceConfig =
            serde_json::from_str(r#"{"proxy_url": "http://proxy.local/fetch", "max_delay_secs": 2.5}"#)
                .unwrap();
        assert_eq!(config.proxy_url.as_deref(), Some("http://proxy.local/fetch"));
        assert_eq!(config.delay_range(), (0.0, 2.5));
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_delay_range_is_ordered() {
        let config = SourceConfig {
            min_delay_secs: 3.0,
            max_delay_secs: 1.0,
            ..SourceConfig::default()
        };
        assert_eq!(config.delay_range(), (1.0, 3.0));
    }
}

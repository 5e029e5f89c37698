/// Configuration management for the Umber client
use crate::error::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub views: ViewConfig,
    pub logging: LoggingConfig,
}

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the shortening API
    pub base_url: String,
    /// Base used to build `<base>/s/<key>` short links
    pub short_link_base: String,
    pub user_agent: String,
}

/// Persistent store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageConfig {
    Disk { path: PathBuf },
    Memory,
}

/// View-model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Maximum number of rows in the compact table
    pub compact_limit: usize,
    /// How long a shared collection fetch may be reused by non-forced loads
    pub cache_ttl_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let base_url = "https://shorter-umber.vercel.app".to_string();
        Self {
            api: ApiConfig {
                short_link_base: base_url.clone(),
                base_url,
                user_agent: format!("umber-client/{}", env!("CARGO_PKG_VERSION")),
            },
            storage: StorageConfig::Disk {
                path: PathBuf::from("./data/umber-state.json"),
            },
            views: ViewConfig {
                compact_limit: 5,
                cache_ttl_secs: 5,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ClientResult<Self> {
        dotenv::dotenv().ok();

        let defaults = ClientConfig::default();

        let base_url = env::var("UMBER_API_BASE_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api.base_url);
        let short_link_base = env::var("UMBER_SHORT_LINK_BASE")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| base_url.clone());
        let user_agent = env::var("UMBER_USER_AGENT").unwrap_or(defaults.api.user_agent);

        let storage = match env::var("UMBER_STORAGE")
            .unwrap_or_else(|_| "disk".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageConfig::Memory,
            "disk" => StorageConfig::Disk {
                path: env::var("UMBER_STATE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./data/umber-state.json")),
            },
            other => {
                return Err(ClientError::Config(format!(
                    "Unknown storage backend: {}",
                    other
                )))
            }
        };

        let compact_limit = env::var("UMBER_COMPACT_LIMIT")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .map_err(|_| ClientError::Config("Invalid compact limit".to_string()))?;
        let cache_ttl_secs = env::var("UMBER_CACHE_TTL_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        let log_level = env::var("UMBER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_json = env::var("UMBER_LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ClientConfig {
            api: ApiConfig {
                base_url,
                short_link_base,
                user_agent,
            },
            storage,
            views: ViewConfig {
                compact_limit,
                cache_ttl_secs,
            },
            logging: LoggingConfig {
                level: log_level,
                json: log_json,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ClientResult<()> {
        for (name, value) in [
            ("API base URL", &self.api.base_url),
            ("short link base", &self.api.short_link_base),
        ] {
            let url = reqwest::Url::parse(value)
                .map_err(|e| ClientError::Config(format!("Invalid {}: {}", name, e)))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ClientError::Config(format!(
                    "{} must use http or https",
                    name
                )));
            }
        }

        if self.views.compact_limit == 0 {
            return Err(ClientError::Config(
                "Compact limit must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Shared cache reuse window
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.views.cache_ttl_secs)
    }

    /// Configuration suitable for tests: in-memory store, local API
    #[cfg(any(test, feature = "testing"))]
    pub fn for_tests(base_url: &str) -> Self {
        let mut config = ClientConfig::default();
        config.api.base_url = base_url.trim_end_matches('/').to_string();
        config.api.short_link_base = config.api.base_url.clone();
        config.storage = StorageConfig::Memory;
        config
    }
}

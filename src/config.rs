//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Backend selector
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// In-process backend (offline use and tests)
    #[default]
    Memory,
    /// Appwrite-compatible REST backend
    Http,
}

/// Backend-as-a-service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub mode: BackendMode,
    /// API endpoint (e.g., "https://cloud.appwrite.io/v1")
    pub endpoint: String,
    /// Project identifier sent with every request
    pub project_id: String,
    pub database_id: String,
    pub user_collection_id: String,
    pub post_collection_id: String,
    pub saves_collection_id: String,
    /// Storage bucket for post media and avatars
    pub storage_id: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Query cache and listing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Age after which a successful entry is refetched (None: until invalidated)
    pub stale_time_seconds: Option<u64>,
    /// Infinite feed page size (default: 9)
    pub page_size: usize,
    /// Recent posts limit (default: 20)
    pub recent_posts_limit: usize,
    /// Users listing limit (default: 10)
    pub users_limit: usize,
    /// Number of featured posts sampled from the feed (default: 2)
    pub featured_count: usize,
}

impl CacheConfig {
    pub fn stale_time(&self) -> Option<Duration> {
        self.stale_time_seconds.map(Duration::from_secs)
    }
}

/// Session configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SessionConfig {
    /// File holding the "session probably exists" flag (None: in memory)
    pub hint_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                mode: BackendMode::Memory,
                endpoint: "http://localhost/v1".to_string(),
                project_id: "snapgram".to_string(),
                database_id: "main".to_string(),
                user_collection_id: "users".to_string(),
                post_collection_id: "posts".to_string(),
                saves_collection_id: "saves".to_string(),
                storage_id: "media".to_string(),
                timeout_seconds: 30,
            },
            cache: CacheConfig {
                stale_time_seconds: None,
                page_size: 9,
                recent_posts_limit: 20,
                users_limit: 10,
                featured_count: 2,
            },
            session: SessionConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (SNAPGRAM__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("backend.mode", "memory")?
            .set_default("backend.endpoint", "http://localhost/v1")?
            .set_default("backend.project_id", "snapgram")?
            .set_default("backend.database_id", "main")?
            .set_default("backend.user_collection_id", "users")?
            .set_default("backend.post_collection_id", "posts")?
            .set_default("backend.saves_collection_id", "saves")?
            .set_default("backend.storage_id", "media")?
            .set_default("backend.timeout_seconds", 30)?
            .set_default("cache.page_size", 9)?
            .set_default("cache.recent_posts_limit", 20)?
            .set_default("cache.users_limit", 10)?
            .set_default("cache.featured_count", 2)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("SNAPGRAM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.cache.page_size == 0 {
            return Err(crate::error::AppError::Config(
                "cache.page_size must be greater than 0".to_string(),
            ));
        }

        if self.backend.timeout_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "backend.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.backend.mode == BackendMode::Http {
            let endpoint = url::Url::parse(&self.backend.endpoint).map_err(|e| {
                crate::error::AppError::Config(format!("backend.endpoint is not a valid URL: {e}"))
            })?;
            if !matches!(endpoint.scheme(), "http" | "https") {
                return Err(crate::error::AppError::Config(
                    "backend.endpoint must use http or https".to_string(),
                ));
            }
            if self.backend.project_id.trim().is_empty() {
                return Err(crate::error::AppError::Config(
                    "backend.project_id is required when backend.mode=http".to_string(),
                ));
            }
            if endpoint.scheme() == "http" {
                tracing::warn!(
                    endpoint = %self.backend.endpoint,
                    "Backend endpoint is not using TLS"
                );
            }
        }

        Ok(())
    }
}

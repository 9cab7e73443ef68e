//! API Configuration Module
//!
//! Server, search engine, cache and sync worker settings. Everything is
//! loaded from `VITRINE_*` environment variables with defaults taken from
//! [`crate::constants`]. The database settings live with the pool in
//! [`crate::db::DbConfig`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vitrine_core::{ConfigError, RetryConfig};
use vitrine_search::{ElasticsearchConfig, DEFAULT_INDEX};
use vitrine_storage::CacheConfig;
use vitrine_sync::{SyncWorkerConfig, DEFAULT_QUEUE_CAPACITY};

use crate::constants::*;
use crate::db::DbConfig;

/// Parse an environment variable, falling back to `default` when it is
/// unset or unparsable.
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

// ============================================================================
// SERVER CONFIGURATION
// ============================================================================

/// HTTP server and CORS settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind host (default: 0.0.0.0)
    pub bind: String,
    /// Listen port (default: 3000)
    pub port: u16,
    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,
    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,
    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_API_BIND.to_string(),
            port: DEFAULT_API_PORT,
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
        }
    }
}

impl ApiConfig {
    /// Environment variables:
    /// - `VITRINE_API_BIND`: bind host (default: 0.0.0.0)
    /// - `VITRINE_API_PORT` or `PORT`: listen port (default: 3000)
    /// - `VITRINE_CORS_ORIGINS`: comma-separated allowed origins (empty = allow all)
    /// - `VITRINE_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `VITRINE_CORS_MAX_AGE_SECS`: preflight cache duration (default: 86400)
    pub fn from_env() -> Self {
        let cors_origins = std::env::var("VITRINE_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| env_parse("VITRINE_API_PORT", DEFAULT_API_PORT));

        Self {
            bind: std::env::var("VITRINE_API_BIND").unwrap_or_else(|_| DEFAULT_API_BIND.to_string()),
            port,
            cors_origins,
            cors_allow_credentials: env_flag("VITRINE_CORS_ALLOW_CREDENTIALS", false),
            cors_max_age_secs: env_parse("VITRINE_CORS_MAX_AGE_SECS", DEFAULT_CORS_MAX_AGE_SECS),
        }
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.bind, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "VITRINE_API_BIND".to_string(),
                value: addr.clone(),
                reason: e.to_string(),
            })
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // *.example.com matches any https subdomain
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain.ends_with(&format!(".{}", pattern));
                }
            }
            false
        })
    }
}

// ============================================================================
// SEARCH ENGINE CONFIGURATION
// ============================================================================

/// Elasticsearch connection settings.
#[derive(Clone)]
pub struct SearchSettings {
    pub url: String,
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for SearchSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchSettings")
            .field("url", &self.url)
            .field("index", &self.index)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_SEARCH_URL.to_string(),
            index: DEFAULT_INDEX.to_string(),
            username: None,
            password: None,
            timeout: Duration::from_millis(DEFAULT_SEARCH_TIMEOUT_MS),
        }
    }
}

impl SearchSettings {
    /// Environment variables:
    /// - `VITRINE_SEARCH_URL` (default: http://localhost:9200)
    /// - `VITRINE_SEARCH_INDEX` (default: products)
    /// - `VITRINE_SEARCH_USERNAME`, `VITRINE_SEARCH_PASSWORD`: basic auth
    /// - `VITRINE_SEARCH_TIMEOUT_MS` (default: 5000)
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("VITRINE_SEARCH_URL").unwrap_or_else(|_| DEFAULT_SEARCH_URL.to_string()),
            index: std::env::var("VITRINE_SEARCH_INDEX").unwrap_or_else(|_| DEFAULT_INDEX.to_string()),
            username: std::env::var("VITRINE_SEARCH_USERNAME").ok().filter(|s| !s.is_empty()),
            password: std::env::var("VITRINE_SEARCH_PASSWORD").ok(),
            timeout: Duration::from_millis(env_parse(
                "VITRINE_SEARCH_TIMEOUT_MS",
                DEFAULT_SEARCH_TIMEOUT_MS,
            )),
        }
    }

    pub fn client_config(&self) -> ElasticsearchConfig {
        let config = ElasticsearchConfig::new(self.url.clone())
            .with_index(self.index.clone())
            .with_timeout(self.timeout);
        match &self.username {
            Some(username) => config.with_credentials(
                username.clone(),
                self.password.clone().unwrap_or_default(),
            ),
            None => config,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "VITRINE_SEARCH_URL".to_string(),
                value: self.url.clone(),
                reason: "must be an http(s) URL".to_string(),
            });
        }
        if self.index.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "VITRINE_SEARCH_INDEX".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "VITRINE_SEARCH_TIMEOUT_MS".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// CACHE CONFIGURATION
// ============================================================================

/// Which cache store backs the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Lmdb,
}

impl FromStr for CacheBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "lmdb" => Ok(CacheBackend::Lmdb),
            other => Err(ConfigError::InvalidValue {
                field: "VITRINE_CACHE_BACKEND".to_string(),
                value: other.to_string(),
                reason: "expected memory or lmdb".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub path: PathBuf,
    pub max_size_mb: usize,
    pub enabled: bool,
    pub record_ttl: Duration,
    pub search_ttl: Duration,
    pub max_cached_page: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            path: PathBuf::from(DEFAULT_CACHE_PATH),
            max_size_mb: DEFAULT_CACHE_MAX_SIZE_MB,
            enabled: true,
            record_ttl: Duration::from_secs(DEFAULT_CACHE_RECORD_TTL_SECS),
            search_ttl: Duration::from_secs(DEFAULT_CACHE_SEARCH_TTL_SECS),
            max_cached_page: DEFAULT_CACHE_MAX_PAGE,
        }
    }
}

impl CacheSettings {
    /// Environment variables:
    /// - `VITRINE_CACHE_BACKEND`: memory | lmdb (default: memory)
    /// - `VITRINE_CACHE_PATH`, `VITRINE_CACHE_MAX_SIZE_MB`: LMDB environment
    /// - `VITRINE_CACHE_ENABLED` (default: true)
    /// - `VITRINE_CACHE_RECORD_TTL_SECS`, `VITRINE_CACHE_SEARCH_TTL_SECS` (default: 120)
    /// - `VITRINE_CACHE_MAX_PAGE` (default: 50)
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match std::env::var("VITRINE_CACHE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => CacheBackend::Memory,
        };
        Ok(Self {
            backend,
            path: std::env::var("VITRINE_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_PATH)),
            max_size_mb: env_parse("VITRINE_CACHE_MAX_SIZE_MB", DEFAULT_CACHE_MAX_SIZE_MB),
            enabled: env_flag("VITRINE_CACHE_ENABLED", true),
            record_ttl: Duration::from_secs(env_parse(
                "VITRINE_CACHE_RECORD_TTL_SECS",
                DEFAULT_CACHE_RECORD_TTL_SECS,
            )),
            search_ttl: Duration::from_secs(env_parse(
                "VITRINE_CACHE_SEARCH_TTL_SECS",
                DEFAULT_CACHE_SEARCH_TTL_SECS,
            )),
            max_cached_page: env_parse("VITRINE_CACHE_MAX_PAGE", DEFAULT_CACHE_MAX_PAGE),
        })
    }

    pub fn coordinator_config(&self) -> CacheConfig {
        CacheConfig::default()
            .with_enabled(self.enabled)
            .with_record_ttl(self.record_ttl)
            .with_search_ttl(self.search_ttl)
            .with_max_cached_page(self.max_cached_page)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == CacheBackend::Lmdb && self.max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "VITRINE_CACHE_MAX_SIZE_MB".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        self.coordinator_config().validate()
    }
}

// ============================================================================
// SYNC WORKER CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub workers: usize,
    pub max_attempts: u32,
    pub poll_interval: Duration,
    pub queue_capacity: usize,
    pub report_interval: Duration,
    /// Visibility timeout of a reserved task.
    pub lease: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_SYNC_WORKERS,
            max_attempts: DEFAULT_SYNC_MAX_ATTEMPTS,
            poll_interval: Duration::from_millis(DEFAULT_SYNC_POLL_INTERVAL_MS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            report_interval: Duration::from_secs(DEFAULT_SYNC_REPORT_INTERVAL_SECS),
            lease: Duration::from_secs(DEFAULT_SYNC_LEASE_SECS),
        }
    }
}

impl SyncSettings {
    /// Environment variables:
    /// - `VITRINE_SYNC_WORKERS` (default: 2)
    /// - `VITRINE_SYNC_MAX_ATTEMPTS` (default: 5)
    /// - `VITRINE_SYNC_POLL_INTERVAL_MS` (default: 500)
    /// - `VITRINE_SYNC_QUEUE_CAPACITY` (default: 10000)
    /// - `VITRINE_SYNC_REPORT_INTERVAL_SECS` (default: 30)
    /// - `VITRINE_SYNC_LEASE_SECS` (default: 300)
    pub fn from_env() -> Self {
        Self {
            workers: env_parse("VITRINE_SYNC_WORKERS", DEFAULT_SYNC_WORKERS),
            max_attempts: env_parse("VITRINE_SYNC_MAX_ATTEMPTS", DEFAULT_SYNC_MAX_ATTEMPTS),
            poll_interval: Duration::from_millis(env_parse(
                "VITRINE_SYNC_POLL_INTERVAL_MS",
                DEFAULT_SYNC_POLL_INTERVAL_MS,
            )),
            queue_capacity: env_parse("VITRINE_SYNC_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY),
            report_interval: Duration::from_secs(env_parse(
                "VITRINE_SYNC_REPORT_INTERVAL_SECS",
                DEFAULT_SYNC_REPORT_INTERVAL_SECS,
            )),
            lease: Duration::from_secs(env_parse(
                "VITRINE_SYNC_LEASE_SECS",
                DEFAULT_SYNC_LEASE_SECS,
            )),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default().with_max_attempts(self.max_attempts)
    }

    pub fn worker_config(&self) -> SyncWorkerConfig {
        SyncWorkerConfig::default()
            .with_workers(self.workers)
            .with_retry(self.retry_config())
            .with_poll_interval(self.poll_interval)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "VITRINE_SYNC_WORKERS".to_string(),
                value: "0".to_string(),
                reason: "at least one worker is required".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "VITRINE_SYNC_QUEUE_CAPACITY".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.lease.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "VITRINE_SYNC_LEASE_SECS".to_string(),
                value: "0".to_string(),
                reason: "a lease must outlive one index write".to_string(),
            });
        }
        self.retry_config().validate()
    }
}

// ============================================================================
// AGGREGATE
// ============================================================================

/// Every setting the server binary needs.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub db: DbConfig,
    pub search: SearchSettings,
    pub cache: CacheSettings,
    pub sync: SyncSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api: ApiConfig::from_env(),
            db: DbConfig::from_env(),
            search: SearchSettings::from_env(),
            cache: CacheSettings::from_env()?,
            sync: SyncSettings::from_env(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api.bind_addr()?;
        self.search.validate()?;
        self.cache.validate()?;
        self.sync.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.api.port, 3000);
        assert_eq!(config.cache.max_cached_page, 50);
        assert_eq!(config.cache.record_ttl, Duration::from_secs(120));
        assert_eq!(config.search.index, "products");
    }

    #[test]
    fn test_cache_settings_from_env() -> Result<(), ConfigError> {
        let _backend = EnvVarGuard::set("VITRINE_CACHE_BACKEND", Some("LMDB"));
        let _ttl = EnvVarGuard::set("VITRINE_CACHE_SEARCH_TTL_SECS", Some("30"));
        let _page = EnvVarGuard::set("VITRINE_CACHE_MAX_PAGE", Some("not-a-number"));

        let settings = CacheSettings::from_env()?;
        assert_eq!(settings.backend, CacheBackend::Lmdb);
        assert_eq!(settings.search_ttl, Duration::from_secs(30));
        assert_eq!(settings.max_cached_page, DEFAULT_CACHE_MAX_PAGE);

        let config = settings.coordinator_config();
        assert_eq!(config.search_ttl, Duration::from_secs(30));
        Ok(())
    }

    #[test]
    fn test_unknown_cache_backend_rejected() {
        assert!("redis".parse::<CacheBackend>().is_err());
        assert_eq!("memory".parse::<CacheBackend>().ok(), Some(CacheBackend::Memory));
    }

    #[test]
    fn test_sync_settings_validation() {
        let mut settings = SyncSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.worker_config().retry.max_attempts, 5);

        settings.workers = 0;
        assert!(settings.validate().is_err());

        let zero_lease = SyncSettings {
            lease: Duration::ZERO,
            ..SyncSettings::default()
        };
        assert!(zero_lease.validate().is_err());
    }

    #[test]
    fn test_search_settings_redact_password() {
        let settings = SearchSettings {
            username: Some("elastic".to_string()),
            password: Some("hunter2".to_string()),
            ..SearchSettings::default()
        };
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));

        let bad = SearchSettings {
            url: "localhost:9200".to_string(),
            ..SearchSettings::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_bind_addr() {
        let config = ApiConfig {
            bind: "127.0.0.1".to_string(),
            port: 8080,
            ..ApiConfig::default()
        };
        assert_eq!(config.bind_addr().map(|a| a.port()).ok(), Some(8080));

        let bad = ApiConfig {
            bind: "not a host".to_string(),
            ..ApiConfig::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_origin_allowed() {
        let mut config = ApiConfig::default();
        assert!(config.is_origin_allowed("https://anything.com"));

        config.cors_origins = vec![
            "https://shop.example.com".to_string(),
            "*.example.org".to_string(),
        ];
        assert!(config.is_origin_allowed("https://shop.example.com"));
        assert!(config.is_origin_allowed("https://admin.example.org"));
        assert!(!config.is_origin_allowed("https://evil.com"));
        assert!(!config.is_origin_allowed("https://notexample.org"));
    }
}

//! Constants for the Vitrine API
//!
//! Defaults for every environment-driven setting live here so they can be
//! found and tested in one place.

// ============================================================================
// SERVER
// ============================================================================

/// Default bind address
pub const DEFAULT_API_BIND: &str = "0.0.0.0";

/// Default HTTP port
pub const DEFAULT_API_PORT: u16 = 3000;

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

/// Response header carrying lifecycle handler failures of a mutation
pub const PROPAGATION_WARNING_HEADER: &str = "x-vitrine-propagation-warning";

// ============================================================================
// DATABASE
// ============================================================================

pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_NAME: &str = "vitrine";
pub const DEFAULT_DB_USER: &str = "postgres";

/// Maximum pooled connections
pub const DEFAULT_DB_POOL_SIZE: usize = 16;

/// Connection wait timeout in seconds
pub const DEFAULT_DB_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// SEARCH ENGINE
// ============================================================================

pub const DEFAULT_SEARCH_URL: &str = "http://localhost:9200";

/// Per-request timeout for search engine calls
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 5000;

// ============================================================================
// CACHE
// ============================================================================

/// TTL of single-record entries
pub const DEFAULT_CACHE_RECORD_TTL_SECS: u64 = 120;

/// TTL of search result pages
pub const DEFAULT_CACHE_SEARCH_TTL_SECS: u64 = 120;

/// Search pages beyond this number bypass the cache
pub const DEFAULT_CACHE_MAX_PAGE: u32 = 50;

/// Directory of the LMDB cache environment
pub const DEFAULT_CACHE_PATH: &str = "./data/cache";

/// LMDB map size in megabytes
pub const DEFAULT_CACHE_MAX_SIZE_MB: usize = 256;

// ============================================================================
// SYNC WORKERS
// ============================================================================

pub const DEFAULT_SYNC_WORKERS: usize = 2;

/// Attempts per task before it is parked
pub const DEFAULT_SYNC_MAX_ATTEMPTS: u32 = 5;

pub const DEFAULT_SYNC_POLL_INTERVAL_MS: u64 = 500;

/// How often the sync job logs queue depth and refreshes gauges
pub const DEFAULT_SYNC_REPORT_INTERVAL_SECS: u64 = 30;

/// Seconds a reserved task stays leased before another worker may take it
pub const DEFAULT_SYNC_LEASE_SECS: u64 = 300;

// ============================================================================
// PAGINATION
// ============================================================================

/// Default page size of record listings
pub const DEFAULT_LIST_PER_PAGE: u32 = 15;

/// Maximum page size of record listings
pub const MAX_LIST_PER_PAGE: u32 = 100;

// ============================================================================
// RECORD FIELD LIMITS
// ============================================================================

pub const MAX_SKU_LEN: usize = 64;
pub const MIN_NAME_LEN: usize = 3;
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_CATEGORY_LEN: usize = 100;

// ============================================================================
// LOGGING
// ============================================================================

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "vitrine_api=debug,tower_http=info,info";

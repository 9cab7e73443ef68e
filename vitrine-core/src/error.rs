//! Error types for Vitrine operations

use crate::record::RecordId;
use std::time::Duration;
use thiserror::Error;

/// Record store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Record not found: {id}")]
    NotFound { id: RecordId },

    #[error("SKU already in use: {sku}")]
    DuplicateSku { sku: String },

    #[error("Record {id} cannot be {action}: {reason}")]
    InvalidState {
        id: RecordId,
        action: String,
        reason: String,
    },

    #[error("Record store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Search index errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("Index {index} does not exist")]
    IndexMissing { index: String },

    #[error("Index {index} already exists")]
    AlreadyExists { index: String },

    #[error("Search engine unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Search engine rejected {operation} with status {status}: {reason}")]
    Rejected {
        operation: String,
        status: u16,
        reason: String,
    },

    #[error("Malformed search engine response: {reason}")]
    MalformedResponse { reason: String },
}

/// Propagation queue errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Propagation queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("Propagation queue is closed")]
    Closed,

    #[error("Propagation queue unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Unknown delivery: {handle}")]
    UnknownDelivery { handle: String },
}

/// Cache store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend failure: {reason}")]
    Backend { reason: String },

    #[error("Cache serialization failure: {reason}")]
    Serialization { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Constraint violation on {constraint}: {reason}")]
    ConstraintViolation { constraint: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Coarse classification used by retry logic and the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Record or document absent.
    NotFound,
    /// Malformed input, rejected before reaching the core.
    Validation,
    /// Temporarily unreachable infrastructure; retry with backoff.
    Transient,
    /// Will not succeed on retry.
    Permanent,
    /// Operation conflicts with existing state.
    Conflict,
}

/// Master error type for all Vitrine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VitrineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl VitrineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            VitrineError::Storage(e) => match e {
                StorageError::NotFound { .. } => FailureKind::NotFound,
                StorageError::DuplicateSku { .. } | StorageError::InvalidState { .. } => {
                    FailureKind::Conflict
                }
                StorageError::Unavailable { .. } => FailureKind::Transient,
                StorageError::LockPoisoned => FailureKind::Permanent,
            },
            VitrineError::Index(e) => match e {
                IndexError::IndexMissing { .. } => FailureKind::NotFound,
                IndexError::AlreadyExists { .. } => FailureKind::Conflict,
                IndexError::Unavailable { .. } | IndexError::Timeout { .. } => {
                    FailureKind::Transient
                }
                IndexError::Rejected { status, .. } if *status == 429 || *status >= 500 => {
                    FailureKind::Transient
                }
                IndexError::Rejected { .. } | IndexError::MalformedResponse { .. } => {
                    FailureKind::Permanent
                }
            },
            VitrineError::Queue(e) => match e {
                QueueError::Full { .. } | QueueError::Unavailable { .. } => FailureKind::Transient,
                QueueError::Closed | QueueError::UnknownDelivery { .. } => FailureKind::Permanent,
            },
            VitrineError::Cache(e) => match e {
                CacheError::Backend { .. } => FailureKind::Transient,
                CacheError::Serialization { .. } => FailureKind::Permanent,
            },
            VitrineError::Validation(_) => FailureKind::Validation,
            VitrineError::Config(_) => FailureKind::Permanent,
        }
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::Transient
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, VitrineError::Index(IndexError::Timeout { .. }))
    }
}

/// Result type alias for Vitrine operations.
pub type VitrineResult<T> = Result<T, VitrineError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            id: RecordId::new(12),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Record not found"));
        assert!(msg.contains("12"));
    }

    #[test]
    fn test_index_timeout_display() {
        let err = IndexError::Timeout {
            operation: "search".to_string(),
            after: Duration::from_millis(250),
        };
        assert_eq!(format!("{}", err), "search timed out after 250ms");
    }

    #[test]
    fn test_master_error_wraps_layers() {
        let err: VitrineError = QueueError::Closed.into();
        assert!(format!("{}", err).starts_with("Queue error:"));
        let err: VitrineError = ValidationError::RequiredFieldMissing {
            field: "sku".to_string(),
        }
        .into();
        assert!(format!("{}", err).contains("sku"));
    }

    #[test]
    fn test_failure_kinds() {
        let not_found: VitrineError = StorageError::NotFound {
            id: RecordId::new(1),
        }
        .into();
        assert_eq!(not_found.kind(), FailureKind::NotFound);

        let conflict: VitrineError = IndexError::AlreadyExists {
            index: "products".to_string(),
        }
        .into();
        assert_eq!(conflict.kind(), FailureKind::Conflict);

        let timeout: VitrineError = IndexError::Timeout {
            operation: "search".to_string(),
            after: Duration::from_secs(1),
        }
        .into();
        assert!(timeout.is_retryable());
        assert!(timeout.is_timeout());

        let overloaded: VitrineError = IndexError::Rejected {
            operation: "upsert".to_string(),
            status: 503,
            reason: "busy".to_string(),
        }
        .into();
        assert!(overloaded.is_retryable());

        let malformed: VitrineError = IndexError::Rejected {
            operation: "upsert".to_string(),
            status: 400,
            reason: "mapper_parsing_exception".to_string(),
        }
        .into();
        assert_eq!(malformed.kind(), FailureKind::Permanent);
        assert!(!malformed.is_retryable());

        let full: VitrineError = QueueError::Full { capacity: 8 }.into();
        assert!(full.is_retryable());

        let closed: VitrineError = QueueError::Closed.into();
        assert_eq!(closed.kind(), FailureKind::Permanent);
    }
}

//! Error types for feed store operations

use thiserror::Error;

/// Errors delivered to store completions.
///
/// Every failure reaches exactly one completion as exactly one of these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The persistence port could not produce a usable handle.
    #[error("Failed to open persistence handle: {reason}")]
    Handle { reason: String },

    /// A transaction failed to commit; its writes were rolled back.
    #[error("Transaction failed: {reason}")]
    Transaction { reason: String },

    /// A persisted record could not be converted back to its domain form.
    #[error("Corrupted {field} in persisted record ({value}): {reason}")]
    Mapping {
        field: String,
        value: String,
        reason: String,
    },

    /// The worker context could not run the operation to completion.
    #[error("Store worker failed: {reason}")]
    Worker { reason: String },
}

impl StoreError {
    pub fn handle(reason: impl Into<String>) -> Self {
        StoreError::Handle {
            reason: reason.into(),
        }
    }

    pub fn transaction(reason: impl Into<String>) -> Self {
        StoreError::Transaction {
            reason: reason.into(),
        }
    }

    pub fn mapping(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        StoreError::Mapping {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn worker(reason: impl Into<String>) -> Self {
        StoreError::Worker {
            reason: reason.into(),
        }
    }

    pub fn is_handle(&self) -> bool {
        matches!(self, StoreError::Handle { .. })
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self, StoreError::Transaction { .. })
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, StoreError::Mapping { .. })
    }
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

    #[error("Tracing subscriber could not be installed: {reason}")]
    SubscriberInstall { reason: String },
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// TESTS
// =============================================================================

//! Core error type for metastore operations

use thiserror::Error;

use super::classifier::{BackendError, ErrorCategory};
use crate::types::Zone;

/// Error type for every operation of the connector layer
#[derive(Error, Debug)]
pub enum MetastoreError {
    // Backend failures, classified at the session boundary
    #[error("Storage error ({category}) during {operation}: {source}")]
    Storage {
        category: ErrorCategory,
        operation: String,
        #[source]
        source: BackendError,
    },

    // Connection errors
    #[error("Connection error for {zone} zone: {message}")]
    Connection { zone: Zone, message: String },

    #[error("No route to {zone} zone: router has no entry for it")]
    UnroutableZone { zone: Zone },

    // Transaction misuse
    #[error("Can not start a transaction inside another transaction")]
    TransactionAlreadyActive,

    #[error("There is no active transaction")]
    NoActiveTransaction,

    #[error("Session is closed")]
    SessionClosed,

    // Configuration errors
    #[error("Configuration error in {component}: {message}")]
    ConfigurationError { component: String, message: String },

    // Administrative operations
    #[error("Formatting storage failed after {attempts} attempts: {message}")]
    FormatFailed { attempts: u32, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

pub type Result<T> = std::result::Result<T, MetastoreError>;
pub type MetastoreResult<T> = std::result::Result<T, MetastoreError>;

impl MetastoreError {
    /// Category of a classified backend failure, `None` for everything else
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            MetastoreError::Storage { category, .. } => Some(*category),
            _ => None,
        }
    }

    /// Whether the whole operation may be retried after a backoff
    pub fn is_retryable(&self) -> bool {
        self.category().map(|c| c.is_retryable()).unwrap_or(false)
    }

    /// No usable connector for a zone, or the zone's cluster is down
    pub fn is_connection_error(&self) -> bool {
        match self {
            MetastoreError::Connection { .. } => true,
            MetastoreError::Storage { category, .. } => category.is_cluster_failure(),
            _ => false,
        }
    }

    /// Semantic conflict the caller has to handle
    pub fn is_domain_error(&self) -> bool {
        self.category()
            .map(|c| c.is_domain_conflict())
            .unwrap_or(false)
    }
}

//! Classification of raw backend failures
//!
//! The store reports failures as a `(classification, code)` pair. The table
//! below maps those pairs onto [`ErrorCategory`]:
//!
//! | classification / code                         | category                    |
//! |-----------------------------------------------|-----------------------------|
//! | classification 7, 8, 9, 10, 15, 18            | `Transient`                 |
//! | code 630 (tuple already exists)               | `DuplicateKey`              |
//! | code 255 (foreign key violation)              | `ForeignKeyViolation`       |
//! | code 893 (unique key violation)               | `UniqueConstraintViolation` |
//! | code 4009 (cluster failure)                   | `ClusterFailure`            |
//! | anything else, or no datastore fields at all  | `Unknown`                   |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Temporary resource error
pub const CLASSIFICATION_TEMPORARY_RESOURCE: i32 = 7;
/// Node recovery in progress
pub const CLASSIFICATION_NODE_RECOVERY: i32 = 8;
/// Overload
pub const CLASSIFICATION_OVERLOAD: i32 = 9;
/// Timeout expired
pub const CLASSIFICATION_TIMEOUT_EXPIRED: i32 = 10;
/// Node shutdown
pub const CLASSIFICATION_NODE_SHUTDOWN: i32 = 15;
/// Internal temporary
pub const CLASSIFICATION_INTERNAL_TEMPORARY: i32 = 18;

/// Classifications the store documents as temporary conditions
pub const TRANSIENT_CLASSIFICATIONS: [i32; 6] = [
    CLASSIFICATION_TEMPORARY_RESOURCE,
    CLASSIFICATION_NODE_RECOVERY,
    CLASSIFICATION_OVERLOAD,
    CLASSIFICATION_TIMEOUT_EXPIRED,
    CLASSIFICATION_NODE_SHUTDOWN,
    CLASSIFICATION_INTERNAL_TEMPORARY,
];

pub const CODE_TUPLE_ALREADY_EXISTS: i32 = 630;
pub const CODE_FOREIGN_KEY_VIOLATION: i32 = 255;
pub const CODE_UNIQUE_KEY_VIOLATION: i32 = 893;
pub const CODE_CLUSTER_FAILURE: i32 = 4009;

/// Typed category of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Temporary backend condition; the whole operation may be retried
    Transient,
    /// Insert of a row that already exists
    DuplicateKey,
    /// Referential integrity violation
    ForeignKeyViolation,
    /// Unique index violation
    UniqueConstraintViolation,
    /// The zone's backend cluster is unreachable
    ClusterFailure,
    /// Anything the classifier does not recognise
    Unknown,
}

impl ErrorCategory {
    /// Only transient failures are safe to retry automatically
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Transient)
    }

    /// Semantic conflicts that must be surfaced to the caller as-is
    pub fn is_domain_conflict(&self) -> bool {
        matches!(
            self,
            ErrorCategory::DuplicateKey
                | ErrorCategory::ForeignKeyViolation
                | ErrorCategory::UniqueConstraintViolation
        )
    }

    /// Failures that mean the zone itself is down
    pub fn is_cluster_failure(&self) -> bool {
        matches!(self, ErrorCategory::ClusterFailure)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::DuplicateKey => "duplicate key",
            ErrorCategory::ForeignKeyViolation => "foreign key violation",
            ErrorCategory::UniqueConstraintViolation => "unique constraint violation",
            ErrorCategory::ClusterFailure => "cluster failure",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Datastore-specific fields attached to a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatastoreCode {
    pub classification: i32,
    pub code: i32,
}

/// Raw failure reported by the native store client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}{}", datastore_suffix(.datastore))]
pub struct BackendError {
    message: String,
    datastore: Option<DatastoreCode>,
}

impl BackendError {
    /// Failure carrying datastore classification fields
    pub fn datastore(classification: i32, code: i32, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            datastore: Some(DatastoreCode {
                classification,
                code,
            }),
        }
    }

    /// Failure raised by the client itself, without datastore fields
    pub fn client(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            datastore: None,
        }
    }

    /// Shorthand for the store's "cluster failure" signal
    pub fn cluster_failure(message: impl Into<String>) -> Self {
        Self::datastore(0, CODE_CLUSTER_FAILURE, message)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn datastore_code(&self) -> Option<DatastoreCode> {
        self.datastore
    }
}

fn datastore_suffix(datastore: &Option<DatastoreCode>) -> String {
    match datastore {
        Some(ds) => format!(
            " (classification={}, code={})",
            ds.classification, ds.code
        ),
        None => String::new(),
    }
}

/// Stateless mapping from backend failures to [`ErrorCategory`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a `(classification, code)` pair
    pub fn classify(classification: i32, code: i32) -> ErrorCategory {
        if TRANSIENT_CLASSIFICATIONS.contains(&classification) {
            return ErrorCategory::Transient;
        }

        match code {
            CODE_TUPLE_ALREADY_EXISTS => ErrorCategory::DuplicateKey,
            CODE_FOREIGN_KEY_VIOLATION => ErrorCategory::ForeignKeyViolation,
            CODE_UNIQUE_KEY_VIOLATION => ErrorCategory::UniqueConstraintViolation,
            CODE_CLUSTER_FAILURE => ErrorCategory::ClusterFailure,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Classify a raw backend failure; errors without datastore fields are `Unknown`
    pub fn classify_error(error: &BackendError) -> ErrorCategory {
        match error.datastore_code() {
            Some(ds) => Self::classify(ds.classification, ds.code),
            None => ErrorCategory::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classifications() {
        for classification in TRANSIENT_CLASSIFICATIONS {
            assert_eq!(
                ErrorClassifier::classify(classification, 1234),
                ErrorCategory::Transient
            );
        }
    }

    #[test]
    fn test_code_table() {
        assert_eq!(ErrorClassifier::classify(0, 630), ErrorCategory::DuplicateKey);
        assert_eq!(ErrorClassifier::classify(0, 255), ErrorCategory::ForeignKeyViolation);
        assert_eq!(
            ErrorClassifier::classify(0, 893),
            ErrorCategory::UniqueConstraintViolation
        );
        assert_eq!(ErrorClassifier::classify(0, 4009), ErrorCategory::ClusterFailure);
        assert_eq!(ErrorClassifier::classify(0, 1), ErrorCategory::Unknown);
    }

    #[test]
    fn test_transient_classification_wins_over_code() {
        // A timeout carrying the duplicate-key code is still transient
        assert_eq!(
            ErrorClassifier::classify(CLASSIFICATION_TIMEOUT_EXPIRED, CODE_TUPLE_ALREADY_EXISTS),
            ErrorCategory::Transient
        );
    }

    #[test]
    fn test_client_errors_are_unknown() {
        let err = BackendError::client("driver exploded");
        assert_eq!(ErrorClassifier::classify_error(&err), ErrorCategory::Unknown);
        assert_eq!(err.to_string(), "driver exploded");
    }

    #[test]
    fn test_backend_error_display_and_source() {
        let err = BackendError::datastore(0, 4009, "cluster failure");
        assert_eq!(
            err.to_string(),
            "cluster failure (classification=0, code=4009)"
        );

        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn test_category_predicates() {
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(!ErrorCategory::Unknown.is_retryable());
        assert!(ErrorCategory::DuplicateKey.is_domain_conflict());
        assert!(!ErrorCategory::ClusterFailure.is_domain_conflict());
        assert!(ErrorCategory::ClusterFailure.is_cluster_failure());
    }
}

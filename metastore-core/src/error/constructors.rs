//! Constructor helpers for MetastoreError

use super::classifier::{BackendError, ErrorClassifier};
use super::types::MetastoreError;
use crate::types::Zone;

impl MetastoreError {
    /// Classify a raw backend failure raised while performing `operation`
    ///
    /// # Examples
    /// ```rust
    /// use metastore_core::error::{BackendError, ErrorCategory, MetastoreError};
    ///
    /// let err = MetastoreError::from_backend("commit", BackendError::datastore(0, 630, "exists"));
    /// assert_eq!(err.category(), Some(ErrorCategory::DuplicateKey));
    /// ```
    pub fn from_backend(operation: impl Into<String>, source: BackendError) -> Self {
        MetastoreError::Storage {
            category: ErrorClassifier::classify_error(&source),
            operation: operation.into(),
            source,
        }
    }

    /// Create a connection error for a zone
    pub fn connection(zone: Zone, message: impl Into<String>) -> Self {
        MetastoreError::Connection {
            zone,
            message: message.into(),
        }
    }

    /// Create a configuration error with component and message
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        MetastoreError::ConfigurationError {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        MetastoreError::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_from_backend_classifies() {
        let err = MetastoreError::from_backend("commit", BackendError::cluster_failure("down"));
        assert_eq!(err.category(), Some(ErrorCategory::ClusterFailure));
        assert!(err.is_connection_error());
        assert!(!err.is_retryable());
        assert!(!err.is_domain_error());
    }

    #[test]
    fn test_transient_is_retryable() {
        let err = MetastoreError::from_backend("find", BackendError::datastore(10, 266, "timeout"));
        assert!(err.is_retryable());
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_non_storage_errors_have_no_category() {
        let err = MetastoreError::connection(Zone::Primary, "no connector");
        assert_eq!(err.category(), None);
        assert!(err.is_connection_error());
        assert!(MetastoreError::NoActiveTransaction.category().is_none());
        assert_eq!(
            err.to_string(),
            "Connection error for primary zone: no connector"
        );
    }
}

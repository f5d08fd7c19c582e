//! Error handling for the metastore connector layer
//!
//! Every failure that leaves the core is a [`MetastoreError`]. Failures
//! reported by the backing store are first run through the
//! [`ErrorClassifier`] and carry an [`ErrorCategory`] so callers can decide
//! between retrying, aborting and surfacing a domain conflict with an
//! exhaustive `match` instead of string inspection.
//!
//! ## Error Categories
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                  Backend failure taxonomy                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Retryable          │  Domain conflicts         │  Zone health   │
//! │  ┌───────────────┐  │  ┌─────────────────────┐  │  ┌───────────┐ │
//! │  │ • Transient   │  │  │ • DuplicateKey      │  │  │ • Cluster │ │
//! │  └───────────────┘  │  │ • ForeignKey        │  │  │   Failure │ │
//! │                     │  │ • UniqueConstraint  │  │  └───────────┘ │
//! │                     │  └─────────────────────┘  │                │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Unknown: not retried, fatal to the current operation only       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Connection errors (no usable connector for a zone) and transaction misuse
//! (`TransactionAlreadyActive`, `NoActiveTransaction`) are separate variants
//! and never carry a category.

pub mod classifier;
pub mod constructors;
pub mod types;

pub use classifier::{BackendError, DatastoreCode, ErrorCategory, ErrorClassifier};
pub use types::{MetastoreError, MetastoreResult, Result};

//! Administrative storage formatting
//!
//! Formatting wipes every metadata table through an administrative
//! connection. A failed round is retried from the first table, up to the
//! configured number of rounds.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::FormatConfig;
use crate::error::{BackendError, MetastoreError, MetastoreResult};

/// Administrative access to the store, separate from data sessions
#[async_trait]
pub trait AdminConnector: Send + Sync {
    /// Remove every row of `table`; `transactional` deletes in batches inside
    /// transactions instead of truncating
    async fn truncate_table(&self, transactional: bool, table: &str) -> Result<(), BackendError>;
}

/// Truncates a set of tables with whole-list retries
pub struct StorageFormatter {
    admin: Arc<dyn AdminConnector>,
    retries: u32,
}

impl StorageFormatter {
    pub fn new(admin: Arc<dyn AdminConnector>, config: &FormatConfig) -> Self {
        Self {
            admin,
            retries: config.retries.max(1),
        }
    }

    /// Truncate every table in `tables`
    pub async fn format(&self, transactional: bool, tables: &[&str]) -> MetastoreResult<()> {
        let mut last_error = None;
        for round in 1..=self.retries {
            match self.format_once(transactional, tables).await {
                Ok(()) => {
                    info!(tables = tables.len(), round, "storage formatted");
                    return Ok(());
                }
                Err((table, e)) => {
                    warn!(round, table, error = %e, "formatting round failed");
                    last_error = Some(format!("{}: {}", table, e));
                }
            }
        }

        Err(MetastoreError::FormatFailed {
            attempts: self.retries,
            message: last_error.unwrap_or_default(),
        })
    }

    async fn format_once<'a>(
        &self,
        transactional: bool,
        tables: &[&'a str],
    ) -> Result<(), (&'a str, BackendError)> {
        for table in tables {
            self.admin
                .truncate_table(transactional, table)
                .await
                .map_err(|e| (*table, e))?;
        }
        Ok(())
    }
}

//! Session wrapper over a native backend session
//!
//! A [`Session`] tracks the transaction and lock state of one backend session
//! and turns every backend failure into a classified
//! [`MetastoreError::Storage`]. It never taints anything itself: the owning
//! [`Connector`](crate::connector::Connector) watches commit and rollback
//! results for that.

use tracing::{debug, trace};

use crate::abstractions::{BackendSession, WriteMode};
use crate::error::{BackendError, MetastoreError, MetastoreResult};
use crate::types::{Key, LockMode, Query, Record};

/// One logical connection to a store instance
pub struct Session {
    inner: Box<dyn BackendSession>,
    lock_mode: LockMode,
    transaction_active: bool,
    closed: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("lock_mode", &self.lock_mode)
            .field("transaction_active", &self.transaction_active)
            .field("closed", &self.closed)
            .finish()
    }
}

fn classify<T>(operation: &'static str, result: Result<T, BackendError>) -> MetastoreResult<T> {
    result.map_err(|e| MetastoreError::from_backend(operation, e))
}

impl Session {
    pub fn new(inner: Box<dyn BackendSession>) -> Self {
        Self {
            inner,
            lock_mode: LockMode::default(),
            transaction_active: false,
            closed: false,
        }
    }

    fn ensure_open(&self) -> MetastoreResult<()> {
        if self.closed || self.inner.is_closed() {
            return Err(MetastoreError::SessionClosed);
        }
        Ok(())
    }

    // Transaction control

    /// Begin a transaction; nesting is rejected
    pub async fn begin_transaction(&mut self) -> MetastoreResult<()> {
        self.ensure_open()?;
        if self.transaction_active {
            return Err(MetastoreError::TransactionAlreadyActive);
        }
        classify("begin", self.inner.begin().await)?;
        self.transaction_active = true;
        trace!("transaction started");
        Ok(())
    }

    /// Commit the active transaction
    ///
    /// The transaction is over afterwards whether or not the backend
    /// accepted the commit.
    pub async fn commit(&mut self) -> MetastoreResult<()> {
        if !self.transaction_active {
            return Err(MetastoreError::NoActiveTransaction);
        }
        self.ensure_open()?;
        self.transaction_active = false;
        classify("commit", self.inner.commit().await)
    }

    /// Roll back the active transaction
    pub async fn rollback(&mut self) -> MetastoreResult<()> {
        if !self.transaction_active {
            return Err(MetastoreError::NoActiveTransaction);
        }
        self.ensure_open()?;
        self.transaction_active = false;
        classify("rollback", self.inner.rollback().await)
    }

    pub fn is_transaction_active(&self) -> bool {
        self.transaction_active
    }

    // Single-record operations

    pub async fn find(&mut self, table: &str, key: &Key) -> MetastoreResult<Option<Record>> {
        self.ensure_open()?;
        classify("find", self.inner.find(table, key).await)
    }

    /// Insert a new record
    pub async fn persist(&mut self, record: Record) -> MetastoreResult<()> {
        self.persist_all(vec![record]).await
    }

    /// Insert or overwrite a record
    pub async fn save(&mut self, record: Record) -> MetastoreResult<()> {
        self.save_all(vec![record]).await
    }

    pub async fn update(&mut self, record: Record) -> MetastoreResult<()> {
        self.update_all(vec![record]).await
    }

    pub async fn delete(&mut self, table: &str, key: Key) -> MetastoreResult<()> {
        self.delete_all(table, vec![key]).await
    }

    // Batch operations

    pub async fn persist_all(&mut self, records: Vec<Record>) -> MetastoreResult<()> {
        self.ensure_open()?;
        classify("persist", self.inner.write(WriteMode::Insert, records).await)
    }

    pub async fn save_all(&mut self, records: Vec<Record>) -> MetastoreResult<()> {
        self.ensure_open()?;
        classify("save", self.inner.write(WriteMode::Upsert, records).await)
    }

    pub async fn update_all(&mut self, records: Vec<Record>) -> MetastoreResult<()> {
        self.ensure_open()?;
        classify("update", self.inner.write(WriteMode::Update, records).await)
    }

    pub async fn delete_all(&mut self, table: &str, keys: Vec<Key>) -> MetastoreResult<()> {
        self.ensure_open()?;
        classify("delete", self.inner.delete(table, keys).await)
    }

    /// Remove every row of `table`
    pub async fn delete_table(&mut self, table: &str) -> MetastoreResult<u64> {
        self.ensure_open()?;
        classify("delete_table", self.inner.delete_all(table).await)
    }

    // Queries and session settings

    pub async fn query(&mut self, query: &Query) -> MetastoreResult<Vec<Record>> {
        self.ensure_open()?;
        classify("query", self.inner.query(query).await)
    }

    pub async fn set_lock_mode(&mut self, mode: LockMode) -> MetastoreResult<()> {
        self.ensure_open()?;
        classify("set_lock_mode", self.inner.set_lock_mode(mode).await)?;
        self.lock_mode = mode;
        Ok(())
    }

    pub fn lock_mode(&self) -> LockMode {
        self.lock_mode
    }

    pub async fn set_partition_key(&mut self, table: &str, key: &Key) -> MetastoreResult<()> {
        self.ensure_open()?;
        classify("set_partition_key", self.inner.set_partition_key(table, key).await)
    }

    pub async fn flush(&mut self) -> MetastoreResult<()> {
        self.ensure_open()?;
        classify("flush", self.inner.flush().await)
    }

    /// Close the session; safe to call repeatedly
    pub fn close(&mut self) -> MetastoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.transaction_active = false;
        debug!("closing session");
        classify("close", self.inner.close())
    }

    pub fn is_closed(&self) -> bool {
        self.closed || self.inner.is_closed()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!("error closing dropped session: {}", e);
        }
    }
}

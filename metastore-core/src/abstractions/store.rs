//! Native store client abstractions
//!
//! These traits are the boundary to the backing store's own client library.
//! Everything above them (sessions, connectors, pools, the router) only ever
//! sees [`BackendError`] from this layer and classifies it before it leaves
//! the core.
//!
//! ## Layers
//!
//! - [`StoreDriver`]: connects to one zone's endpoint. Connecting is the
//!   expensive operation the monitor retries.
//! - [`StoreClient`]: a live link to a cluster; opens sessions.
//! - [`BackendSession`]: one session on that link, with its own transaction.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ZoneConfig;
use crate::error::BackendError;
use crate::types::{Key, LockMode, Query, Record};

/// How a batch of records is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Insert; fails with "tuple already exists" if the key is present
    Insert,
    /// Insert or overwrite
    Upsert,
    /// Overwrite an existing row
    Update,
}

/// Establishes connections to a zone's cluster
#[async_trait]
pub trait StoreDriver: Send + Sync {
    /// Connect to the cluster described by `config`
    async fn connect(&self, config: &ZoneConfig) -> Result<Arc<dyn StoreClient>, BackendError>;
}

/// A connected cluster handle
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Open a new session on this connection
    async fn open_session(&self) -> Result<Box<dyn BackendSession>, BackendError>;

    /// Cheap local view of whether the link is still up; no round trip
    fn is_connected(&self) -> bool;

    /// Release the cluster link
    fn close(&self);
}

/// Raw session operations offered by the store's client
#[async_trait]
pub trait BackendSession: Send {
    async fn begin(&mut self) -> Result<(), BackendError>;

    async fn commit(&mut self) -> Result<(), BackendError>;

    async fn rollback(&mut self) -> Result<(), BackendError>;

    /// Look up one row by primary key
    async fn find(&mut self, table: &str, key: &Key) -> Result<Option<Record>, BackendError>;

    /// Write a batch of rows
    async fn write(&mut self, mode: WriteMode, records: Vec<Record>) -> Result<(), BackendError>;

    /// Delete rows by primary key
    async fn delete(&mut self, table: &str, keys: Vec<Key>) -> Result<(), BackendError>;

    /// Delete every row of a table, returning how many were removed
    async fn delete_all(&mut self, table: &str) -> Result<u64, BackendError>;

    async fn query(&mut self, query: &Query) -> Result<Vec<Record>, BackendError>;

    async fn set_lock_mode(&mut self, mode: LockMode) -> Result<(), BackendError>;

    /// Hint which partition the next transaction will touch
    async fn set_partition_key(&mut self, table: &str, key: &Key) -> Result<(), BackendError>;

    /// Send pending writes to the store
    async fn flush(&mut self) -> Result<(), BackendError>;

    /// Close the session; closing twice is a no-op
    fn close(&mut self) -> Result<(), BackendError>;

    fn is_closed(&self) -> bool;
}

//! Connector: a session plus a taint flag
//!
//! A connector is checked out of a [`ConnectorPool`](crate::connector_pool::ConnectorPool)
//! by one caller at a time and returned when that caller's lease drops. When
//! a commit or rollback fails the session can no longer be trusted, so the
//! connector marks itself tainted and the pool discards it instead of taking
//! it back.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::MetastoreResult;
use crate::session::Session;
use crate::types::{Key, LockMode, Zone};

/// One session in a zone plus its taint flag
#[derive(Debug)]
pub struct Connector {
    id: u64,
    zone: Zone,
    session: Mutex<Session>,
    tainted: AtomicBool,
    closed: AtomicBool,
}

impl Connector {
    pub fn new(id: u64, zone: Zone, session: Session) -> Self {
        Self {
            id,
            zone,
            session: Mutex::new(session),
            tainted: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// Whether a commit or rollback on this connector has failed
    pub fn is_tainted(&self) -> bool {
        self.tainted.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Neither tainted nor closed
    pub fn is_usable(&self) -> bool {
        !self.is_tainted() && !self.is_closed()
    }

    fn taint(&self) {
        if !self.tainted.swap(true, Ordering::AcqRel) {
            warn!(zone = %self.zone, connector = self.id, "connector tainted");
        }
    }

    /// Exclusive access to the underlying session for data operations
    pub async fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().await
    }

    /// Session state without waiting; `None` while an operation holds it
    pub(crate) fn try_session(&self) -> Option<MutexGuard<'_, Session>> {
        self.session.try_lock().ok()
    }

    pub async fn begin_transaction(&self) -> MetastoreResult<()> {
        self.session.lock().await.begin_transaction().await
    }

    /// Commit; any failure taints the connector before it is returned
    pub async fn commit(&self) -> MetastoreResult<()> {
        let result = self.session.lock().await.commit().await;
        if let Err(e) = &result {
            debug!(zone = %self.zone, connector = self.id, error = %e, "commit failed");
            self.taint();
        }
        result
    }

    /// Roll back; any failure taints the connector before it is returned
    pub async fn rollback(&self) -> MetastoreResult<()> {
        let result = self.session.lock().await.rollback().await;
        if let Err(e) = &result {
            debug!(zone = %self.zone, connector = self.id, error = %e, "rollback failed");
            self.taint();
        }
        result
    }

    pub async fn is_transaction_active(&self) -> bool {
        self.session.lock().await.is_transaction_active()
    }

    pub async fn flush(&self) -> MetastoreResult<()> {
        self.session.lock().await.flush().await
    }

    pub async fn read_lock(&self) -> MetastoreResult<()> {
        self.set_lock_mode(LockMode::Shared).await
    }

    pub async fn write_lock(&self) -> MetastoreResult<()> {
        self.set_lock_mode(LockMode::Exclusive).await
    }

    pub async fn read_committed(&self) -> MetastoreResult<()> {
        self.set_lock_mode(LockMode::ReadCommitted).await
    }

    async fn set_lock_mode(&self, mode: LockMode) -> MetastoreResult<()> {
        self.session.lock().await.set_lock_mode(mode).await
    }

    /// Hint the partition for the upcoming transaction and flush it out
    pub async fn set_partition_key(&self, table: &str, key: &Key) -> MetastoreResult<()> {
        let mut session = self.session.lock().await;
        session.set_partition_key(table, key).await?;
        session.flush().await
    }

    /// Close the session; later calls are no-ops
    pub async fn close(&self) -> MetastoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(zone = %self.zone, connector = self.id, "closing connector");
        self.session.lock().await.close()
    }
}

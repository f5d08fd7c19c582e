//! In-process simulated cluster
//!
//! [`MemoryCluster`] implements the native client traits on top of shared
//! in-memory tables. It exists so the pool, monitor and router can be run
//! end to end without a real store: the cluster can be taken down and
//! brought back, and one-shot faults can be injected at specific points.
//!
//! Writes inside a transaction are staged and applied at commit. There is no
//! isolation between concurrent sessions beyond that.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::abstractions::{BackendSession, StoreClient, StoreDriver, WriteMode};
use crate::admin::AdminConnector;
use crate::config::ZoneConfig;
use crate::error::classifier::CODE_TUPLE_ALREADY_EXISTS;
use crate::error::BackendError;
use crate::types::{Key, LockMode, Query, Record};

/// "Tuple did not exist": update of a missing row
const CODE_TUPLE_NOT_FOUND: i32 = 626;
/// Classification the store uses for constraint violations
const CLASSIFICATION_CONSTRAINT: i32 = 3;

/// Where an injected fault fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Connect,
    OpenSession,
    Begin,
    Commit,
    Rollback,
    /// Any read, write, query or session-setting call
    Operation,
    Truncate,
}

type Table = BTreeMap<Key, Record>;

#[derive(Debug, Default)]
struct ClusterState {
    available: bool,
    /// Bumped whenever the cluster goes down; clients from older epochs are dead
    epoch: u64,
    tables: BTreeMap<String, Table>,
    faults: HashMap<FaultPoint, VecDeque<BackendError>>,
    connects: u64,
    sessions_opened: u64,
    open_sessions: u64,
    partition_hints: Vec<(String, Key)>,
    lock_modes: Vec<LockMode>,
    truncated: Vec<String>,
}

impl ClusterState {
    fn take_fault(&mut self, point: FaultPoint) -> Option<BackendError> {
        self.faults.get_mut(&point).and_then(|q| q.pop_front())
    }

    fn check_link(&self, epoch: u64) -> Result<(), BackendError> {
        if !self.available || self.epoch != epoch {
            return Err(BackendError::cluster_failure("cluster failure: data nodes unreachable"));
        }
        Ok(())
    }
}

/// A simulated store cluster shared by every client connected to it
#[derive(Debug, Clone)]
pub struct MemoryCluster {
    name: String,
    state: Arc<Mutex<ClusterState>>,
}

impl MemoryCluster {
    /// Create an available, empty cluster
    pub fn new(name: impl Into<String>) -> Self {
        let state = ClusterState {
            available: true,
            ..Default::default()
        };
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the cluster down; every existing client link is severed
    pub fn go_down(&self) {
        let mut state = self.state.lock();
        state.available = false;
        state.epoch += 1;
        info!(cluster = %self.name, "simulated cluster is down");
    }

    /// Bring the cluster back; clients must reconnect
    pub fn come_up(&self) {
        self.state.lock().available = true;
        info!(cluster = %self.name, "simulated cluster is up");
    }

    pub fn is_available(&self) -> bool {
        self.state.lock().available
    }

    /// Queue a one-shot fault at `point`
    pub fn inject_fault(&self, point: FaultPoint, error: BackendError) {
        self.state
            .lock()
            .faults
            .entry(point)
            .or_default()
            .push_back(error);
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Number of successful connects
    pub fn connect_count(&self) -> u64 {
        self.state.lock().connects
    }

    pub fn sessions_opened(&self) -> u64 {
        self.state.lock().sessions_opened
    }

    /// Sessions opened and not yet closed
    pub fn open_sessions(&self) -> u64 {
        self.state.lock().open_sessions
    }

    /// Insert a committed row directly, bypassing sessions
    pub fn seed(&self, record: Record) {
        let mut state = self.state.lock();
        state
            .tables
            .entry(record.table.clone())
            .or_default()
            .insert(record.key.clone(), record);
    }

    /// Committed rows of a table, in key order
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn partition_hints(&self) -> Vec<(String, Key)> {
        self.state.lock().partition_hints.clone()
    }

    /// Lock modes requested by sessions, in order
    pub fn lock_modes(&self) -> Vec<LockMode> {
        self.state.lock().lock_modes.clone()
    }

    pub fn truncated_tables(&self) -> Vec<String> {
        self.state.lock().truncated.clone()
    }
}

#[async_trait]
impl StoreDriver for MemoryCluster {
    async fn connect(&self, config: &ZoneConfig) -> Result<Arc<dyn StoreClient>, BackendError> {
        let mut state = self.state.lock();
        if let Some(fault) = state.take_fault(FaultPoint::Connect) {
            return Err(fault);
        }
        if !state.available {
            return Err(BackendError::cluster_failure(format!(
                "could not connect to {}: cluster unavailable",
                config.connect_string
            )));
        }
        state.connects += 1;
        debug!(
            cluster = %self.name,
            endpoint = %config.connect_string,
            database = %config.database,
            "simulated connect"
        );
        Ok(Arc::new(MemoryClient {
            cluster: self.clone(),
            epoch: state.epoch,
            closed: AtomicBool::new(false),
        }))
    }
}

#[async_trait]
impl AdminConnector for MemoryCluster {
    async fn truncate_table(&self, transactional: bool, table: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if let Some(fault) = state.take_fault(FaultPoint::Truncate) {
            return Err(fault);
        }
        if !state.available {
            return Err(BackendError::client(format!(
                "cannot truncate {}: admin connection refused",
                table
            )));
        }
        state.tables.remove(table);
        state.truncated.push(table.to_string());
        debug!(cluster = %self.name, table, transactional, "simulated truncate");
        Ok(())
    }
}

/// A client link into a [`MemoryCluster`]
#[derive(Debug)]
pub struct MemoryClient {
    cluster: MemoryCluster,
    epoch: u64,
    closed: AtomicBool,
}

#[async_trait]
impl StoreClient for MemoryClient {
    async fn open_session(&self) -> Result<Box<dyn BackendSession>, BackendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::client("client is closed"));
        }
        let mut state = self.cluster.state.lock();
        if let Some(fault) = state.take_fault(FaultPoint::OpenSession) {
            return Err(fault);
        }
        state.check_link(self.epoch)?;
        state.sessions_opened += 1;
        state.open_sessions += 1;
        Ok(Box::new(MemorySession {
            cluster: self.cluster.clone(),
            epoch: self.epoch,
            staged: Vec::new(),
            in_transaction: false,
            closed: false,
        }))
    }

    fn is_connected(&self) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let state = self.cluster.state.lock();
        state.available && state.epoch == self.epoch
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
enum StagedOp {
    Put(Record),
    Delete(String, Key),
    Clear(String),
}

/// A session on a [`MemoryClient`]
#[derive(Debug)]
pub struct MemorySession {
    cluster: MemoryCluster,
    epoch: u64,
    staged: Vec<StagedOp>,
    in_transaction: bool,
    closed: bool,
}

impl MemorySession {
    /// Run `f` against the cluster state after the usual liveness checks
    fn with_state<T>(
        &self,
        point: FaultPoint,
        f: impl FnOnce(&mut ClusterState) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        if self.closed {
            return Err(BackendError::client("session is closed"));
        }
        let mut state = self.cluster.state.lock();
        if let Some(fault) = state.take_fault(point) {
            return Err(fault);
        }
        state.check_link(self.epoch)?;
        f(&mut state)
    }

    /// Committed rows of `table` overlaid with this session's staged writes
    fn visible(&self, state: &ClusterState, table: &str) -> Table {
        let mut rows = state.tables.get(table).cloned().unwrap_or_default();
        for op in &self.staged {
            match op {
                StagedOp::Put(record) if record.table == table => {
                    rows.insert(record.key.clone(), record.clone());
                }
                StagedOp::Delete(t, key) if t == table => {
                    rows.remove(key);
                }
                StagedOp::Clear(t) if t == table => rows.clear(),
                _ => {}
            }
        }
        rows
    }

    fn apply(state: &mut ClusterState, ops: Vec<StagedOp>) {
        for op in ops {
            match op {
                StagedOp::Put(record) => {
                    state
                        .tables
                        .entry(record.table.clone())
                        .or_default()
                        .insert(record.key.clone(), record);
                }
                StagedOp::Delete(table, key) => {
                    if let Some(t) = state.tables.get_mut(&table) {
                        t.remove(&key);
                    }
                }
                StagedOp::Clear(table) => {
                    state.tables.remove(&table);
                }
            }
        }
    }

    fn stage_or_apply(&mut self, state: &mut ClusterState, ops: Vec<StagedOp>) {
        if self.in_transaction {
            self.staged.extend(ops);
        } else {
            Self::apply(state, ops);
        }
    }
}

#[async_trait]
impl BackendSession for MemorySession {
    async fn begin(&mut self) -> Result<(), BackendError> {
        self.with_state(FaultPoint::Begin, |_| Ok(()))?;
        self.in_transaction = true;
        self.staged.clear();
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), BackendError> {
        let staged = std::mem::take(&mut self.staged);
        self.in_transaction = false;
        self.with_state(FaultPoint::Commit, |state| {
            MemorySession::apply(state, staged);
            Ok(())
        })
    }

    async fn rollback(&mut self) -> Result<(), BackendError> {
        self.staged.clear();
        self.in_transaction = false;
        self.with_state(FaultPoint::Rollback, |_| Ok(()))
    }

    async fn find(&mut self, table: &str, key: &Key) -> Result<Option<Record>, BackendError> {
        self.with_state(FaultPoint::Operation, |state| {
            Ok(self.visible(state, table).get(key).cloned())
        })
    }

    async fn write(&mut self, mode: WriteMode, records: Vec<Record>) -> Result<(), BackendError> {
        if self.closed {
            return Err(BackendError::client("session is closed"));
        }
        let cluster = self.cluster.clone();
        let mut state = cluster.state.lock();
        if let Some(fault) = state.take_fault(FaultPoint::Operation) {
            return Err(fault);
        }
        state.check_link(self.epoch)?;

        for record in &records {
            let exists = self.visible(&state, &record.table).contains_key(&record.key);
            match mode {
                WriteMode::Insert if exists => {
                    return Err(BackendError::datastore(
                        CLASSIFICATION_CONSTRAINT,
                        CODE_TUPLE_ALREADY_EXISTS,
                        format!("tuple already existed: {}{}", record.table, record.key),
                    ));
                }
                WriteMode::Update if !exists => {
                    return Err(BackendError::datastore(
                        0,
                        CODE_TUPLE_NOT_FOUND,
                        format!("tuple did not exist: {}{}", record.table, record.key),
                    ));
                }
                _ => {}
            }
        }

        let ops = records.into_iter().map(StagedOp::Put).collect();
        self.stage_or_apply(&mut state, ops);
        Ok(())
    }

    async fn delete(&mut self, table: &str, keys: Vec<Key>) -> Result<(), BackendError> {
        if self.closed {
            return Err(BackendError::client("session is closed"));
        }
        let cluster = self.cluster.clone();
        let mut state = cluster.state.lock();
        if let Some(fault) = state.take_fault(FaultPoint::Operation) {
            return Err(fault);
        }
        state.check_link(self.epoch)?;
        let ops = keys
            .into_iter()
            .map(|key| StagedOp::Delete(table.to_string(), key))
            .collect();
        self.stage_or_apply(&mut state, ops);
        Ok(())
    }

    async fn delete_all(&mut self, table: &str) -> Result<u64, BackendError> {
        if self.closed {
            return Err(BackendError::client("session is closed"));
        }
        let cluster = self.cluster.clone();
        let mut state = cluster.state.lock();
        if let Some(fault) = state.take_fault(FaultPoint::Operation) {
            return Err(fault);
        }
        state.check_link(self.epoch)?;
        let removed = self.visible(&state, table).len() as u64;
        self.stage_or_apply(&mut state, vec![StagedOp::Clear(table.to_string())]);
        Ok(removed)
    }

    async fn query(&mut self, query: &Query) -> Result<Vec<Record>, BackendError> {
        self.with_state(FaultPoint::Operation, |state| {
            let rows = self.visible(state, &query.table);
            let matching = rows.into_values().filter(|r| query.matches(r));
            Ok(match query.limit {
                Some(limit) => matching.take(limit).collect(),
                None => matching.collect(),
            })
        })
    }

    async fn set_lock_mode(&mut self, mode: LockMode) -> Result<(), BackendError> {
        self.with_state(FaultPoint::Operation, |state| {
            state.lock_modes.push(mode);
            Ok(())
        })
    }

    async fn set_partition_key(&mut self, table: &str, key: &Key) -> Result<(), BackendError> {
        self.with_state(FaultPoint::Operation, |state| {
            state.partition_hints.push((table.to_string(), key.clone()));
            Ok(())
        })
    }

    async fn flush(&mut self) -> Result<(), BackendError> {
        self.with_state(FaultPoint::Operation, |_| Ok(()))
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.staged.clear();
        let mut state = self.cluster.state.lock();
        state.open_sessions = state.open_sessions.saturating_sub(1);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ZoneConfig {
        ZoneConfig::new("mem://local", "metastore")
    }

    #[tokio::test]
    async fn test_staged_writes_apply_on_commit() {
        let cluster = MemoryCluster::new("local");
        let client = cluster.connect(&config()).await.unwrap();
        let mut session = client.open_session().await.unwrap();

        session.begin().await.unwrap();
        session
            .write(WriteMode::Insert, vec![Record::new("inodes", 1).with("name", "a")])
            .await
            .unwrap();
        assert!(cluster.rows("inodes").is_empty());
        assert!(session.find("inodes", &Key::from(1)).await.unwrap().is_some());

        session.commit().await.unwrap();
        assert_eq!(cluster.rows("inodes").len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_writes() {
        let cluster = MemoryCluster::new("local");
        let client = cluster.connect(&config()).await.unwrap();
        let mut session = client.open_session().await.unwrap();

        session.begin().await.unwrap();
        session
            .write(WriteMode::Upsert, vec![Record::new("inodes", 1)])
            .await
            .unwrap();
        session.rollback().await.unwrap();
        assert!(cluster.rows("inodes").is_empty());
    }

    #[tokio::test]
    async fn test_going_down_severs_existing_clients() {
        let cluster = MemoryCluster::new("local");
        let client = cluster.connect(&config()).await.unwrap();
        assert!(client.is_connected());

        cluster.go_down();
        assert!(!client.is_connected());
        assert!(cluster.connect(&config()).await.is_err());

        cluster.come_up();
        // The old link stays dead until a fresh connect
        assert!(!client.is_connected());
        let fresh = cluster.connect(&config()).await.unwrap();
        assert!(fresh.is_connected());
        assert_eq!(cluster.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_injected_fault_fires_once() {
        let cluster = MemoryCluster::new("local");
        cluster.inject_fault(FaultPoint::Connect, BackendError::client("boom"));
        assert!(cluster.connect(&config()).await.is_err());
        assert!(cluster.connect(&config()).await.is_ok());
    }

    #[tokio::test]
    async fn test_open_session_accounting() {
        let cluster = MemoryCluster::new("local");
        let client = cluster.connect(&config()).await.unwrap();
        let mut session = client.open_session().await.unwrap();
        assert_eq!(cluster.open_sessions(), 1);
        session.close().unwrap();
        session.close().unwrap();
        assert_eq!(cluster.open_sessions(), 0);
        assert_eq!(cluster.sessions_opened(), 1);
    }
}

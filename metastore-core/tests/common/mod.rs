//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use metastore_core::abstractions::{BackendSession, StoreClient, StoreDriver};
use metastore_core::config::ZoneConfig;
use metastore_core::error::BackendError;
use metastore_core::memory_backend::MemoryCluster;
use metastore_core::{ConnectorPool, MetastoreError, MetastoreResult, Reconnectable, Zone};

pub fn zone_config(zone: Zone) -> ZoneConfig {
    ZoneConfig::new(format!("mem://{}", zone), "metastore")
}

/// Zone config with a short connect timeout
pub fn zone_config_with_timeout(zone: Zone, connect_timeout: Duration) -> ZoneConfig {
    let mut config = zone_config(zone);
    config.connect_timeout = connect_timeout;
    config
}

/// A connected pool over `cluster`
pub async fn connected_pool(cluster: &MemoryCluster, zone: Zone) -> Arc<ConnectorPool> {
    let pool = ConnectorPool::connect(zone, zone_config(zone), Arc::new(cluster.clone()))
        .await
        .expect("pool should connect");
    Arc::new(pool)
}

/// Poll `check` until it returns true or the timeout elapses
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Reconnect target driven by scripted probe and reconnect outcomes
///
/// Once a script runs out, probes report the `connected` default and
/// reconnects succeed.
pub struct ScriptedTarget {
    probes: Mutex<VecDeque<bool>>,
    reconnects: Mutex<VecDeque<bool>>,
    connected: Mutex<bool>,
    gate: Option<Arc<Notify>>,
    started: AtomicU32,
    completed: AtomicU32,
}

impl ScriptedTarget {
    pub fn new(probes: Vec<bool>, reconnects: Vec<bool>) -> Self {
        Self {
            probes: Mutex::new(probes.into()),
            reconnects: Mutex::new(reconnects.into()),
            connected: Mutex::new(true),
            gate: None,
            started: AtomicU32::new(0),
            completed: AtomicU32::new(0),
        }
    }

    /// A target that is always down until a reconnect succeeds
    pub fn down_until_reconnect(failures: usize) -> Self {
        let target = Self::new(Vec::new(), vec![false; failures]);
        *target.connected.lock() = false;
        target
    }

    /// Reconnects block until `gate` is notified
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn reconnects_started(&self) -> u32 {
        self.started.load(Ordering::SeqCst)
    }

    pub fn reconnects_completed(&self) -> u32 {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reconnectable for ScriptedTarget {
    async fn is_connected(&self) -> bool {
        let scripted = self.probes.lock().pop_front();
        scripted.unwrap_or_else(|| *self.connected.lock())
    }

    async fn reconnect(&self) -> MetastoreResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let succeed = self.reconnects.lock().pop_front().unwrap_or(true);
        self.completed.fetch_add(1, Ordering::SeqCst);
        if succeed {
            *self.connected.lock() = true;
            Ok(())
        } else {
            Err(MetastoreError::connection(Zone::Local, "scripted reconnect failure"))
        }
    }
}

/// Where a [`StalledDriver`] stops answering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stall {
    Connect,
    OpenSession,
}

/// Driver whose connect or session open never completes
pub struct StalledDriver {
    stall: Stall,
}

impl StalledDriver {
    pub fn new(stall: Stall) -> Self {
        Self { stall }
    }
}

#[async_trait]
impl StoreDriver for StalledDriver {
    async fn connect(&self, _config: &ZoneConfig) -> Result<Arc<dyn StoreClient>, BackendError> {
        if self.stall == Stall::Connect {
            std::future::pending::<()>().await;
        }
        Ok(Arc::new(StalledClient))
    }
}

struct StalledClient;

#[async_trait]
impl StoreClient for StalledClient {
    async fn open_session(&self) -> Result<Box<dyn BackendSession>, BackendError> {
        std::future::pending::<()>().await;
        Err(BackendError::client("unreachable"))
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn close(&self) {}
}

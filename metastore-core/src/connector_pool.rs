//! Connector pool for one zone
//!
//! The pool holds a single cluster link and a set of idle connectors opened
//! on it. [`ConnectorPool::get_connector`] checks one connector out to the
//! caller as a [`PooledConnector`] lease; no other caller sees that
//! connector until the lease drops. On release a connector goes back to the
//! idle set only if it is still usable, has no open transaction and was
//! opened on the current link. Tainted connectors are discarded, so the next
//! checkout gets a different one.
//!
//! Checkouts are bounded by `max_connectors`; callers beyond that wait for a
//! lease to be released. Getting a connector never retries the cluster
//! connection. Re-establishing the link is [`ConnectorPool::reconnect`],
//! driven by the zone's
//! [`ConnectionMonitor`](crate::connection_monitor::ConnectionMonitor).

use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::abstractions::{StoreClient, StoreDriver};
use crate::config::ZoneConfig;
use crate::connection_monitor::Reconnectable;
use crate::connector::Connector;
use crate::error::{BackendError, MetastoreError, MetastoreResult};
use crate::session::Session;
use crate::types::Zone;

#[derive(Default)]
struct PoolState {
    client: Option<Arc<dyn StoreClient>>,
    /// Bumped on every reconnect; connectors from older links are not reused
    generation: u64,
    idle: Vec<Arc<Connector>>,
    shut_down: bool,
}

/// State shared between the pool and its outstanding leases
struct PoolShared {
    zone: Zone,
    state: Mutex<PoolState>,
    connected: AtomicBool,
    checked_out: AtomicUsize,
    replacements: AtomicU64,
}

impl PoolShared {
    fn release(&self, connector: &Arc<Connector>, generation: u64) {
        self.checked_out.fetch_sub(1, Ordering::AcqRel);

        if connector.is_tainted() {
            self.replacements.fetch_add(1, Ordering::Relaxed);
            debug!(zone = %self.zone, connector = connector.id(), "discarding tainted connector");
            return;
        }
        if connector.is_closed() {
            return;
        }
        let idle_ready = connector
            .try_session()
            .map(|session| !session.is_transaction_active() && !session.is_closed())
            .unwrap_or(false);
        if !idle_ready {
            debug!(
                zone = %self.zone,
                connector = connector.id(),
                "discarding connector released mid-transaction"
            );
            return;
        }

        let mut state = self.state.lock();
        if state.shut_down || state.generation != generation {
            return;
        }
        state.idle.push(Arc::clone(connector));
    }
}

/// Exclusive lease on one connector; returns it to the pool on drop
pub struct PooledConnector {
    connector: Arc<Connector>,
    generation: u64,
    pool: Arc<PoolShared>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnector {
    /// Link generation the connector was opened on
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Deref for PooledConnector {
    type Target = Connector;

    fn deref(&self) -> &Connector {
        &self.connector
    }
}

impl Drop for PooledConnector {
    fn drop(&mut self) {
        self.pool.release(&self.connector, self.generation);
    }
}

impl std::fmt::Debug for PooledConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnector")
            .field("zone", &self.connector.zone())
            .field("connector", &self.connector.id())
            .field("generation", &self.generation)
            .finish()
    }
}

/// Hands out connectors for one zone, one caller per connector
pub struct ConnectorPool {
    zone: Zone,
    config: ZoneConfig,
    driver: Arc<dyn StoreDriver>,
    shared: Arc<PoolShared>,
    permits: Arc<Semaphore>,
    next_id: AtomicU64,
    reconnects: AtomicU64,
}

impl ConnectorPool {
    /// Create a pool without connecting; call [`reconnect`](Self::reconnect) to connect
    pub fn new(zone: Zone, config: ZoneConfig, driver: Arc<dyn StoreDriver>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_connectors.max(1)));
        Self {
            zone,
            config,
            driver,
            shared: Arc::new(PoolShared {
                zone,
                state: Mutex::new(PoolState::default()),
                connected: AtomicBool::new(false),
                checked_out: AtomicUsize::new(0),
                replacements: AtomicU64::new(0),
            }),
            permits,
            next_id: AtomicU64::new(1),
            reconnects: AtomicU64::new(0),
        }
    }

    /// Create a pool and connect it immediately
    pub async fn connect(
        zone: Zone,
        config: ZoneConfig,
        driver: Arc<dyn StoreDriver>,
    ) -> MetastoreResult<Self> {
        let pool = Self::new(zone, config, driver);
        pool.reconnect().await?;
        Ok(pool)
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    /// Check out a connector for exclusive use
    ///
    /// Reuses an idle connector when one is usable, otherwise opens a new
    /// session on the current link. Waits while `max_connectors` leases are
    /// outstanding.
    pub async fn get_connector(&self) -> MetastoreResult<PooledConnector> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| MetastoreError::connection(self.zone, "connector pool is shut down"))?;

        let (client, generation) = {
            let mut state = self.shared.state.lock();
            if state.shut_down {
                return Err(MetastoreError::connection(self.zone, "connector pool is shut down"));
            }
            let client = match state.client.clone() {
                Some(client) if client.is_connected() => client,
                Some(_) => {
                    self.shared.connected.store(false, Ordering::Release);
                    return Err(MetastoreError::connection(self.zone, "cluster link is down"));
                }
                None => {
                    return Err(MetastoreError::connection(
                        self.zone,
                        "no cluster connection established",
                    ))
                }
            };
            // Idle connectors that went bad while parked are dropped here
            while let Some(connector) = state.idle.pop() {
                if connector.is_usable() {
                    let generation = state.generation;
                    return Ok(self.lease(connector, generation, permit));
                }
            }
            (client, state.generation)
        };

        match self.open_connector(client.as_ref()).await {
            Ok(connector) => Ok(self.lease(connector, generation, permit)),
            Err(e) => {
                let state = self.shared.state.lock();
                if state.generation == generation {
                    self.shared.connected.store(false, Ordering::Release);
                }
                Err(e)
            }
        }
    }

    fn lease(
        &self,
        connector: Arc<Connector>,
        generation: u64,
        permit: OwnedSemaphorePermit,
    ) -> PooledConnector {
        self.shared.checked_out.fetch_add(1, Ordering::AcqRel);
        PooledConnector {
            connector,
            generation,
            pool: Arc::clone(&self.shared),
            _permit: permit,
        }
    }

    /// Run a connect-phase call under the zone's `connect_timeout`
    async fn within_timeout<T, F>(&self, what: &str, call: F) -> MetastoreResult<T>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        match tokio::time::timeout(self.config.connect_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(MetastoreError::connection(
                self.zone,
                format!("{} failed: {}", what, e),
            )),
            Err(_) => Err(MetastoreError::connection(
                self.zone,
                format!(
                    "{} timed out after {:?}",
                    what, self.config.connect_timeout
                ),
            )),
        }
    }

    async fn open_connector(&self, client: &dyn StoreClient) -> MetastoreResult<Arc<Connector>> {
        let session = self
            .within_timeout("open session", client.open_session())
            .await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(Connector::new(id, self.zone, Session::new(session))))
    }

    /// Cheap liveness check: no round trip to the cluster
    pub async fn is_connected(&self) -> bool {
        if !self.shared.connected.load(Ordering::Acquire) {
            return false;
        }
        let state = self.shared.state.lock();
        !state.shut_down
            && state
                .client
                .as_ref()
                .map(|client| client.is_connected())
                .unwrap_or(false)
    }

    /// Establish a fresh cluster link and a first connector, then swap them in
    ///
    /// Idle connectors from the old link are closed; leases still out finish
    /// on the old link and are discarded when released. On failure the pool
    /// is left exactly as it was.
    pub async fn reconnect(&self) -> MetastoreResult<()> {
        debug!(
            zone = %self.zone,
            endpoint = %self.config.connect_string,
            "connecting"
        );
        let connect = self.driver.connect(&self.config);
        let what = format!("connect to {}", self.config.connect_string);
        let client = self.within_timeout(&what, connect).await?;
        let connector = match self.open_connector(client.as_ref()).await {
            Ok(connector) => connector,
            Err(e) => {
                client.close();
                return Err(e);
            }
        };

        let (old_client, old_idle) = {
            let mut state = self.shared.state.lock();
            if state.shut_down {
                drop(state);
                client.close();
                return Err(MetastoreError::connection(self.zone, "connector pool is shut down"));
            }
            state.generation += 1;
            let old_idle = std::mem::replace(&mut state.idle, vec![connector]);
            (state.client.replace(client), old_idle)
        };
        self.shared.connected.store(true, Ordering::Release);
        self.reconnects.fetch_add(1, Ordering::Relaxed);

        for connector in old_idle {
            if let Err(e) = connector.close().await {
                debug!(zone = %self.zone, "error closing stale connector: {}", e);
            }
        }
        if let Some(old_client) = old_client {
            old_client.close();
        }
        info!(zone = %self.zone, endpoint = %self.config.connect_string, "connected");
        Ok(())
    }

    /// Close idle connectors and the cluster link; later checkouts fail
    pub async fn shutdown(&self) {
        self.permits.close();
        let (idle, client) = {
            let mut state = self.shared.state.lock();
            state.shut_down = true;
            (std::mem::take(&mut state.idle), state.client.take())
        };
        self.shared.connected.store(false, Ordering::Release);

        for connector in idle {
            if let Err(e) = connector.close().await {
                warn!(zone = %self.zone, "error closing connector: {}", e);
            }
        }
        if let Some(client) = client {
            client.close();
        }
        debug!(zone = %self.zone, "connector pool shut down");
    }

    pub async fn get_stats(&self) -> ConnectorPoolStats {
        let state = self.shared.state.lock();
        ConnectorPoolStats {
            zone: self.zone,
            connected: self.shared.connected.load(Ordering::Acquire),
            generation: state.generation,
            idle: state.idle.len(),
            checked_out: self.shared.checked_out.load(Ordering::Acquire),
            connectors_created: self.next_id.load(Ordering::Relaxed) - 1,
            replacements: self.shared.replacements.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl Reconnectable for ConnectorPool {
    async fn is_connected(&self) -> bool {
        ConnectorPool::is_connected(self).await
    }

    async fn reconnect(&self) -> MetastoreResult<()> {
        ConnectorPool::reconnect(self).await
    }
}

impl std::fmt::Debug for ConnectorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorPool")
            .field("zone", &self.zone)
            .field("endpoint", &self.config.connect_string)
            .field("connected", &self.shared.connected.load(Ordering::Relaxed))
            .finish()
    }
}

/// Pool counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorPoolStats {
    pub zone: Zone,
    pub connected: bool,
    /// Number of successful reconnects that produced the current link
    pub generation: u64,
    /// Connectors parked and ready for checkout
    pub idle: usize,
    /// Leases currently held by callers
    pub checked_out: usize,
    pub connectors_created: u64,
    /// Tainted connectors discarded on release
    pub replacements: u64,
    pub reconnects: u64,
}

//! Zone-aware routing
//!
//! The router owns one (pool, monitor) pair per configured zone and hands
//! callers a connector for the zone they name. A standalone deployment has a
//! single local entry and every zone resolves to it; with two entries each
//! zone resolves strictly to its own pool.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::abstractions::{Clock, StoreDriver, SystemClock};
use crate::config::{Config, MonitorConfig, ZoneConfig};
use crate::connection_monitor::{ConnectionMonitor, MonitorHandle, MonitorStatus};
use crate::connector_pool::{ConnectorPool, PooledConnector};
use crate::error::{MetastoreError, MetastoreResult};
use crate::types::Zone;

/// A zone's pool together with the monitor keeping it connected
pub struct ZoneEntry {
    zone: Zone,
    pool: Arc<ConnectorPool>,
    monitor: MonitorHandle,
}

impl ZoneEntry {
    pub fn new(pool: Arc<ConnectorPool>, monitor: MonitorHandle) -> Self {
        Self {
            zone: pool.zone(),
            pool,
            monitor,
        }
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    pub fn pool(&self) -> &Arc<ConnectorPool> {
        &self.pool
    }

    pub fn monitor(&self) -> &MonitorHandle {
        &self.monitor
    }
}

/// Routes zone requests to the owning pool
pub struct ZoneRouter {
    entries: Vec<ZoneEntry>,
}

impl ZoneRouter {
    /// Build a router over prepared entries
    ///
    /// Entries must be non-empty with at most one per zone.
    pub fn new(mut entries: Vec<ZoneEntry>) -> MetastoreResult<Self> {
        if entries.is_empty() {
            return Err(MetastoreError::configuration(
                "zone_router",
                "at least one zone is required",
            ));
        }
        entries.sort_by_key(|entry| entry.zone);
        if entries.windows(2).any(|pair| pair[0].zone == pair[1].zone) {
            return Err(MetastoreError::configuration(
                "zone_router",
                "each zone may be configured only once",
            ));
        }
        Ok(Self { entries })
    }

    pub fn builder(monitor: MonitorConfig) -> ZoneRouterBuilder {
        ZoneRouterBuilder::new(monitor)
    }

    /// Build a router for every zone in `config`, using `driver_for` to pick each zone's driver
    pub async fn from_config<F>(config: &Config, driver_for: F) -> MetastoreResult<Self>
    where
        F: Fn(Zone) -> Arc<dyn StoreDriver>,
    {
        Self::from_config_with_clock(config, driver_for, Arc::new(SystemClock::new())).await
    }

    pub async fn from_config_with_clock<F>(
        config: &Config,
        driver_for: F,
        clock: Arc<dyn Clock>,
    ) -> MetastoreResult<Self>
    where
        F: Fn(Zone) -> Arc<dyn StoreDriver>,
    {
        let mut builder = ZoneRouterBuilder::new(config.monitor.clone()).clock(clock);
        for zone in config.zones.configured() {
            if let Some(zone_config) = config.zones.get(zone) {
                builder = builder.zone(zone, zone_config.clone(), driver_for(zone));
            }
        }
        builder.build().await
    }

    fn route(&self, zone: Zone) -> MetastoreResult<&ZoneEntry> {
        if let [only] = self.entries.as_slice() {
            return Ok(only);
        }
        self.entries
            .iter()
            .find(|entry| entry.zone == zone)
            .ok_or_else(|| {
                error!(%zone, "no pool configured for zone");
                MetastoreError::UnroutableZone { zone }
            })
    }

    /// Check out a connector from the pool serving `zone`
    pub async fn connector_for(&self, zone: Zone) -> MetastoreResult<PooledConnector> {
        self.route(zone)?.pool.get_connector().await
    }

    pub fn pool(&self, zone: Zone) -> MetastoreResult<&Arc<ConnectorPool>> {
        self.route(zone).map(|entry| &entry.pool)
    }

    /// Liveness of whichever pool serves `zone`
    pub async fn is_connected(&self, zone: Zone) -> bool {
        match self.route(zone) {
            Ok(entry) => entry.pool.is_connected().await,
            Err(_) => false,
        }
    }

    /// Liveness of the pool serving the primary zone
    ///
    /// In a standalone deployment that is the local pool.
    pub async fn is_connected_to_primary(&self) -> bool {
        self.is_connected(Zone::Primary).await
    }

    pub fn monitor_status(&self, zone: Zone) -> MetastoreResult<MonitorStatus> {
        self.route(zone).map(|entry| entry.monitor.status())
    }

    pub fn monitor(&self, zone: Zone) -> MetastoreResult<&MonitorHandle> {
        self.route(zone).map(|entry| &entry.monitor)
    }

    /// Zones with their own entry
    pub fn zones(&self) -> Vec<Zone> {
        self.entries.iter().map(|entry| entry.zone).collect()
    }

    pub fn is_standalone(&self) -> bool {
        self.entries.len() == 1
    }

    /// Stop every monitor, then close every pool
    pub async fn shutdown(&self) {
        join_all(self.entries.iter().map(|entry| entry.monitor.shutdown())).await;
        for entry in &self.entries {
            entry.pool.shutdown().await;
        }
        info!("zone router shut down");
    }
}

/// Connects each zone's pool and starts its monitor
pub struct ZoneRouterBuilder {
    monitor: MonitorConfig,
    clock: Arc<dyn Clock>,
    zones: Vec<(Zone, ZoneConfig, Arc<dyn StoreDriver>)>,
}

impl ZoneRouterBuilder {
    pub fn new(monitor: MonitorConfig) -> Self {
        Self {
            monitor,
            clock: Arc::new(SystemClock::new()),
            zones: Vec::new(),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn zone(mut self, zone: Zone, config: ZoneConfig, driver: Arc<dyn StoreDriver>) -> Self {
        self.zones.push((zone, config, driver));
        self
    }

    /// Connect every zone and start monitors
    ///
    /// The local zone must be reachable. A remote zone that is down at
    /// startup starts disconnected and its monitor keeps trying.
    pub async fn build(mut self) -> MetastoreResult<ZoneRouter> {
        self.zones.sort_by_key(|(zone, _, _)| *zone);
        let mut entries = Vec::with_capacity(self.zones.len());

        for (zone, config, driver) in self.zones {
            let pool = Arc::new(ConnectorPool::new(zone, config, driver));
            if let Err(e) = pool.reconnect().await {
                if zone == Zone::Local {
                    return Err(e);
                }
                warn!(%zone, error = %e, "zone unreachable at startup; monitor will keep retrying");
            }

            let monitor =
                ConnectionMonitor::new(zone, pool.clone(), Arc::clone(&self.clock), &self.monitor)
                    .spawn();
            entries.push(ZoneEntry::new(pool, monitor));
        }

        ZoneRouter::new(entries)
    }
}

//! Resilient, zone-aware connector layer for a clustered metadata store
//!
//! Callers check a [`Connector`] out of a [`ZoneRouter`] for a [`Zone`] as a
//! [`PooledConnector`] lease, run a transaction on its [`Session`], and get
//! classified [`MetastoreError`]s back. Behind the router each zone has a
//! [`ConnectorPool`] that leases each connector to one caller at a time and
//! discards connectors tainted by failed commits or rollbacks, and a
//! [`ConnectionMonitor`] that reconnects the pool with exponential backoff
//! whenever it loses its cluster link.

pub mod abstractions;
pub mod admin;
pub mod common;
pub mod config;
pub mod connection_monitor;
pub mod connector;
pub mod connector_pool;
pub mod error;
pub mod memory_backend;
pub mod observability;
pub mod session;
pub mod types;
pub mod zone_router;

pub use abstractions::{Clock, MockClock, SystemClock};
pub use admin::{AdminConnector, StorageFormatter};
pub use config::Config;
pub use connection_monitor::{
    Backoff, ConnectionMonitor, MonitorHandle, MonitorState, MonitorStatus, MonitorStep,
    Reconnectable,
};
pub use connector::Connector;
pub use connector_pool::{ConnectorPool, ConnectorPoolStats, PooledConnector};
pub use error::{ErrorCategory, ErrorClassifier, MetastoreError, MetastoreResult};
pub use session::Session;
pub use types::{Key, LockMode, Query, Record, Zone};
pub use zone_router::{ZoneRouter, ZoneRouterBuilder};

//! Configuration for the connector layer
//!
//! Loaded from TOML, then overridden from the environment, then validated.
//!
//! # Example Configuration
//!
//! ```toml
//! # Zone co-located with this process (required)
//! [zones.local]
//! connect_string = "ndb-local:1186"
//! database = "metastore"
//! connect_timeout = "5s"
//! max_connectors = 32
//!
//! # Authoritative zone (optional; omit for a standalone deployment)
//! [zones.primary]
//! connect_string = "ndb-primary:1186"
//! database = "metastore"
//!
//! [monitor]
//! interval = "1s"
//! max_exp_counter = 8
//!
//! [logging]
//! level = "info"
//! json = false
//!
//! [format]
//! retries = 5
//! ```

pub mod core;
pub mod monitor;
pub mod observability;
pub mod zone;

pub use self::core::{Config, FormatConfig};
pub use monitor::MonitorConfig;
pub use observability::LoggingConfig;
pub use zone::{ZoneConfig, ZonesConfig};

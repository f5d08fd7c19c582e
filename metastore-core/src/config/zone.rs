//! Per-zone connection parameters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::types::Zone;

/// Connection parameters for one zone's cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    /// Management endpoint of the cluster
    pub connect_string: String,

    /// Database holding the metadata tables
    pub database: String,

    /// How long a single connect attempt may take
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Sessions the zone's pool may have checked out at once
    pub max_connectors: usize,

    /// Extra driver properties passed through untouched
    pub properties: BTreeMap<String, String>,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            connect_string: "localhost:1186".to_string(),
            database: "metastore".to_string(),
            connect_timeout: Duration::from_secs(5),
            max_connectors: 32,
            properties: BTreeMap::new(),
        }
    }
}

impl ZoneConfig {
    pub fn new(connect_string: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            connect_string: connect_string.into(),
            database: database.into(),
            ..Default::default()
        }
    }
}

/// The zones this process can route to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ZonesConfig {
    pub local: ZoneConfig,
    pub primary: Option<ZoneConfig>,
}

impl ZonesConfig {
    pub fn get(&self, zone: Zone) -> Option<&ZoneConfig> {
        match zone {
            Zone::Local => Some(&self.local),
            Zone::Primary => self.primary.as_ref(),
        }
    }

    /// Configured zones, local first
    pub fn configured(&self) -> Vec<Zone> {
        Zone::ALL
            .iter()
            .copied()
            .filter(|zone| self.get(*zone).is_some())
            .collect()
    }

    pub fn is_standalone(&self) -> bool {
        self.primary.is_none()
    }
}

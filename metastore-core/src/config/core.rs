//! Top-level configuration and loading

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::monitor::MAX_EXP_COUNTER_LIMIT;
use super::observability::LOG_LEVELS;
use super::{LoggingConfig, MonitorConfig, ZoneConfig, ZonesConfig};
use crate::common::file_io::read_config_file;
use crate::error::{MetastoreError, MetastoreResult};
use crate::types::Zone;

/// Complete configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Zone connection parameters
    pub zones: ZonesConfig,

    /// Reconnect monitor tuning
    pub monitor: MonitorConfig,

    /// Logging
    pub logging: LoggingConfig,

    /// Storage formatting
    pub format: FormatConfig,
}

/// Administrative formatting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Rounds over the whole table list before giving up
    pub retries: u32,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self { retries: 5 }
    }
}

impl Config {
    /// Load configuration from a TOML file, apply environment overrides and validate
    pub async fn from_file_async<P: AsRef<Path>>(path: P) -> MetastoreResult<Self> {
        let mut config: Config = read_config_file(path, "metastore").await?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Zone variables are named after the zone: `METASTORE_LOCAL_CONNECT_STRING`,
    /// `METASTORE_PRIMARY_DATABASE` and so on. Setting a primary variable when
    /// no primary zone is configured adds one with default settings.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for zone in Zone::ALL {
            let prefix = zone.env_prefix();
            let connect_string = lookup(&format!("{}_CONNECT_STRING", prefix));
            let database = lookup(&format!("{}_DATABASE", prefix));
            if connect_string.is_none() && database.is_none() {
                continue;
            }

            let target = match zone {
                Zone::Local => &mut self.zones.local,
                Zone::Primary => self.zones.primary.get_or_insert_with(ZoneConfig::default),
            };
            if let Some(connect_string) = connect_string {
                target.connect_string = connect_string;
            }
            if let Some(database) = database {
                target.database = database;
            }
        }

        if let Some(interval) = lookup("METASTORE_MONITOR_INTERVAL") {
            if let Ok(interval) = humantime_serde::re::humantime::parse_duration(&interval) {
                self.monitor.interval = interval;
            }
        }
        if let Some(cap) = lookup("METASTORE_MONITOR_MAX_EXP_COUNTER") {
            if let Ok(cap) = cap.parse() {
                self.monitor.max_exp_counter = cap;
            }
        }

        if let Some(level) = lookup("METASTORE_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> MetastoreResult<()> {
        for zone in self.zones.configured() {
            if let Some(cfg) = self.zones.get(zone) {
                validate_zone(zone, cfg)?;
            }
        }

        if self.monitor.interval == Duration::ZERO {
            return Err(MetastoreError::configuration(
                "monitor",
                "interval must be greater than zero",
            ));
        }
        if self.monitor.max_exp_counter > MAX_EXP_COUNTER_LIMIT {
            return Err(MetastoreError::configuration(
                "monitor",
                format!(
                    "max_exp_counter {} exceeds the limit of {}",
                    self.monitor.max_exp_counter, MAX_EXP_COUNTER_LIMIT
                ),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(MetastoreError::configuration(
                "logging",
                format!("Invalid log level: {}", self.logging.level),
            ));
        }

        if self.format.retries == 0 {
            return Err(MetastoreError::configuration(
                "format",
                "retries must be at least 1",
            ));
        }

        Ok(())
    }
}

fn validate_zone(zone: Zone, cfg: &ZoneConfig) -> MetastoreResult<()> {
    let component = zone.config_prefix();
    if cfg.connect_string.trim().is_empty() {
        return Err(MetastoreError::configuration(
            component,
            "connect_string cannot be empty",
        ));
    }
    if cfg.database.trim().is_empty() {
        return Err(MetastoreError::configuration(
            component,
            "database cannot be empty",
        ));
    }
    if cfg.connect_timeout == Duration::ZERO {
        return Err(MetastoreError::configuration(
            component,
            "connect_timeout must be greater than zero",
        ));
    }
    if cfg.max_connectors == 0 {
        return Err(MetastoreError::configuration(
            component,
            "max_connectors must be at least 1",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid_and_standalone() {
        let config = Config::default();
        config.validate().unwrap();
        assert!(config.zones.is_standalone());
        assert_eq!(config.monitor.interval, Duration::from_secs(1));
        assert_eq!(config.monitor.max_exp_counter, 8);
        assert_eq!(config.format.retries, 5);
    }

    #[test]
    fn test_parse_two_zone_toml() {
        let config: Config = toml::from_str(
            r#"
            [zones.local]
            connect_string = "local:1186"
            [zones.primary]
            connect_string = "primary:1186"
            database = "meta"
            connect_timeout = "250ms"
            [monitor]
            interval = "500ms"
            "#,
        )
        .unwrap();

        assert_eq!(config.zones.configured(), vec![Zone::Local, Zone::Primary]);
        let primary = config.zones.get(Zone::Primary).unwrap();
        assert_eq!(primary.database, "meta");
        assert_eq!(primary.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.zones.local.database, "metastore");
        assert_eq!(config.monitor.interval, Duration::from_millis(500));
    }

    #[test]
    fn test_overrides_add_primary_zone() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup(&[
            ("METASTORE_PRIMARY_CONNECT_STRING", "remote:1186"),
            ("METASTORE_LOCAL_DATABASE", "meta_local"),
            ("METASTORE_MONITOR_INTERVAL", "2s"),
            ("METASTORE_LOG_LEVEL", "debug"),
        ]));

        let primary = config.zones.primary.as_ref().unwrap();
        assert_eq!(primary.connect_string, "remote:1186");
        assert_eq!(config.zones.local.database, "meta_local");
        assert_eq!(config.monitor.interval, Duration::from_secs(2));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_unparseable_overrides_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup(&[
            ("METASTORE_MONITOR_INTERVAL", "soon"),
            ("METASTORE_MONITOR_MAX_EXP_COUNTER", "many"),
        ]));
        assert_eq!(config.monitor, MonitorConfig::default());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.monitor.interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitor.max_exp_counter = 21;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.zones.local.max_connectors = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.zones.primary = Some(ZoneConfig::new("", "metastore"));
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            MetastoreError::ConfigurationError { ref component, .. } if component == "metastore.primary"
        ));
    }
}

//! Logging setup and span helpers

use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LoggingConfig;
use crate::error::{MetastoreError, MetastoreResult};
use crate::types::Zone;

/// Install the global subscriber
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to this
/// crate and `warn` to everything else.
pub fn init_tracing(config: &LoggingConfig) -> MetastoreResult<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,metastore_core={level},metastore={level}",
            level = config.level
        ))
    });

    let registry = Registry::default().with(env_filter);
    let result = if config.json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
    };

    result.map_err(|e| {
        MetastoreError::configuration("logging", format!("failed to install subscriber: {}", e))
    })
}

/// Create a span for an operation against one zone
#[inline]
pub fn zone_span(operation: &str, zone: Zone) -> Span {
    tracing::debug_span!(
        "zone",
        operation = %operation,
        zone = %zone,
    )
}

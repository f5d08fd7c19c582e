//! Operator CLI for the connector layer
//!
//! The binary links only the in-memory store driver, so every command runs
//! against simulated clusters built from the configured zones. The
//! configuration, routing, monitoring and formatting code paths are the
//! production ones; the data is not.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use metastore_core::abstractions::StoreDriver;
use metastore_core::memory_backend::MemoryCluster;
use metastore_core::observability::init_tracing;
use metastore_core::{Config, MetastoreResult, Record, StorageFormatter, Zone, ZoneRouter};

#[derive(Parser)]
#[command(name = "metastore")]
#[command(about = "Zone-aware connector layer for a clustered metadata store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration, connect a simulated cluster per zone and report liveness
    ///
    /// Each zone gets a fresh in-memory cluster, so this checks the
    /// configuration and routing rather than a live deployment.
    Check {
        /// Configuration file
        #[arg(long)]
        config: PathBuf,
    },
    /// Run a workload against simulated clusters through a local outage
    Simulate {
        /// Configuration file
        #[arg(long)]
        config: PathBuf,

        /// How long the local zone stays down (e.g. "5s")
        #[arg(long, value_parser = parse_duration, default_value = "5s")]
        outage: Duration,

        /// Total run time (e.g. "30s")
        #[arg(long, value_parser = parse_duration, default_value = "30s")]
        duration: Duration,
    },
    /// Run storage formatting against a fresh simulated local cluster
    ///
    /// The simulated cluster starts empty; this exercises the formatter and
    /// its retry settings, not a live deployment.
    Format {
        /// Configuration file
        #[arg(long)]
        config: PathBuf,

        /// Tables to truncate
        #[arg(required = true)]
        tables: Vec<String>,

        /// Delete rows inside transactions instead of truncating
        #[arg(long)]
        transactional: bool,
    },
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

/// One simulated cluster per configured zone
fn simulated_clusters(config: &Config) -> BTreeMap<Zone, MemoryCluster> {
    config
        .zones
        .configured()
        .into_iter()
        .filter_map(|zone| {
            config
                .zones
                .get(zone)
                .map(|cfg| (zone, MemoryCluster::new(cfg.connect_string.clone())))
        })
        .collect()
}

async fn build_router(
    config: &Config,
    clusters: &BTreeMap<Zone, MemoryCluster>,
) -> anyhow::Result<ZoneRouter> {
    let clusters = clusters.clone();
    let router = ZoneRouter::from_config(config, move |zone| -> Arc<dyn StoreDriver> {
        let cluster = clusters
            .get(&zone)
            .cloned()
            .unwrap_or_else(|| MemoryCluster::new(zone.as_str()));
        Arc::new(cluster)
    })
    .await
    .context("failed to start zone router")?;
    Ok(router)
}

async fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = Config::from_file_async(path)
        .await
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    init_tracing(&config.logging)?;
    Ok(config)
}

async fn check(config: Config) -> anyhow::Result<()> {
    let clusters = simulated_clusters(&config);
    let router = build_router(&config, &clusters).await?;

    for zone in Zone::ALL {
        let endpoint = config
            .zones
            .get(zone)
            .map(|cfg| cfg.connect_string.as_str())
            .unwrap_or("(served by local)");
        let state = if router.is_connected(zone).await {
            "connected"
        } else {
            "disconnected"
        };
        println!("{:<8} {:<13} {} (simulated)", zone, state, endpoint);
    }

    router.shutdown().await;
    Ok(())
}

#[derive(Debug, Default)]
struct WorkloadStats {
    committed: u64,
    failed: u64,
}

async fn save_one(router: &ZoneRouter, id: i64) -> MetastoreResult<()> {
    let connector = router.connector_for(Zone::Local).await?;
    connector.begin_transaction().await?;
    let saved = connector
        .session()
        .await
        .save(Record::new("workload", id).with("tick", id))
        .await;
    match saved {
        Ok(()) => connector.commit().await,
        Err(e) => {
            // A failed rollback taints the connector
            let _ = connector.rollback().await;
            Err(e)
        }
    }
}

/// Save one row per tick through the local zone until stopped
async fn run_workload(
    router: Arc<ZoneRouter>,
    tick: Duration,
    mut stop: watch::Receiver<bool>,
) -> WorkloadStats {
    let mut stats = WorkloadStats::default();
    let mut next_id: i64 = 1;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = stop.changed() => break,
        }

        let result = save_one(&router, next_id).await;

        match result {
            Ok(()) => {
                stats.committed += 1;
                next_id += 1;
            }
            Err(e) => {
                stats.failed += 1;
                warn!("workload transaction failed: {}", e);
            }
        }
    }
    stats
}

async fn simulate(config: Config, outage: Duration, duration: Duration) -> anyhow::Result<()> {
    let clusters = simulated_clusters(&config);
    let local = clusters
        .get(&Zone::Local)
        .cloned()
        .context("local zone is not configured")?;
    let router = Arc::new(build_router(&config, &clusters).await?);

    let (stop_tx, stop_rx) = watch::channel(false);
    let workload = tokio::spawn(run_workload(
        Arc::clone(&router),
        config.monitor.interval / 4,
        stop_rx,
    ));

    let lead_in = duration.saturating_sub(outage) / 2;
    tokio::time::sleep(lead_in).await;
    info!(?outage, "taking local zone down");
    local.go_down();
    tokio::time::sleep(outage).await;
    local.come_up();
    info!("local zone is back; waiting for the monitor to reconnect");

    tokio::time::sleep(duration.saturating_sub(lead_in + outage)).await;
    let _ = stop_tx.send(true);
    let stats = workload.await.context("workload task failed")?;

    let status = router.monitor_status(Zone::Local)?;
    println!(
        "committed={} failed={} reconnects={} reconnect_failures={} rows={}",
        stats.committed,
        stats.failed,
        status.reconnects,
        status.failures,
        local.rows("workload").len()
    );

    router.shutdown().await;
    Ok(())
}

async fn format_tables(
    config: Config,
    tables: Vec<String>,
    transactional: bool,
) -> anyhow::Result<()> {
    let clusters = simulated_clusters(&config);
    let local = clusters
        .get(&Zone::Local)
        .cloned()
        .context("local zone is not configured")?;

    info!(endpoint = %config.zones.local.connect_string, "formatting simulated local cluster");
    let formatter = StorageFormatter::new(Arc::new(local), &config.format);
    let tables: Vec<&str> = tables.iter().map(String::as_str).collect();
    formatter.format(transactional, &tables).await?;
    println!("formatted {} table(s) on simulated cluster", tables.len());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => check(load_config(&config).await?).await,
        Commands::Simulate {
            config,
            outage,
            duration,
        } => simulate(load_config(&config).await?, outage, duration).await,
        Commands::Format {
            config,
            tables,
            transactional,
        } => format_tables(load_config(&config).await?, tables, transactional).await,
    }
}

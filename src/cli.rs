//! Command-line interface: `serve` runs the broker and schedulers,
//! `resync` rebuilds the analytics store from the graph store.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::broker::Broker;
use crate::config::{self, Config};
use crate::net::{BrokerServer, ServerConfig};
use crate::store::graph::{CypherHttpStore, GraphStore};
use crate::store::{AnalyticsStore, PrimaryStore, now_ms};
use crate::sync::{AnalyticsSyncJob, GraphSyncJob, SyncError, run_reverse_sync, spawn_ticker};
use crate::{Error, Result};

const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Parser)]
#[command(name = "streamhub", version, about = "Single-node topic broker")]
pub struct Cli {
    /// Path to a TOML config file (defaults to ./streamhub.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Accept publish/consume connections and run the replication jobs.
    Serve,
    /// Rebuild the analytics store from the graph store, then exit.
    Resync,
}

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::parse_from(args)
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    Ok(config::load(cli.config.as_deref())?)
}

pub fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Command::Serve => serve(config),
        Command::Resync => resync(config),
    }
}

fn serve(config: Config) -> Result<()> {
    let primary = PrimaryStore::open(&config.stores.primary_path, config.stores.pool_size)?;
    let analytics = AnalyticsStore::open(&config.stores.analytics_path, config.stores.pool_size)?;
    let graph: Arc<dyn GraphStore> = Arc::new(CypherHttpStore::new(&config.graph)?);

    // Constraints are best-effort here: an unreachable graph store must not
    // keep the broker from serving; the sync ticks retry on their own.
    if let Err(err) = graph.ensure_constraints() {
        tracing::warn!("graph constraints not applied: {err}");
    }

    let server = BrokerServer::new(
        Broker::new(primary.clone()),
        ServerConfig {
            bind_addr: format!("{}:{}", config.server.host, config.server.port),
            workers: config.server.workers,
            queue_depth: config.server.queue_depth,
        },
    )
    .start()?;
    tracing::info!(addr = %server.local_addr(), "broker listening");

    let analytics_job = AnalyticsSyncJob::new(primary.clone(), analytics);
    let analytics_ticker = spawn_ticker(
        "analytics-sync",
        Duration::from_millis(config.sync.analytics_interval_ms),
        move |now| analytics_job.tick(now),
    )?;

    let graph_job = GraphSyncJob::new(primary, graph);
    let graph_ticker = spawn_ticker(
        "graph-sync",
        Duration::from_millis(config.sync.graph_interval_ms),
        move |now| graph_job.tick(now),
    )?;

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;

    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(SHUTDOWN_POLL);
    }

    tracing::info!("shutting down");
    graph_ticker.stop();
    analytics_ticker.stop();
    server.shutdown();
    Ok(())
}

fn resync(config: Config) -> Result<()> {
    let analytics = AnalyticsStore::open(&config.stores.analytics_path, config.stores.pool_size)?;
    let graph = CypherHttpStore::new(&config.graph)?;

    match run_reverse_sync(&graph, &analytics, now_ms()) {
        Ok(report) => {
            tracing::info!(%report, "analytics store rebuilt from graph store");
            Ok(())
        }
        Err(err @ SyncError::Partial { .. }) => {
            tracing::error!(
                "reverse sync left the analytics store partially cleared; re-run resync: {err}"
            );
            Err(Error::Sync(err))
        }
        Err(err) => Err(Error::Sync(err)),
    }
}

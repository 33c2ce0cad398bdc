//! cfgstore daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   admin client (cfgstore-cli, web UI)
//!        │ HTTP/TLS + bearer token
//!        ▼
//!   ┌──────────────┐
//!   │ http / admin │  request id, trace span, timeout, body limit
//!   └──────┬───────┘
//!          │ spawn_blocking
//!          ▼
//!   ┌────────────┐  ┌──────────────┐  ┌────────────┐  ┌────────────┐
//!   │   forms    │  │   plugins    │  │   backup   │  │ vfs editor │
//!   └─────┬──────┘  └──┬────────┬──┘  └──┬──────┬──┘  └─────┬──────┘
//!         │            │        │        │      │           │
//!         ▼            ▼        ▼        ▼      ▼           ▼
//!   ┌───────────────────────┐  ┌────────────────────────────────────┐
//!   │ store (ParamStore)    │  │ vfs (mounts + protected-path policy)│
//!   │ ArcSwap maps, backend │  └────────────────────────────────────┘
//!   └───────────────────────┘
//!   cross-cutting: config (+watcher), events, observability, lifecycle
//! ```
//!
//! Exits with [`RESTART_EXIT_CODE`] after a restore so the supervisor
//! starts a fresh process on the restored configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use cfgstore::config::validation::validate_config;
use cfgstore::config::{load_config, ConfigWatcher, ServiceConfig};
use cfgstore::http::{AdminServer, AppState};
use cfgstore::lifecycle::signals::watch_signals;
use cfgstore::lifecycle::{ProcessRestarter, Shutdown, RESTART_EXIT_CODE};
use cfgstore::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "cfgstore")]
#[command(about = "Configuration store daemon", long_about = None)]
struct Args {
    /// Service configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            let config = ServiceConfig::default();
            validate_config(&config)?;
            config
        }
    };

    logging::init_tracing(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cfgstore starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        config_dir = %config.storage.config_dir,
        mounts = config.storage.mounts.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    let restarter = Arc::new(ProcessRestarter::new(
        shutdown.clone(),
        Duration::from_millis(config.timeouts.restart_delay_ms),
    ));
    let state = AppState::with_file_backend(config.clone(), restarter.clone())?;

    // the watcher stops when dropped
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let reload_state = state.clone();
            tokio::spawn(async move {
                while let Some(new_config) = updates.recv().await {
                    reload_state.apply_reload(&new_config);
                }
            });
            Some(watcher.run()?)
        }
        None => None,
    };

    tokio::spawn(watch_signals(shutdown.clone()));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    AdminServer::new(state).run(listener, shutdown).await?;

    if restarter.is_requested() {
        tracing::warn!(code = RESTART_EXIT_CODE, "Exiting for restart");
        std::process::exit(RESTART_EXIT_CODE);
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

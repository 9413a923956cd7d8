//! mc2d — the mc2 daemon.
//!
//! Single binary that assembles:
//! - Controller store (redb)
//! - Marathon client
//! - Git-versioned config workspace (optional)
//! - Controller lifecycle + creation worker
//! - Reconciliation poller
//! - REST API
//!
//! # Usage
//!
//! ```text
//! mc2d serve --config /etc/mc2/mc2.toml --port 8000 --data-dir /var/lib/mc2
//! mc2d check-config --config /etc/mc2/mc2.toml
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use mc2_api::{build_router, ApiState};
use mc2_configs::{ConfigManager, VersionedWorkspace, WorkspaceSettings};
use mc2_core::Mc2Config;
use mc2_lifecycle::{log_hook, ChannelQueue, ControllerLifecycle, JobWorker, ReconciliationPoller};
use mc2_marathon::MarathonClient;
use mc2_state::{ControllerState, StateStore};

const DEFAULT_LOG_FILTER: &str = "info,mc2d=debug,mc2=debug";

#[derive(Parser)]
#[command(name = "mc2d", about = "mc2 controller daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server, creation worker and reconciliation poller.
    Serve {
        /// Path to mc2.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for the controller store (overrides the config file).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Parse and validate a config file, then print the effective settings.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Serve {
            config,
            port,
            data_dir,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.server.data_dir = data_dir;
            }
            config.validate()?;
            run_serve(config).await
        }
        Command::CheckConfig { config } => {
            let config = load_config(Some(&config))?;
            config.validate()?;
            println!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Mc2Config> {
    match path {
        Some(path) => Mc2Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(Mc2Config::default()),
    }
}

async fn run_serve(config: Mc2Config) -> anyhow::Result<()> {
    info!(environment = %config.deploy.environment, "mc2 daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    std::fs::create_dir_all(&config.server.data_dir)?;
    let db_path = config.server.data_dir.join("mc2.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "controller store opened");

    let scheduler = Arc::new(MarathonClient::new(&config.marathon)?);
    info!(host = %config.marathon.host, "marathon client initialized");

    let workspace = match &config.workspace.configs_repo_path {
        Some(path) => {
            let ws = VersionedWorkspace::open(path, WorkspaceSettings::from(&config.workspace)).await?;
            info!(path = %path.display(), "config workspace opened");
            Some(Arc::new(ws))
        }
        None => None,
    };
    let configs = Arc::new(ConfigManager::new(config.deploy.environment.clone(), workspace).await?);

    let (queue, jobs) = ChannelQueue::new();
    let lifecycle = Arc::new(
        ControllerLifecycle::new(
            store.clone(),
            scheduler,
            configs,
            Arc::new(queue),
            config.deploy.hub_domain.clone(),
        )
        .with_hook(log_hook()),
    );

    // Creation jobs don't survive a restart; pick up whatever was pending.
    for controller in store.list_controllers_in(&[ControllerState::Pending])? {
        lifecycle.enqueue_start(&controller.id).await;
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let worker = JobWorker::new(lifecycle.clone(), jobs);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx.clone()));

    let poller = ReconciliationPoller::new(lifecycle.clone(), config.reconcile.interval());
    let poller_shutdown = shutdown_rx.clone();
    let poller_handle = tokio::spawn(async move {
        poller.run(poller_shutdown).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = build_router(ApiState {
        lifecycle,
        logdriver: config.logdriver.clone(),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = worker_handle.await;
    let _ = poller_handle.await;

    info!("mc2 daemon stopped");
    Ok(())
}

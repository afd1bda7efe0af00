use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use taskdock_client::api::TaskApi;
use taskdock_client::config::SyncConfig;
use taskdock_client::engine::SyncEngine;
use taskdock_client::http::HttpTaskApi;
use taskdock_core::reconcile::{self, ServicePolicy};
use taskdock_core::{Status, TaskRecord};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5041";
const OPEN_WAIT_SECS: u64 = 60;

#[derive(Parser)]
#[command(name = "taskdock")]
#[command(about = "Remote task dashboard CLI", long_about = None)]
struct Cli {
    /// Dashboard server base URL (falls back to TASKDOCK_URL).
    #[arg(long, default_value = "")]
    url: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every task and its current status
    List,
    /// Show one task
    Status { name: String },
    /// Start a task
    Open {
        name: String,
        /// Keep probing until the service is reachable
        #[arg(long)]
        wait: bool,
    },
    /// Stop a task
    Close { name: String },
    /// Print the live service URL for a reachable task
    Redirect { name: String },
    /// Follow status changes live until interrupted
    Watch,
    /// Toggle the host monitors
    Monitors {
        #[command(subcommand)]
        action: MonitorCommands,
    },
    /// Shut the host agent down
    Shutdown,
    /// List drive roots
    Drives,
    /// List a directory
    Ls { path: String },
    /// Print the download URL for a file
    DownloadUrl { path: String },
}

#[derive(Subcommand)]
enum MonitorCommands {
    On,
    Off,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn resolve_base_url(arg: &str) -> Result<Url> {
    let raw = if !arg.trim().is_empty() {
        arg.to_string()
    } else if let Ok(value) = env::var("TASKDOCK_URL") {
        value
    } else {
        DEFAULT_BASE_URL.to_string()
    };
    Url::parse(&raw).with_context(|| format!("invalid server URL: {raw}"))
}

fn print_task(record: &TaskRecord) {
    let policy = ServicePolicy::default();
    let mut line = format!("{}: {}", record.name, record.status);
    if let Some(port) = record.port {
        line.push_str(&format!(" (port {port})"));
    }
    if reconcile::redirect_enabled(record, policy) {
        line.push_str(" [redirect ready]");
    }
    println!("{line}");
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let base_url = resolve_base_url(&cli.url)?;
    let api = Arc::new(HttpTaskApi::new(base_url.clone()).context("building HTTP client")?);

    match cli.command {
        Commands::List => {
            let names = api.list_tasks().await.context("listing tasks")?;
            let records = api.snapshot().await.context("loading snapshot")?;
            for name in names {
                let record = records
                    .iter()
                    .find(|record| record.name == name)
                    .cloned()
                    .unwrap_or_else(|| TaskRecord::closed(&name));
                print_task(&record);
            }
        }
        Commands::Status { name } => {
            let record = api.fetch(&name).await.context("fetching task")?;
            print_task(&record);
        }
        Commands::Open { name, wait } => {
            if wait {
                open_and_wait(base_url, api, &name).await?;
            } else {
                let record = api.open(&name).await.context("opening task")?;
                let record = api.fetch(&name).await.unwrap_or(record);
                print_task(&record);
            }
        }
        Commands::Close { name } => {
            api.close(&name).await.context("closing task")?;
            println!("{name}: closed");
        }
        Commands::Redirect { name } => {
            let record = api.fetch(&name).await.context("fetching task")?;
            let policy = ServicePolicy::default();
            if !reconcile::has_redirect_capability(&record, policy) {
                anyhow::bail!("{name} has no service endpoint to redirect to");
            }
            if !reconcile::redirect_enabled(&record, policy) {
                anyhow::bail!("{name} is not reachable yet (status {})", record.status);
            }
            println!("{}", api.redirect_url(&name));
        }
        Commands::Watch => watch(base_url, api).await?,
        Commands::Monitors { action } => {
            let on = matches!(action, MonitorCommands::On);
            api.set_monitors(on).await.context("toggling monitors")?;
        }
        Commands::Shutdown => {
            api.shutdown_host().await.context("shutting host down")?;
        }
        Commands::Drives => {
            let drives = api.drives().await.context("listing drives")?;
            for drive in drives.drives {
                println!("{drive}");
            }
        }
        Commands::Ls { path } => {
            let listing = api.list_dir(&path).await.context("listing directory")?;
            for entry in listing.files {
                if entry.is_dir {
                    println!("[{}]", entry.name);
                } else {
                    println!("{}", entry.name);
                }
            }
        }
        Commands::DownloadUrl { path } => {
            println!("{}", api.download_url(&path));
        }
    }

    Ok(())
}

/// Open through the engine and block until the service is reachable.
async fn open_and_wait(base_url: Url, api: Arc<HttpTaskApi>, name: &str) -> Result<()> {
    let config = SyncConfig::new(base_url);
    let policy = config.policies.resolve(name);
    let handle = SyncEngine::spawn(config, api)
        .await
        .context("starting sync engine")?;
    handle.open(name).await;

    let mut tasks = handle.watch_tasks();
    let ready = tokio::time::timeout(Duration::from_secs(OPEN_WAIT_SECS), async {
        loop {
            {
                let map = tasks.borrow_and_update();
                if let Some(record) = map.get(name) {
                    let done = if policy.needs_probe {
                        reconcile::redirect_enabled(record, policy)
                    } else {
                        record.status.is_open() && record.status != Status::Loading
                    };
                    if done {
                        return Some(record.clone());
                    }
                }
            }
            if tasks.changed().await.is_err() {
                return None;
            }
        }
    })
    .await;

    handle.shutdown().await;
    match ready {
        Ok(Some(record)) => {
            print_task(&record);
            Ok(())
        }
        Ok(None) => Err(anyhow::anyhow!(
            "engine stopped before {name} became ready"
        )),
        Err(_) => Err(anyhow::anyhow!(
            "{name} did not become reachable within {OPEN_WAIT_SECS}s"
        )),
    }
}

/// Run the engine and print every status change until Ctrl-C.
async fn watch(base_url: Url, api: Arc<HttpTaskApi>) -> Result<()> {
    let config = SyncConfig::new(base_url);
    let handle = SyncEngine::spawn(config, api)
        .await
        .context("starting sync engine")?;
    let mut tasks = handle.watch_tasks();

    let mut previous = tasks.borrow_and_update().clone();
    let mut names: Vec<_> = previous.keys().cloned().collect();
    names.sort();
    for name in &names {
        if let Some(record) = previous.get(name) {
            print_task(record);
        }
    }
    info!("watching for status changes; Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = tasks.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = tasks.borrow_and_update().clone();
                for (name, record) in current.iter() {
                    let before = previous.get(name);
                    if before.map(|task| (task.status, task.port)) != Some((record.status, record.port)) {
                        print_task(record);
                    }
                }
                previous = current;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

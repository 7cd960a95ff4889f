//! segfetch - drives fetch/transcode tasks from the command line.

mod args;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use segfetch_core::config::LoggingConfig;
use segfetch_core::{
    load_config_or_defaults, metrics, store_playlist_upload, validate_config, Config,
    HttpPlaylistFetcher, InMemoryTaskStore, LogFormat, OrchestratorConfig, Task, TaskOrchestrator,
    TaskStatus, TaskStore,
};

use args::{output_names, Cli, Command, DEFAULT_CONFIG_FILE};

/// How often task status is polled while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Everything a command needs.
struct App {
    config: Config,
    store: Arc<InMemoryTaskStore>,
    orchestrator: TaskOrchestrator,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let store = Arc::new(InMemoryTaskStore::new(&config.storage.download_dir));
        let fetcher = HttpPlaylistFetcher::new(&config.network)
            .context("Failed to build HTTP client")?;
        let orchestrator = TaskOrchestrator::new(
            OrchestratorConfig::from_config(&config),
            Arc::clone(&store) as Arc<dyn TaskStore>,
            Arc::new(fetcher),
        );
        Ok(Self {
            config,
            store,
            orchestrator,
        })
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    });
    let config = load_config_or_defaults(config_path.as_deref())
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_tracing(&config.logging);
    validate_config(&config).context("Invalid configuration")?;
    if let Some(path) = &config_path {
        info!("Loaded configuration from {:?}", path);
    }

    let app = App::new(config)?;
    let success = match cli.command {
        Command::Fetch { locators, outputs } => fetch(&app, &locators, &outputs).await?,
        Command::Upload { file, output } => upload(&app, &file, output).await?,
        Command::Check => check(&app).await?,
    };

    if cli.metrics {
        eprint!("{}", metrics::gather_text());
    }

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// Creates one task per locator, starts them all and waits for the outcome.
async fn fetch(app: &App, locators: &[String], outputs: &[String]) -> Result<bool> {
    if outputs.len() > locators.len() {
        warn!(
            "{} output names given for {} locators; extra names are ignored",
            outputs.len(),
            locators.len()
        );
    }

    let names = output_names(locators.len(), outputs, chrono::Local::now());
    let mut ids = Vec::with_capacity(locators.len());
    for (locator, name) in locators.iter().zip(&names) {
        let task = app
            .store
            .create(locator, name)
            .with_context(|| format!("Cannot create task for {locator}"))?;
        ids.push(task.id);
    }

    for id in &ids {
        // Runs are detached; their outcome is read back from the registry.
        app.orchestrator
            .start(id)
            .with_context(|| format!("Failed to start task {id}"))?;
    }

    let tasks = tokio::select! {
        tasks = wait_for_tasks(app.store.as_ref(), &ids, POLL_INTERVAL) => tasks?,
        _ = shutdown_signal() => {
            warn!("Interrupted, abandoning {} running task(s)", app.orchestrator.active_runs().len());
            return Ok(false);
        }
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&tasks).context("Failed to serialize tasks")?
    );

    let failed: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .collect();
    for task in &failed {
        error!(
            task_id = %task.id,
            "{} failed: {}",
            task.output_file_name,
            task.error_detail.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(failed.is_empty())
}

/// Stores a local playlist the way an upload is stored, then fetches it.
async fn upload(app: &App, file: &Path, output: Option<String>) -> Result<bool> {
    let contents = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {:?}", file))?;
    let original_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let stored = store_playlist_upload(&app.config.storage.upload_dir, &original_name, &contents)
        .await
        .with_context(|| format!("Failed to ingest {:?}", file))?;
    info!("Upload stored at {:?}", stored);

    let locator = stored.to_string_lossy().into_owned();
    fetch(app, &[locator], &output.into_iter().collect::<Vec<_>>()).await
}

async fn check(app: &App) -> Result<bool> {
    app.orchestrator
        .validate()
        .await
        .context("Tool validation failed")?;
    println!("configuration and tools OK");
    Ok(true)
}

/// Polls the registry until every task in `ids` is terminal, printing status
/// changes to stderr.
async fn wait_for_tasks(
    store: &dyn TaskStore,
    ids: &[String],
    interval: Duration,
) -> Result<Vec<Task>> {
    let mut last_seen: Vec<Option<(TaskStatus, u8)>> = vec![None; ids.len()];
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let mut snapshots = Vec::with_capacity(ids.len());
        for (id, seen) in ids.iter().zip(last_seen.iter_mut()) {
            let task = store
                .get(id)?
                .with_context(|| format!("Task {id} disappeared from the registry"))?;
            let current = (task.status, task.progress);
            if *seen != Some(current) {
                eprintln!(
                    "{} {:<11} {:>3}%",
                    task.output_file_name,
                    task.status.as_str(),
                    task.progress
                );
                *seen = Some(current);
            }
            snapshots.push(task);
        }

        if snapshots.iter().all(|t| t.status.is_terminal()) {
            return Ok(snapshots);
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

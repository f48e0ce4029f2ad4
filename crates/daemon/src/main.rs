//! FileDrop Daemon
//!
//! Receives files over WebSocket and stores them in a local directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use daemon::config::{default_config_path, Config};
use daemon::orchestrator::{DaemonOrchestrator, OrchestratorEvent};
use daemon::platform::{
    DirectorySelector, FileTimeMetadata, FixedDirectory, NoDirectory, PromptDirectory,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Name of the rolling log file written when `log_dir` is configured.
const LOG_FILE_NAME: &str = "filedrop-daemon.log";

/// FileDrop Daemon - receives file uploads over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "filedrop-daemon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start receiving files
    Start {
        /// Directory to save received files into
        #[arg(long, value_name = "DIR")]
        save_dir: Option<PathBuf>,

        /// Port to listen on
        #[arg(long, short)]
        port: Option<u16>,

        /// Address to bind to
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,

        /// Ask for the save directory on the terminal
        #[arg(long, conflicts_with = "save_dir")]
        prompt: bool,
    },

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let file_config = Config::load(&config_path)?;

    let (_log_guard, filter) = init_tracing(&file_config, cli.verbose)?;
    tracing::debug!("Using config file: {:?}", config_path);
    let mut config = apply_overrides(file_config, &filter, cli.verbose)?;

    match cli.command {
        Commands::Start {
            save_dir,
            port,
            bind,
            prompt,
        } => {
            if let Some(dir) = save_dir {
                config.storage.save_dir = Some(dir);
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(bind) = bind {
                config.server.bind_address = bind;
            }

            config.validate()?;
            run_daemon(config, prompt).await?;
        }
        Commands::Config(ConfigCommands::Init { force }) => {
            init_config(&config_path, force)?;
        }
        Commands::Config(ConfigCommands::Show) => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Handle for swapping the log filter once environment overrides are known.
type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// `--verbose` wins over `RUST_LOG`, which wins over the configured level.
fn log_filter(log_level: &str, verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
    }
}

/// Set up logging to stderr and, when configured, a daily rolling file.
///
/// The returned guard must be kept alive to flush the file writer.
fn init_tracing(
    config: &Config,
    verbose: bool,
) -> anyhow::Result<(Option<WorkerGuard>, FilterHandle)> {
    let (filter, handle) = reload::Layer::new(log_filter(&config.daemon.log_level, verbose));

    let (file_layer, guard) = match &config.daemon.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok((guard, handle))
}

/// Apply `FILEDROP_*` overrides with logging live, then refresh the filter
/// in case the log level changed.
fn apply_overrides(
    mut config: Config,
    filter: &FilterHandle,
    verbose: bool,
) -> anyhow::Result<Config> {
    config.apply_env_overrides();
    filter
        .reload(log_filter(&config.daemon.log_level, verbose))
        .context("Failed to update log filter")?;
    Ok(config)
}

/// Write the default configuration file.
fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    Config::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Pick the directory selector for the configured source.
fn directory_selector(config: &Config, prompt: bool) -> Box<dyn DirectorySelector> {
    match (&config.storage.save_dir, prompt) {
        (_, true) => Box::new(PromptDirectory),
        (Some(dir), false) => Box::new(FixedDirectory(dir.clone())),
        (None, false) => Box::new(NoDirectory),
    }
}

/// Select the save directory, start listening and run until a shutdown signal.
async fn run_daemon(config: Config, prompt: bool) -> anyhow::Result<()> {
    let selector = directory_selector(&config, prompt);
    let save_dir = tokio::task::spawn_blocking(move || selector.select_directory())
        .await
        .context("Directory selection failed")?;

    let Some(save_dir) = save_dir else {
        anyhow::bail!(
            "No save directory selected; pass --save-dir, set [storage].save_dir or use --prompt"
        );
    };

    tracing::info!(save_dir = %save_dir.display(), "FileDrop daemon starting...");

    let mut orchestrator = DaemonOrchestrator::new(config, save_dir, Arc::new(FileTimeMetadata))?;
    orchestrator.start().await?;

    // Subscribe to orchestrator events for logging
    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                OrchestratorEvent::StateChanged(state) => {
                    tracing::info!("Orchestrator state: {:?}", state);
                }
                OrchestratorEvent::FileSaved { path, bytes, .. } => {
                    tracing::debug!(path = %path.display(), bytes, "Transfer complete");
                }
                other => tracing::trace!(event = ?other, "Orchestrator event"),
            }
        }
    });

    if let Some(addr) = orchestrator.local_addr() {
        tracing::info!("Listening on ws://{}", addr);
    }

    wait_for_shutdown_signal().await?;
    tracing::info!("Received shutdown signal");

    orchestrator.stop().await?;
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}

/// Wait for Ctrl-C.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    Ok(())
}

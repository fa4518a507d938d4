//! Top-level CLI definition and dispatch.

use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;
use tracing::info;

use log_file_watcher::core::config::{Config, SeedPolicy};
use log_file_watcher::core::errors::LfwError;
use log_file_watcher::core::logging::init_tracing;
use log_file_watcher::daemon::service::run_daemon;

/// Log File Watcher: follows container-log symlinks and exports bytes logged per path.
#[derive(Debug, Parser)]
#[command(
    name = "log-file-watcher",
    author,
    version,
    about = "Follows log symlinks in a directory and serves per-path bytes-logged counters",
    long_about = None
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Directory whose log symlinks are followed.
    #[arg(long = "logfilespathname", value_name = "DIR")]
    log_files_path: Option<PathBuf>,
    /// Trace every event, transition and size check.
    #[arg(long)]
    debug: bool,
    /// Metrics listen address (`:2112` or `host:port`).
    #[arg(long = "listeningport", value_name = "ADDR")]
    listening_port: Option<String>,
    /// Only names containing this substring are followed (empty disables filtering).
    #[arg(long, value_name = "SUBSTRING")]
    name_filter: Option<String>,
    /// How files found at startup are counted: `count` or `baseline`.
    #[arg(long, value_name = "POLICY")]
    seed_policy: Option<SeedPolicy>,
    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    check_config: bool,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded or is invalid.
    #[error("{0}")]
    Config(String),
    /// Startup or steady-state failure of the watcher.
    #[error("{0}")]
    Runtime(String),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
        }
    }
}

impl From<LfwError> for CliError {
    fn from(err: LfwError) -> Self {
        if err.is_config_error() {
            Self::Config(err.to_string())
        } else {
            Self::Runtime(err.to_string())
        }
    }
}

impl Cli {
    /// File and environment configuration with this invocation's flags on top.
    fn effective_config(&self) -> Result<Config, CliError> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(dir) = &self.log_files_path {
            config.watch.root_dir.clone_from(dir);
        }
        if let Some(filter) = &self.name_filter {
            config.watch.name_filter.clone_from(filter);
        }
        if let Some(policy) = self.seed_policy {
            config.watch.seed_policy = policy;
        }
        if let Some(addr) = &self.listening_port {
            config.metrics.listen_addr.clone_from(addr);
        }
        if self.debug {
            config.logging.debug = true;
        }
        config.normalize_paths();
        config.validate()?;
        Ok(config)
    }
}

/// Load configuration, then either print it or run the watcher until shutdown.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    let config = cli.effective_config()?;
    let config_hash = config.stable_hash()?;

    if cli.check_config {
        let rendered = config.to_toml()?;
        let mut out = io::stdout().lock();
        writeln!(out, "# config hash: {config_hash}")?;
        write!(out, "{rendered}")?;
        return Ok(());
    }

    init_tracing(&config.logging)?;
    info!(
        config_hash = %config_hash,
        config_file = ?config.config_file,
        root = %config.watch.root_dir.display(),
        name_filter = ?config.watch.name_filter(),
        seed_policy = %config.watch.seed_policy,
        listen_addr = %config.metrics.listen_addr,
        debug = config.logging.debug,
        "starting log file watcher"
    );

    let stats = run_daemon(&config)?;
    info!(
        events = stats.events,
        bytes_counted = stats.bytes_counted,
        "clean shutdown"
    );
    Ok(())
}

//! partsync CLI - Incremental part-based backup and restore
//!
//! Provides commands for:
//! - Backing up a local snapshot to a remote backend
//! - Restoring a remote backup into a local directory
//! - Replicating a backup between remotes
//! - Inspecting the configuration

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    backup::BackupCommand, config::ConfigCommand, copy::CopyCommand, restore::RestoreCommand,
};
use output::{get_formatter, OutputFormat};
use partsync_core::config::{Config, ConfigBuilder};
use partsync_engine::EngineError;

#[derive(Debug, Parser)]
#[command(
    name = "partsync",
    version,
    about = "Incremental part-based backup and restore for large data directories"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Number of parts transferred in parallel
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Limit on bytes per second read from or written to the local snapshot
    #[arg(long, global = true)]
    max_bytes_per_second: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Back up a local snapshot to a remote backend
    Backup(BackupCommand),
    /// Restore a remote backup into a local directory
    Restore(RestoreCommand),
    /// Copy a backup from one remote to another
    Copy(CopyCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }

    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Loads the config file and applies command-line overrides.
    ///
    /// An explicitly named file must exist; the default one is optional.
    /// Every command except `config` requires the result to be valid.
    fn load_config(&self) -> Result<Config> {
        let path = self.config_path();
        let file_config = if self.config.is_some() {
            Config::load(&path)?
        } else {
            Config::load_or_default(&path)
        };

        let mut builder = ConfigBuilder::from_config(file_config);
        if let Some(concurrency) = self.concurrency {
            builder = builder.concurrency(concurrency);
        }
        if let Some(limit) = self.max_bytes_per_second {
            builder = builder.max_bytes_per_second(Some(limit));
        }
        // `config show` and `config validate` report problems themselves
        if matches!(self.command, Commands::Config(_)) {
            return Ok(builder.build());
        }
        builder.build_validated().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow::anyhow!("invalid configuration: {}", messages.join("; "))
        })
    }

    async fn run(&self, config: &Config) -> Result<()> {
        let format = self.format();
        match &self.command {
            Commands::Backup(cmd) => cmd.execute(config, format).await,
            Commands::Restore(cmd) => cmd.execute(config, format).await,
            Commands::Copy(cmd) => cmd.execute(config, format).await,
            Commands::Config(cmd) => cmd.execute(config, &self.config_path(), format).await,
        }
    }
}

/// Sets up tracing on stderr so stdout stays reserved for results.
///
/// `RUST_LOG` wins over `-v`, which wins over `logging.level`.
fn init_tracing(cli: &Cli, config: &Config) {
    let level = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let formatter = get_formatter(cli.format());

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(err) => {
            formatter.error(&format!("{err:#}"));
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&cli, &config);

    // dropping the run on interrupt releases any snapshot lock it holds
    let result = tokio::select! {
        result = cli.run(&config) => result,
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => Err(EngineError::Interrupted.into()),
            Err(err) => Err(err).context("cannot listen for interrupts"),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            formatter.error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

//! treedriver command-line front-end.
//!
//! Exposes the command runner's operations one-to-one: raw `exec`, revision
//! listing, forced checkout, and `gclient sync`. Diagnostics (including the
//! per-command timing lines) go to stderr; command results go to stdout.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use treedriver_core::config::TreedriverConfig;
use treedriver_core::paths::expand_path;
use treedriver_core::revision::{RevisionRange, DEFAULT_FROM, DEFAULT_TO};
use treedriver_core::runner::CommandRunner;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Drive a local source checkout through git and gclient.
#[derive(Parser, Debug)]
#[command(name = "treedriver", version)]
struct Cli {
    /// Path to the TOML configuration file (`~` is expanded).
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Checkout to operate on; overrides `runner.workdir` from the config.
    #[arg(short = 'C', long, global = true)]
    workdir: Option<String>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a shell command in the checkout and print its stdout.
    Exec {
        /// Command line, passed to the shell verbatim.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// List commits in `from..to` as `hash<TAB>subject`.
    Revisions {
        /// Exclusive lower bound.
        #[arg(long, default_value = DEFAULT_FROM)]
        from: String,

        /// Inclusive upper bound.
        #[arg(long, default_value = DEFAULT_TO)]
        to: String,

        /// Print a JSON array instead of tab-separated lines.
        #[arg(long)]
        json: bool,
    },

    /// Force-checkout a ref, discarding local modifications.
    Checkout {
        /// Branch, tag, or commit hash.
        reference: String,
    },

    /// Run `gclient sync` in the checkout.
    Sync,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.runner.log_level);
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: &TreedriverConfig) -> Result<()> {
    let runner = CommandRunner::from_config(config);
    debug!(root = %runner.root().display(), "runner ready");

    match command {
        Commands::Exec { command } => cmd_exec(&runner, &command.join(" ")).await,
        Commands::Revisions { from, to, json } => {
            cmd_revisions(&runner, RevisionRange::new(from, to), json).await
        }
        Commands::Checkout { reference } => runner
            .checkout(&reference)
            .await
            .with_context(|| format!("failed to check out {}", reference)),
        Commands::Sync => runner.gclient_sync().await.context("gclient sync failed"),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// Build the effective config: file (if any), then `--workdir`, then validate.
fn load_config(cli: &Cli) -> Result<TreedriverConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let path: PathBuf = expand_path(path);
            TreedriverConfig::load_from_file(&path)
                .with_context(|| format!("failed to load configuration file {}", path.display()))?
        }
        None => TreedriverConfig::default(),
    };

    if let Some(workdir) = &cli.workdir {
        config.runner.workdir = workdir.clone();
    }

    config
        .validate()
        .context("configuration validation failed (pass --workdir or set runner.workdir)")?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_exec(runner: &CommandRunner, command: &str) -> Result<()> {
    let stdout = runner.exec_default(command).await?;
    let mut out = std::io::stdout().lock();
    out.write_all(stdout.as_bytes())?;
    out.flush()?;
    Ok(())
}

async fn cmd_revisions(runner: &CommandRunner, range: RevisionRange, json: bool) -> Result<()> {
    let records = runner
        .revision_list(&range)
        .await
        .with_context(|| format!("failed to list revisions {}", range))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for record in &records {
            println!("{}\t{}", record.hash, record.subject);
        }
    }
    Ok(())
}

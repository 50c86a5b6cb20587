//! Command-line entry point for installing the Ambassador Edge Stack.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgestack_core::InstallerConfig;
use edgestack_installer::logging::init_tracing;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Read settings from this file instead of the default config location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install the Ambassador Edge Stack in your cluster.
    Install {
        /// The Kubernetes context to use. Defaults to the current kubectl context.
        #[arg(short, long)]
        context: Option<String>,
        /// Show all output. Defaults to sending most output to the logfile.
        #[arg(short, long)]
        verbose: bool,
        /// Do not send anonymous usage reports.
        #[arg(long)]
        no_report: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<InstallerConfig> {
    let config = match path {
        Some(path) => InstallerConfig::load_from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => InstallerConfig::load_default().context("failed to load config")?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    match args.command {
        Command::Install {
            context,
            verbose,
            no_report,
        } => {
            let log_path = init_tracing(&config, verbose)?;
            tracing::info!(log = %log_path.display(), "edgectl install");
            let result =
                edgestack_installer::run_installation(config, context, !no_report).await?;
            if result.error.is_some() {
                println!();
                println!("Full logs at {}", log_path.display());
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

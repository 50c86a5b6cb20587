//! Tracing setup: every run logs to a file; `--verbose` mirrors to stderr.

use std::env;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;
use edgestack_core::InstallerConfig;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Target of operator-facing lines, which stdout already shows.
const SHOW_TARGET: &str = "show";

pub fn log_file_path() -> PathBuf {
    let name = Local::now()
        .format("edgectl-install-%Y%m%d-%H%M%S.log")
        .to_string();
    env::temp_dir().join(name)
}

/// Install the global subscriber and return the log file path.
pub fn init_tracing(config: &InstallerConfig, verbose: bool) -> Result<PathBuf> {
    let path = log_file_path();
    let file = File::create(&path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            config
                .general
                .log_level
                .clone()
                .unwrap_or_else(|| "info".to_string()),
        )
    });

    let file_layer = fmt::layer().with_writer(Mutex::new(file)).with_ansi(false);
    let stderr_layer = verbose.then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_filter(filter_fn(|meta| meta.target() != SHOW_TARGET))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(path)
}

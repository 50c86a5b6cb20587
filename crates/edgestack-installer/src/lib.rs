//! Installs the Ambassador Edge Stack into the current Kubernetes cluster and,
//! when the cluster is reachable from the Internet, configures TLS for it.

mod cancel;
mod classify;
pub mod collaborators;
mod installer;
pub mod logging;
pub mod messages;
mod outcome;
mod poll;
mod process;
mod prompt;
mod result;
mod state;

use anyhow::Result;
use edgestack_core::InstallerConfig;
use tokio_util::sync::CancellationToken;

pub use classify::{classify_acme_failure, classify_cluster, find_image_tag};
pub use collaborators::Collaborators;
pub use installer::Installer;
pub use outcome::{PollFailure, StageOutcome};
pub use poll::{PollPolicy, Poller};
pub use result::{InstallResult, ResultKind};

/// Run one installation against the real cluster tooling. Interrupt signals
/// cancel the run; the returned result has already been shown.
pub async fn run_installation(
    config: InstallerConfig,
    context_override: Option<String>,
    report: bool,
) -> Result<InstallResult> {
    let collab = Collaborators::system(&config, context_override, report)?;
    let cancel = CancellationToken::new();
    let watcher = cancel::spawn_watcher(collab.telemetry.clone(), cancel.clone());

    let installer = Installer::new(config, collab, cancel.clone())?;
    let result = installer.run_installation().await;

    cancel.cancel();
    if let Err(err) = watcher.await {
        tracing::debug!(error = %err, "interrupt watcher ended abnormally");
    }
    Ok(result)
}

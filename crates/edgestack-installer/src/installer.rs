//! The staged installation workflow.
//!
//! Stages run strictly in order on one task. Each returns early with a
//! terminal [`InstallResult`] when the run cannot continue; retrying, when a
//! stage needs it, happens inside the stage through the [`Poller`].

#[path = "installer_preflight.rs"]
mod installer_preflight;
#[path = "installer_release.rs"]
mod installer_release;
#[path = "installer_rollout.rs"]
mod installer_rollout;
#[path = "installer_tls.rs"]
mod installer_tls;

use std::future::Future;

use anyhow::{Context, Result};
use edgestack_core::InstallerConfig;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::collaborators::{Collaborators, Meta};
use crate::messages;
use crate::outcome::{PollFailure, StageOutcome};
use crate::poll::{PollPolicy, Poller};
use crate::result::InstallResult;
use crate::state::RunState;

/// A stage either hands its product to the next one or ends the run.
type Stage<T = ()> = std::result::Result<T, InstallResult>;

/// Error for a failed wait, carrying the last reason a timed-out check gave.
fn poll_error(failure: PollFailure) -> anyhow::Error {
    match &failure {
        PollFailure::TimedOut {
            last_cause: Some(cause),
            ..
        } => anyhow::anyhow!("{failure}: {cause}"),
        _ => anyhow::Error::new(failure),
    }
}

pub struct Installer {
    config: InstallerConfig,
    collab: Collaborators,
    poller: Poller,
    cancel: CancellationToken,
    fast: PollPolicy,
    slow: PollPolicy,
}

impl Installer {
    pub fn new(
        config: InstallerConfig,
        collab: Collaborators,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let fast = PollPolicy::try_from(config.polling.fast).context("invalid fast poll timings")?;
        let slow = PollPolicy::try_from(config.polling.slow).context("invalid slow poll timings")?;
        let poller = Poller::new(collab.console.clone(), cancel.clone());
        Ok(Self {
            config,
            collab,
            poller,
            cancel,
            fast,
            slow,
        })
    }

    /// Perform one installation attempt and show its result.
    pub async fn run_installation(&self) -> InstallResult {
        let telemetry = &self.collab.telemetry;
        if telemetry.disabled() {
            self.show(messages::TELEMETRY_DISABLED);
        }
        info!(
            install_id = %telemetry.install_id(),
            trace_id = %telemetry.trace_id(),
            "starting installation"
        );

        let mut state = RunState::default();
        let result = self.perform(&mut state).await;
        self.show_result(&result).await;
        result
    }

    pub async fn perform(&self, state: &mut RunState) -> InstallResult {
        match self.stages(state).await {
            Ok(result) | Err(result) => result,
        }
    }

    async fn stages(&self, state: &mut RunState) -> Stage<InstallResult> {
        self.report("install", Meta::new()).await;
        self.show("");
        self.show(&self.bold(messages::WELCOME));

        state.email = self.collect_email().await?;
        self.show(messages::SEPARATOR);
        self.show(messages::BEGINNING);
        self.show("");

        self.check_cluster_access().await?;
        self.record_versions(state).await;
        self.classify_environment(state).await;
        self.classify_existing(state).await;

        let rule = self.choose_version_rule(state).await?;
        self.fetch_release(state, &rule).await?;
        self.deploy(state).await?;
        self.await_aes_pod(state).await?;

        if state.is_local_cluster() {
            return Ok(self.local_cluster_result());
        }

        self.await_load_balancer(state).await?;
        self.await_acme_listener(state).await?;
        if let Some(no_tls) = self.register_domain(state).await? {
            return Ok(no_tls);
        }
        self.await_dns_propagation(state).await?;
        self.apply_host(state).await?;
        self.await_certificate(state).await?;
        self.celebrate(state);
        self.check_health(state).await;

        Ok(InstallResult::success())
    }

    /// Print the final message, docs link, and error, and report the result's
    /// event if it carries one.
    pub async fn show_result(&self, result: &InstallResult) {
        if let Some(event) = result.report {
            self.report(event, Meta::new()).await;
        }
        if !result.message.is_empty() {
            self.show("");
            self.show_wrapped(&result.message);
        }
        if let Some(url) = result.docs_url {
            self.show_wrapped(&messages::see_docs(url));
        }
        if let Some(err) = &result.error {
            self.show("");
            self.show_wrapped(&format!("Error: {err:#}"));
        }
    }

    async fn wait_for<T, F, Fut>(
        &self,
        what: &str,
        policy: PollPolicy,
        check: F,
    ) -> std::result::Result<T, PollFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StageOutcome<T>>,
    {
        self.poller.until(what, policy, check).await
    }

    async fn report(&self, event: &str, meta: Meta) {
        self.collab.telemetry.report(event, meta).await;
    }

    fn set_metadatum(&self, state: &mut RunState, key: &str, value: impl Into<Value>) {
        let value = value.into();
        state.metadata.insert(key.to_string(), value.clone());
        self.collab.telemetry.set_metadatum(key, value);
    }

    fn show(&self, line: &str) {
        self.collab.console.show(line);
    }

    fn show_wrapped(&self, text: &str) {
        self.collab.console.show_wrapped(text);
    }

    fn bold(&self, text: &str) -> String {
        self.collab.console.bold(text)
    }

    fn open_browser(&self, url: &str) {
        if let Err(err) = self.collab.browser.open(url) {
            tracing::warn!(url, error = %format!("{err:#}"), "failed to open browser");
        }
    }

    fn namespace(&self) -> &str {
        &self.config.install.namespace
    }
}

#[cfg(test)]
#[path = "installer_tests.rs"]
mod tests;

//! Choosing, fetching, and installing the chart release.

use anyhow::anyhow;
use edgestack_core::{
    ExistingInstallation, InstallMethod, VersionRule, ENV_CHART_VERSION_RULE, ENV_HELM_REPO,
    ENV_IMAGE_REPOSITORY, ENV_IMAGE_TAG,
};
use serde_json::json;
use tracing::{info, warn};

use super::{Installer, Stage};
use crate::collaborators::Meta;
use crate::messages;
use crate::result::InstallResult;
use crate::state::RunState;

/// Version of an installation detected through the chart manager, which
/// does not report one.
const UNKNOWN_VERSION: &str = "unknown";

impl Installer {
    /// Pick the version rule. An explicit rule wins over image overrides; the
    /// overrides only apply on top of the newest release.
    pub(super) async fn choose_version_rule(&self, state: &mut RunState) -> Stage<VersionRule> {
        let overrides = &self.config.overrides;
        state.chart_values = self.config.install.chart_values();

        let raw_rule = match &overrides.chart_version_rule {
            Some(rule) => {
                self.show_wrapped(&format!(
                    "Overriding Chart version rule from {ENV_CHART_VERSION_RULE:?}: {rule}."
                ));
                if overrides.image_repository.is_some() || overrides.image_tag.is_some() {
                    self.show_wrapped(&format!(
                        "Ignoring {ENV_IMAGE_REPOSITORY:?} and {ENV_IMAGE_TAG:?}: \
                         they cannot be combined with a Chart version rule."
                    ));
                }
                rule.as_str()
            }
            None => {
                if let Some(repository) = &overrides.image_repository {
                    self.show_wrapped(&format!(
                        "Overriding image repo from {ENV_IMAGE_REPOSITORY:?}: {repository}."
                    ));
                    state
                        .chart_values
                        .insert("image.repository".to_string(), repository.clone());
                }
                if let Some(tag) = &overrides.image_tag {
                    self.show_wrapped(&format!(
                        "Overriding image tag from {ENV_IMAGE_TAG:?}: {tag}."
                    ));
                    state
                        .chart_values
                        .insert("image.tag".to_string(), tag.clone());
                }
                "*"
            }
        };

        match VersionRule::parse(raw_rule) {
            Ok(rule) => Ok(rule),
            Err(err) => {
                self.report("fail_no_internet", vec![("err", json!(err.to_string()))])
                    .await;
                Err(InstallResult::unhandled(
                    anyhow!(err).context("download AES CRD manifests"),
                ))
            }
        }
    }

    pub(super) async fn fetch_release(&self, state: &mut RunState, rule: &VersionRule) -> Stage {
        if let Some(repo) = &self.config.overrides.helm_repo {
            self.show_wrapped(&format!(
                "Overriding Helm repo from {ENV_HELM_REPO:?}: {repo}."
            ));
        }
        self.show_wrapped("-> Checking latest version of Ambassador Edge Stack available...");

        let release = match self.collab.charts.resolve(rule).await {
            Ok(release) => release,
            Err(err) => {
                self.report("fail_no_internet", vec![("err", json!(format!("{err:#}")))])
                    .await;
                return Err(InstallResult::unhandled(
                    err.context("download AES CRD manifests"),
                ));
            }
        };
        if let Err(err) = self.collab.charts.download(&release).await {
            self.report("fail_download", vec![("err", json!(format!("{err:#}")))])
                .await;
            return Err(InstallResult::unhandled(err.context("download AES chart")));
        }

        state.version = release.app_version.clone();
        state.release = Some(release);
        Ok(())
    }

    /// Refuse to touch installations this tool cannot manage, adopt a plain
    /// Helm one, and install otherwise.
    pub(super) async fn deploy(&self, state: &mut RunState) -> Stage {
        if state.existing.is_none() {
            self.show_wrapped("-> Checking previous installations...");
            match self.collab.charts.is_already_installed().await {
                Ok(false) => {}
                Ok(true) => {
                    self.show_wrapped(
                        "-> Ambassador Edge Stack was already installed with this tool.",
                    );
                    state.existing = Some(ExistingInstallation {
                        version: UNKNOWN_VERSION.to_string(),
                        method: InstallMethod::SelfManaged,
                    });
                }
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "failed to look up chart release");
                    self.report("fail_download", vec![("err", json!(format!("{err:#}")))])
                        .await;
                    return Err(InstallResult::unhandled(err));
                }
            }
        }

        match state.existing.clone() {
            Some(existing) => self.adopt_or_abort(state, existing).await,
            None => self.install_release(state).await,
        }
    }

    async fn adopt_or_abort(&self, state: &mut RunState, existing: ExistingInstallation) -> Stage {
        state.already_installed = true;
        self.show_wrapped(&format!(
            "-> Found an existing installation of Ambassador Edge Stack {} [{}].",
            existing.version, existing.method
        ));
        self.report("deploy", vec![("already_installed", json!(true))])
            .await;
        self.set_metadatum(state, "managed", existing.method.as_str());
        let versions: Meta = vec![
            ("installing", json!(state.version)),
            ("found", json!(existing.version)),
        ];

        if existing.method.blocks_install() {
            self.report("fail_existing_oss", versions).await;
            return Err(InstallResult::curated(
                messages::ABORT_EXISTING,
                messages::DOCS_URL,
                anyhow!(
                    "existing AES {} found when installing AES {}",
                    existing.version,
                    state.version
                ),
            ));
        }

        self.show_wrapped("Ambassador has been installed with Helm.");
        self.report("existing_helm", versions).await;
        Ok(())
    }

    async fn install_release(&self, state: &mut RunState) -> Stage {
        let Some(release) = state.release.clone() else {
            return Err(InstallResult::unhandled(anyhow!(
                "no chart release resolved before installation"
            )));
        };
        let version = state.version.clone();
        self.set_metadatum(state, "aes_version", version.as_str());
        self.show_wrapped(&format!(
            "-> Installing the Ambassador Edge Stack {}.",
            state.version
        ));

        // Fails when the namespace already exists, which is fine.
        if let Err(err) = self
            .collab
            .cluster
            .run("create namespace", None, &["create", "namespace", self.namespace()])
            .await
        {
            info!(error = %format!("{err:#}"), "namespace not created");
        }

        let installed = match self
            .collab
            .charts
            .install(&release, &state.chart_values)
            .await
        {
            Ok(installed) => installed,
            Err(err) => {
                self.show_wrapped(&format!("Installation of a release failed: {err:#}"));
                self.report("fail_install_aes", vec![("err", json!(format!("{err:#}")))])
                    .await;
                return Err(InstallResult::unhandled(err));
            }
        };
        if self.config.overrides.debug && !installed.notes.is_empty() {
            self.show_wrapped(&installed.notes);
        }

        self.show_wrapped(&format!(
            "-> Installed Ambassador Edge Stack {}",
            installed.app_version
        ));
        self.show_wrapped("-> Waiting for Ambassador Edge Stack to be ready...");
        if let Err(err) = self
            .collab
            .cluster
            .run(
                "wait for AES",
                None,
                &[
                    "-n",
                    self.namespace(),
                    "wait",
                    "--for",
                    "condition=available",
                    "--timeout=90s",
                    "deploy",
                    "-l",
                    "product=aes",
                ],
            )
            .await
        {
            self.report("fail_wait_aes", Meta::new()).await;
            return Err(InstallResult::unhandled(err.context("wait for AES")));
        }
        Ok(())
    }
}

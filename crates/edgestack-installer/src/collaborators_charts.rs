//! Chart resolution, download, and installation through the helm CLI.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use edgestack_core::{program_path, InstallerConfig, VersionRule};
use serde::Deserialize;
use tempfile::TempDir;
use tracing::info;

use crate::process::run_command;

/// One published chart release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRelease {
    pub chart_version: String,
    /// Version of the AES image the chart installs.
    pub app_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledRelease {
    pub app_version: String,
    pub notes: String,
}

#[async_trait]
pub trait ChartManager: Send + Sync {
    /// Newest release whose app version satisfies `rule`.
    async fn resolve(&self, rule: &VersionRule) -> Result<ChartRelease>;

    /// Fetch the chart so installation does not depend on the network.
    async fn download(&self, release: &ChartRelease) -> Result<()>;

    /// Whether a release of the chart already exists under our release name.
    async fn is_already_installed(&self) -> Result<bool>;

    async fn install(
        &self,
        release: &ChartRelease,
        values: &BTreeMap<String, String>,
    ) -> Result<InstalledRelease>;
}

const REPO_ALIAS: &str = "edgectl-aes";

pub struct HelmCli {
    repo_url: String,
    chart_name: String,
    release_name: String,
    namespace: String,
    context: Option<String>,
    downloaded: Mutex<Option<(TempDir, PathBuf)>>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    version: String,
    app_version: String,
}

impl HelmCli {
    pub fn new(config: &InstallerConfig, context: Option<String>) -> Self {
        Self {
            repo_url: config.chart_repo().to_string(),
            chart_name: config.install.chart_name.clone(),
            release_name: config.install.release_name.clone(),
            namespace: config.install.namespace.clone(),
            context: context.filter(|ctx| !ctx.is_empty()),
            downloaded: Mutex::new(None),
        }
    }

    async fn helm(&self, label: &str, args: &[String]) -> Result<String> {
        let helm = program_path("helm").ok_or_else(|| anyhow!("helm not found in PATH"))?;
        let mut full = args.to_vec();
        if let Some(context) = &self.context {
            full.push("--kube-context".to_string());
            full.push(context.clone());
        }
        run_command(label, helm, &full, None).await
    }

    fn chart_ref(&self) -> String {
        format!("{REPO_ALIAS}/{}", self.chart_name)
    }

    fn local_chart(&self) -> Option<PathBuf> {
        self.downloaded
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|(_, path)| path.clone()))
    }
}

/// Pick the first (newest) entry of a `helm search --versions` listing whose
/// app version satisfies the rule.
fn select_release(listing: &str, rule: &VersionRule) -> Result<ChartRelease> {
    let entries: Vec<SearchEntry> =
        serde_json::from_str(listing).context("failed to parse chart search results")?;
    entries
        .into_iter()
        .find(|entry| rule.matches(&entry.app_version))
        .map(|entry| ChartRelease {
            chart_version: entry.version,
            app_version: entry.app_version.trim().to_string(),
        })
        .ok_or_else(|| anyhow!("no chart release matches version rule {rule}"))
}

fn parse_install_output(output: &str) -> InstalledRelease {
    let value: serde_json::Value = serde_json::from_str(output).unwrap_or_default();
    let text = |pointer: &str| {
        value
            .pointer(pointer)
            .and_then(|field| field.as_str())
            .unwrap_or_default()
            .to_string()
    };
    InstalledRelease {
        app_version: text("/chart/metadata/appVersion"),
        notes: text("/info/notes"),
    }
}

#[async_trait]
impl ChartManager for HelmCli {
    async fn resolve(&self, rule: &VersionRule) -> Result<ChartRelease> {
        self.helm(
            "add chart repository",
            &[
                "repo".into(),
                "add".into(),
                REPO_ALIAS.into(),
                self.repo_url.clone(),
                "--force-update".into(),
            ],
        )
        .await?;
        let listing = self
            .helm(
                "search chart releases",
                &[
                    "search".into(),
                    "repo".into(),
                    self.chart_ref(),
                    "--versions".into(),
                    "-o".into(),
                    "json".into(),
                ],
            )
            .await?;
        let release = select_release(&listing, rule)?;
        info!(
            chart_version = %release.chart_version,
            app_version = %release.app_version,
            "resolved chart release"
        );
        Ok(release)
    }

    async fn download(&self, release: &ChartRelease) -> Result<()> {
        let dir = tempfile::Builder::new()
            .prefix("edgectl-chart-")
            .tempdir()
            .context("failed to create chart download directory")?;
        self.helm(
            "download chart",
            &[
                "pull".into(),
                self.chart_ref(),
                "--version".into(),
                release.chart_version.clone(),
                "--untar".into(),
                "--untardir".into(),
                dir.path().display().to_string(),
            ],
        )
        .await?;
        let chart_dir = dir.path().join(&self.chart_name);
        if !chart_dir.is_dir() {
            bail!("downloaded chart missing at {}", chart_dir.display());
        }
        if let Ok(mut slot) = self.downloaded.lock() {
            // Dropping the previous TempDir removes its files.
            *slot = Some((dir, chart_dir));
        }
        Ok(())
    }

    async fn is_already_installed(&self) -> Result<bool> {
        let listing = self
            .helm(
                "list releases",
                &[
                    "list".into(),
                    "-n".into(),
                    self.namespace.clone(),
                    "--filter".into(),
                    format!("^{}$", self.release_name),
                    "-q".into(),
                ],
            )
            .await?;
        Ok(listing.lines().any(|line| line.trim() == self.release_name))
    }

    async fn install(
        &self,
        release: &ChartRelease,
        values: &BTreeMap<String, String>,
    ) -> Result<InstalledRelease> {
        let chart = match self.local_chart() {
            Some(path) => path.display().to_string(),
            None => self.chart_ref(),
        };
        let mut args = vec![
            "install".to_string(),
            self.release_name.clone(),
            chart,
            "--version".into(),
            release.chart_version.clone(),
            "-n".into(),
            self.namespace.clone(),
            "-o".into(),
            "json".into(),
        ];
        for (key, value) in values {
            args.push("--set".into());
            args.push(format!("{key}={value}"));
        }
        let output = self.helm("install chart", &args).await?;
        let mut installed = parse_install_output(&output);
        if installed.app_version.is_empty() {
            installed.app_version = release.app_version.clone();
        }
        Ok(installed)
    }
}

//! Configuration types and defaults for the Edge Stack installer.
//!
//! Keeps schema definitions in one place for easier auditing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from install.toml.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InstallerConfig {
    pub general: GeneralConfig,
    pub install: InstallConfig,
    pub endpoints: EndpointsConfig,
    pub polling: PollingConfig,
    /// Values taken from the environment at load time; never read from disk.
    #[serde(skip)]
    pub overrides: EnvOverrides,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Namespace every installer-managed resource lives in.
    pub namespace: String,
    pub release_name: String,
    pub chart_name: String,
    pub chart_repo: String,
    /// Image reference prefix used to recognise AES containers.
    pub image_repository: String,
    /// Extra `--set` values passed to the chart.
    pub values: BTreeMap<String, String>,
}

impl InstallConfig {
    pub const DEFAULT_NAMESPACE: &'static str = "ambassador";
    pub const DEFAULT_CHART_REPO: &'static str = "https://www.getambassador.io/helm";
    pub const DEFAULT_IMAGE_REPOSITORY: &'static str = "quay.io/datawire/aes";

    /// Label the chart stamps on deployments it creates when driven by this tool.
    pub const MANAGED_BY_LABEL: &'static str = "app.kubernetes.io/managed-by=edgectl";

    /// Chart values with the installer defaults merged under user-supplied ones.
    pub fn chart_values(&self) -> BTreeMap<String, String> {
        let mut values = BTreeMap::from([
            ("replicas".to_string(), "1".to_string()),
            ("deploymentTool".to_string(), "edgectl".to_string()),
            ("namespace.name".to_string(), self.namespace.clone()),
        ]);
        values.extend(self.values.clone());
        values
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            namespace: Self::DEFAULT_NAMESPACE.to_string(),
            release_name: "ambassador".to_string(),
            chart_name: "ambassador".to_string(),
            chart_repo: Self::DEFAULT_CHART_REPO.to_string(),
            image_repository: Self::DEFAULT_IMAGE_REPOSITORY.to_string(),
            values: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub register_domain_url: String,
    pub metrics_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            register_domain_url: "https://metriton.datawire.io/register-domain".to_string(),
            metrics_url: "https://metriton.datawire.io/scout".to_string(),
        }
    }
}

/// Poll cadence for one latency class, in milliseconds.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct PollTimings {
    pub retry_ms: u64,
    pub progress_ms: u64,
    pub timeout_ms: u64,
}

impl PollTimings {
    pub const FAST: PollTimings = PollTimings {
        retry_ms: 500,
        progress_ms: 15_000,
        timeout_ms: 120_000,
    };

    pub const SLOW: PollTimings = PollTimings {
        retry_ms: 3_000,
        progress_ms: 30_000,
        timeout_ms: 300_000,
    };

    /// Checks the ordering retry < progress < timeout.
    pub fn is_ordered(&self) -> bool {
        self.retry_ms < self.progress_ms && self.progress_ms < self.timeout_ms
    }
}

/// A polling table as written; absent keys fall back to that table's preset.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PollTimingsFile {
    retry_ms: Option<u64>,
    progress_ms: Option<u64>,
    timeout_ms: Option<u64>,
}

impl PollTimingsFile {
    fn over(self, preset: PollTimings) -> PollTimings {
        PollTimings {
            retry_ms: self.retry_ms.unwrap_or(preset.retry_ms),
            progress_ms: self.progress_ms.unwrap_or(preset.progress_ms),
            timeout_ms: self.timeout_ms.unwrap_or(preset.timeout_ms),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PollingFile {
    fast: PollTimingsFile,
    slow: PollTimingsFile,
}

impl From<PollingFile> for PollingConfig {
    fn from(file: PollingFile) -> Self {
        Self {
            fast: file.fast.over(PollTimings::FAST),
            slow: file.slow.over(PollTimings::SLOW),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(from = "PollingFile")]
pub struct PollingConfig {
    /// Checks expected to converge within a couple of minutes.
    pub fast: PollTimings,
    /// Load balancer provisioning and certificate issuance.
    pub slow: PollTimings,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            fast: PollTimings::FAST,
            slow: PollTimings::SLOW,
        }
    }
}

/// Out-of-band overrides read from the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub helm_repo: Option<String>,
    pub chart_version_rule: Option<String>,
    pub image_repository: Option<String>,
    pub image_tag: Option<String>,
    pub telemetry_disabled: bool,
    pub debug: bool,
}

//! Facts accumulated while one installation attempt runs.

use std::collections::BTreeMap;

use edgestack_core::{ClusterKind, ExistingInstallation};
use serde_json::Value;

use crate::collaborators::ChartRelease;

/// Owned by the installer for one attempt and dropped when it ends.
#[derive(Debug, Default)]
pub struct RunState {
    pub email: String,
    pub cluster: Option<ClusterKind>,
    pub kubectl_version: String,
    pub k8s_version: String,
    pub existing: Option<ExistingInstallation>,
    /// Values passed to the chart, including out-of-band image overrides.
    pub chart_values: BTreeMap<String, String>,
    pub release: Option<ChartRelease>,
    /// AES version being installed.
    pub version: String,
    /// Set when the release was installed before this run.
    pub already_installed: bool,
    /// Load balancer IP address or hostname.
    pub address: String,
    pub hostname: String,
    pub cluster_id: String,
    /// Everything attached to telemetry so far.
    pub metadata: BTreeMap<String, Value>,
}

impl RunState {
    pub fn is_local_cluster(&self) -> bool {
        self.cluster.is_some_and(ClusterKind::is_local)
    }

    /// Version the running pods are expected to carry: the adopted
    /// installation's version, else the one being installed.
    pub fn running_version(&self) -> &str {
        match &self.existing {
            Some(existing) if self.already_installed && !existing.version.is_empty() => {
                &existing.version
            }
            _ => &self.version,
        }
    }
}

//! Seams to the outside world the installer drives but does not own.

#[path = "collaborators_charts.rs"]
mod collaborators_charts;
#[path = "collaborators_cluster.rs"]
mod collaborators_cluster;
#[path = "collaborators_console.rs"]
mod collaborators_console;
#[path = "collaborators_http.rs"]
mod collaborators_http;
#[path = "collaborators_telemetry.rs"]
mod collaborators_telemetry;

#[cfg(test)]
#[path = "collaborators_testing.rs"]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::Result;
use edgestack_core::InstallerConfig;

pub use collaborators_charts::{ChartManager, ChartRelease, HelmCli, InstalledRelease};
pub use collaborators_cluster::{ClusterClient, Kubectl};
pub use collaborators_console::{
    Browser, Console, GitIdentity, OperatorIdentity, StdConsole, SystemBrowser,
};
pub use collaborators_http::{HttpClient, HttpReply, NameResolver, ReqwestHttp, SystemResolver};
pub use collaborators_telemetry::{Meta, Scout, Telemetry};

/// Everything a run talks to, bundled so stages can share it.
#[derive(Clone)]
pub struct Collaborators {
    pub cluster: Arc<dyn ClusterClient>,
    pub charts: Arc<dyn ChartManager>,
    pub http: Arc<dyn HttpClient>,
    pub dns: Arc<dyn NameResolver>,
    pub telemetry: Arc<dyn Telemetry>,
    pub browser: Arc<dyn Browser>,
    pub console: Arc<dyn Console>,
    pub identity: Arc<dyn OperatorIdentity>,
}

impl Collaborators {
    /// Real adapters: kubectl and helm on PATH, reqwest, the system resolver.
    pub fn system(
        config: &InstallerConfig,
        context_override: Option<String>,
        telemetry_enabled: bool,
    ) -> Result<Self> {
        let telemetry_enabled = telemetry_enabled && !config.overrides.telemetry_disabled;
        Ok(Self {
            cluster: Arc::new(Kubectl::new(context_override.clone())),
            charts: Arc::new(HelmCli::new(config, context_override)),
            http: Arc::new(ReqwestHttp::new()?),
            dns: Arc::new(SystemResolver),
            telemetry: Arc::new(Scout::new(config, telemetry_enabled)?),
            browser: Arc::new(SystemBrowser),
            console: Arc::new(StdConsole::new()),
            identity: Arc::new(GitIdentity),
        })
    }
}

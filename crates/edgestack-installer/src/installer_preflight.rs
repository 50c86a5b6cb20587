//! Stages that look before anything is changed: operator email, cluster
//! access, and what is already running.

use anyhow::anyhow;
use serde::Deserialize;
use tracing::{info, warn};

use super::{Installer, Stage};
use crate::classify::{classify_cluster, detect_existing_installation, INSTALLATION_FINGERPRINT};
use crate::collaborators::Meta;
use crate::messages;
use crate::prompt::{ask_email, is_valid_email};
use crate::result::InstallResult;
use crate::state::RunState;

const DEPLOYMENT_IMAGES_TEMPLATE: &str =
    "go-template='{{range .items}}{{range .spec.template.spec.containers}}{{.image}}\n{{end}}{{end}}'";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct KubernetesVersions {
    client_version: VersionInfo,
    server_version: VersionInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VersionInfo {
    git_version: String,
}

impl Installer {
    pub(super) async fn collect_email(&self) -> Stage<String> {
        let default = self
            .collab
            .identity
            .default_email()
            .await
            .filter(|email| is_valid_email(email));
        self.show("");
        self.show_wrapped(messages::EMAIL_ASK);

        let console = self.collab.console.clone();
        let Some(email) = ask_email(console, default, &self.cancel).await else {
            self.show("");
            return Err(InstallResult::unhandled(anyhow!("Interrupted")));
        };
        self.show("");
        info!(email = %email, "using email address");
        Ok(email)
    }

    pub(super) async fn check_cluster_access(&self) -> Stage {
        if let Err(err) = self.collab.cluster.locate() {
            self.report("fail_no_kubectl", Meta::new()).await;
            self.open_browser(messages::NO_KUBECTL_URL);
            return Err(InstallResult::curated(
                messages::NO_KUBECTL,
                messages::NO_KUBECTL_URL,
                err,
            ));
        }

        if let Err(err) = self
            .collab
            .cluster
            .run("cluster-info", None, &["cluster-info"])
            .await
        {
            self.report("fail_no_cluster", Meta::new()).await;
            self.open_browser(messages::NO_CLUSTER_URL);
            return Err(InstallResult::curated(
                messages::NO_CLUSTER,
                messages::NO_CLUSTER_URL,
                err,
            ));
        }
        Ok(())
    }

    /// Client and server versions, for telemetry only. Any failure leaves
    /// them empty.
    pub(super) async fn record_versions(&self, state: &mut RunState) {
        let versions = match self
            .collab
            .cluster
            .capture("get versions", None, &["version", "-o", "json"])
            .await
        {
            Ok(output) => serde_json::from_str::<KubernetesVersions>(&output).unwrap_or_else(|err| {
                warn!(error = %err, "failed to read Kubernetes client and server versions");
                KubernetesVersions::default()
            }),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to query Kubernetes versions");
                KubernetesVersions::default()
            }
        };
        let kubectl_version = versions.client_version.git_version;
        let k8s_version = versions.server_version.git_version;
        // Version-like keys are parsed by the metrics backend; `_v` keeps them strings.
        self.set_metadatum(state, "kubectl_v", kubectl_version.as_str());
        self.set_metadatum(state, "k8s_v", k8s_version.as_str());
        state.kubectl_version = kubectl_version;
        state.k8s_version = k8s_version;
    }

    pub(super) async fn classify_environment(&self, state: &mut RunState) {
        match self
            .collab
            .cluster
            .capture(
                "get node labels",
                None,
                &["get", "no", "-Lkubernetes.io/hostname"],
            )
            .await
        {
            Ok(labels) => state.cluster = classify_cluster(&labels),
            Err(err) => warn!(error = %format!("{err:#}"), "failed to read node labels"),
        }
        let name = state.cluster.map_or("unknown", |kind| kind.as_str());
        info!(cluster = name, local = state.is_local_cluster(), "classified cluster");
        self.set_metadatum(state, "cluster_info", name);
    }

    pub(super) async fn classify_existing(&self, state: &mut RunState) {
        let namespace = self.namespace().to_string();
        let cluster = self.collab.cluster.clone();
        state.existing = detect_existing_installation(
            INSTALLATION_FINGERPRINT,
            &self.config.install.image_repository,
            |selector| {
                let cluster = cluster.clone();
                let namespace = namespace.clone();
                let selector = selector.to_string();
                async move {
                    cluster
                        .capture(
                            "get AES deployment",
                            None,
                            &[
                                "-n",
                                &namespace,
                                "get",
                                "deploy",
                                "-l",
                                &selector,
                                "-o",
                                DEPLOYMENT_IMAGES_TEMPLATE,
                            ],
                        )
                        .await
                }
            },
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kubectl_version_output() {
        let output = r#"{
            "clientVersion": {"major": "1", "minor": "17", "gitVersion": "v1.17.3"},
            "serverVersion": {"major": "1", "minor": "16+", "gitVersion": "v1.16.6-beta.0"}
        }"#;
        let versions: KubernetesVersions = serde_json::from_str(output).expect("parse");
        assert_eq!(versions.client_version.git_version, "v1.17.3");
        assert_eq!(versions.server_version.git_version, "v1.16.6-beta.0");
    }

    #[test]
    fn missing_server_version_is_tolerated() {
        let versions: KubernetesVersions =
            serde_json::from_str(r#"{"clientVersion": {"gitVersion": "v1.18.0"}}"#).expect("parse");
        assert_eq!(versions.server_version.git_version, "");
    }
}

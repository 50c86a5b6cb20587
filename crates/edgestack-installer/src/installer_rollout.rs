//! Waiting for the deployment to run and become reachable.

use std::net::IpAddr;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{poll_error, Installer, Stage};
use crate::collaborators::{ClusterClient, HttpReply, Meta};
use crate::messages;
use crate::outcome::StageOutcome;
use crate::result::InstallResult;
use crate::state::RunState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodList {
    items: Vec<Pod>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Pod {
    metadata: PodMeta,
    spec: PodSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodMeta {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PodSpec {
    containers: Vec<Container>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Container {
    name: String,
    image: String,
    command: Option<Vec<String>>,
    env: Vec<EnvVar>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnvVar {
    name: String,
    value: String,
}

impl Container {
    /// The traffic manager overrides the command and the traffic agent sets
    /// `AGENT_SERVICE`; neither is the AES pod even when the image matches.
    fn is_aes(&self, image: &str) -> bool {
        self.image == image
            && self.command.as_ref().map_or(true, Vec::is_empty)
            && !self
                .env
                .iter()
                .any(|var| var.name == "AGENT_SERVICE" && !var.value.is_empty())
    }
}

/// Pod and container names of the first AES container in a pod listing.
fn find_aes_container(pods_json: &str, image: &str) -> Result<Option<(String, String)>> {
    let pods: PodList = serde_json::from_str(pods_json).context("failed to parse pod list")?;
    for pod in pods.items {
        for container in pod.spec.containers {
            debug!(pod = %pod.metadata.name, container = %container.name, image = %container.image, "container");
            if container.is_aes(image) {
                return Ok(Some((pod.metadata.name, container.name)));
            }
        }
    }
    Ok(None)
}

/// The AES pod reports the cluster id, which doubles as the AES install id.
/// Getting an answer also proves the pod is running.
async fn grab_cluster_id(cluster: &dyn ClusterClient, namespace: &str, image: &str) -> Result<String> {
    let pods = cluster
        .capture("list pods", None, &["-n", namespace, "get", "pods", "-o", "json"])
        .await?;
    let Some((pod, container)) = find_aes_container(&pods, image)? else {
        bail!("no AES pods found");
    };
    let output = cluster
        .capture(
            "get cluster ID",
            None,
            &["-n", namespace, "exec", &pod, "-c", &container, "python3", "kubewatch.py"],
        )
        .await?;
    let cluster_id = output.trim();
    if cluster_id.is_empty() {
        bail!("AES pod {pod} reported an empty cluster ID");
    }
    Ok(cluster_id.to_string())
}

/// First usable ingress address of a service, preferring an IP address over
/// a hostname within each entry.
fn load_balancer_address(service_json: &str) -> Result<Option<String>> {
    let service: Value = serde_json::from_str(service_json).context("failed to parse service")?;
    let ingress = service
        .pointer("/status/loadBalancer/ingress")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for entry in ingress {
        if let Some(ip) = entry.get("ip").and_then(Value::as_str) {
            if ip.parse::<IpAddr>().is_ok() {
                return Ok(Some(ip.to_string()));
            }
        }
        if let Some(hostname) = entry.get("hostname").and_then(Value::as_str) {
            if !hostname.is_empty() {
                return Ok(Some(hostname.to_string()));
            }
        }
    }
    Ok(None)
}

/// The domain registry performs this same probe: AES answers unknown ACME
/// challenges with a 404 from Envoy. A 503 means Envoy is still starting.
fn check_acme_reply(reply: &HttpReply) -> StageOutcome {
    if reply.status != 404 {
        return StageOutcome::retryable(format!(
            "check for AES: wrong status code: {} instead of 404",
            reply.status
        ));
    }
    match reply.header("server") {
        Some("envoy") => StageOutcome::Success(()),
        other => StageOutcome::retryable(format!(
            "check for AES: wrong server header: {} instead of envoy",
            other.unwrap_or("")
        )),
    }
}

impl Installer {
    /// Image reference the AES pod runs, honouring out-of-band overrides.
    fn expected_image(&self, state: &RunState) -> String {
        let repository = state
            .chart_values
            .get("image.repository")
            .map_or(self.config.install.image_repository.as_str(), String::as_str);
        let tag = state
            .chart_values
            .get("image.tag")
            .map_or(state.running_version(), String::as_str);
        format!("{repository}:{tag}")
    }

    pub(super) async fn await_aes_pod(&self, state: &mut RunState) -> Stage {
        self.show("-> Checking the AES pod deployment");
        let image = self.expected_image(state);
        let image = image.as_str();
        let namespace = self.namespace();
        let cluster = self.collab.cluster.as_ref();

        let cluster_id = match self
            .wait_for("AES pod startup", self.fast, || async move {
                StageOutcome::retry_on_err(grab_cluster_id(cluster, namespace, image).await)
            })
            .await
        {
            Ok(cluster_id) => cluster_id,
            Err(failure) => {
                self.report("fail_pod_timeout", Meta::new()).await;
                return Err(InstallResult::unhandled(poll_error(failure)));
            }
        };

        self.set_metadatum(state, "aes_install_id", cluster_id.as_str());
        state.cluster_id = cluster_id;
        if !state.already_installed {
            self.show_wrapped("-> New release installed successfully.");
            self.report("deploy", vec![("already_installed", json!(false))])
                .await;
        }
        Ok(())
    }

    /// Local clusters have no public address, so automatic TLS is skipped.
    pub(super) fn local_cluster_result(&self) -> InstallResult {
        self.show("-> Local cluster detected. Not configuring automatic TLS.");
        let namespace = self.namespace();
        let message = format!(
            "{}\n\nDetermine the IP address and port number of your Ambassador service, e.g.\n{}\n\n{}\n{}",
            self.bold(messages::NO_TLS_SUCCESS),
            self.bold(&format!("$ minikube service -n {namespace} ambassador")),
            messages::LOGIN_VIA_IP,
            self.bold(&format!("$ edgectl login -n {namespace} IP_ADDRESS:PORT")),
        );
        InstallResult::no_tls(message).with_report("cluster_not_accessible")
    }

    pub(super) async fn await_load_balancer(&self, state: &mut RunState) -> Stage {
        self.show("-> Provisioning a cloud load balancer");
        let namespace = self.namespace();
        let service = self.config.install.release_name.as_str();
        let cluster = self.collab.cluster.as_ref();

        let address = self
            .wait_for("Load Balancer", self.slow, || async move {
                let reply = cluster
                    .capture(
                        "get AES service",
                        None,
                        &["-n", namespace, "get", "svc", service, "-o", "json"],
                    )
                    .await;
                match reply.and_then(|json| load_balancer_address(&json)) {
                    Ok(Some(address)) => StageOutcome::Success(address),
                    Ok(None) => StageOutcome::retryable("no address found"),
                    Err(err) => StageOutcome::retryable(format!("{err:#}")),
                }
            })
            .await;

        match address {
            Ok(address) => {
                self.report("cluster_accessible", Meta::new()).await;
                self.show(&format!(
                    "-> Your AES installation's address is {}",
                    self.bold(&address)
                ));
                state.address = address;
                Ok(())
            }
            Err(failure) => {
                self.report("fail_loadbalancer_timeout", Meta::new()).await;
                Err(InstallResult::curated(
                    format!(
                        "{}\n\n{}",
                        messages::FAIL_LOAD_BALANCER,
                        self.bold(messages::NO_TLS_SUCCESS)
                    ),
                    messages::DOCS_URL,
                    poll_error(failure),
                ))
            }
        }
    }

    pub(super) async fn await_acme_listener(&self, state: &RunState) -> Stage {
        self.show("-> Checking that AES is responding to ACME challenge");
        let url = format!("http://{}/.well-known/acme-challenge/", state.address);
        let url = url.as_str();
        let http = self.collab.http.as_ref();

        let listening = self
            .wait_for("AES to serve ACME", self.fast, || async move {
                match http.get(url).await {
                    Ok(reply) => check_acme_reply(&reply),
                    Err(err) => StageOutcome::retryable(format!("check for AES: {err:#}")),
                }
            })
            .await;

        if let Err(failure) = listening {
            self.report("aes_listening_timeout", Meta::new()).await;
            return Err(InstallResult::curated(
                format!(
                    "{}\n{}\n{}",
                    messages::NOT_LISTENING,
                    messages::TRY_AGAIN,
                    self.bold(messages::NO_TLS_SUCCESS)
                ),
                messages::DOCS_URL,
                poll_error(failure),
            ));
        }
        self.report("aes_listening", Meta::new()).await;
        Ok(())
    }
}

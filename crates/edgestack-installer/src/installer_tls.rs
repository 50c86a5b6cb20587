//! Hostname registration, certificate issuance, and the closing stages.

use std::net::IpAddr;

use anyhow::anyhow;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{poll_error, Installer, Stage};
use crate::classify::classify_acme_failure;
use crate::collaborators::Meta;
use crate::messages;
use crate::outcome::StageOutcome;
use crate::result::InstallResult;
use crate::state::RunState;

/// Request body for the hostname registry. Installation ids stay empty when
/// telemetry is disabled.
fn registration_body(email: &str, address: &str, aes_id: &str, edgectl_id: &str) -> Value {
    let (ip, hostname) = if address.parse::<IpAddr>().is_ok() {
        (address, "")
    } else {
        ("", address)
    };
    json!({
        "Email": email,
        "Ip": ip,
        "Hostname": hostname,
        "EdgectlInstallId": edgectl_id,
        "AESInstallId": aes_id,
    })
}

/// A fresh name under the new domain for every probe, so a cached negative
/// answer for an earlier probe cannot mask propagation.
fn probe_host(hostname: &str, unix_secs: i64, attempt: u32) -> String {
    format!("check-{unix_secs}-{attempt}.{hostname}")
}

impl Installer {
    fn registration_denied_message(&self, address: &str) -> String {
        let namespace = self.namespace();
        format!(
            "{}\n\n\
             If this IP address is reachable from here, you can access your installation \
             without a DNS name. {}\n{}\n\n{}\n{}\n{}",
            self.bold(messages::NO_TLS_SUCCESS),
            messages::LOGIN_VIA_IP,
            self.bold(&format!("$ edgectl login -n {namespace} {address}")),
            messages::LOGIN_VIA_PORT_FORWARD,
            self.bold(&format!(
                "$ kubectl -n {namespace} port-forward deploy/ambassador 8443 &"
            )),
            self.bold(&format!("$ edgectl login -n {namespace} 127.0.0.1:8443")),
        )
    }

    /// Ask the registry for a hostname pointing at the load balancer. A refusal
    /// is an expected ending: the installation works, just without TLS.
    pub(super) async fn register_domain(
        &self,
        state: &mut RunState,
    ) -> Stage<Option<InstallResult>> {
        self.show("-> Automatically configuring TLS");
        let telemetry = &self.collab.telemetry;
        let (aes_id, edgectl_id) = if telemetry.disabled() {
            (String::new(), String::new())
        } else {
            (state.cluster_id.clone(), telemetry.install_id())
        };
        let body = registration_body(&state.email, &state.address, &aes_id, &edgectl_id);

        let reply = match self
            .collab
            .http
            .post_json(&self.config.endpoints.register_domain_url, &body)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                self.report("dns_name_failure", vec![("err", json!(format!("{err:#}")))])
                    .await;
                return Err(InstallResult::unhandled(
                    err.context("acquire DNS name (post)"),
                ));
            }
        };

        let content = reply.body.trim();
        if reply.status != 200 {
            self.report(
                "dns_name_failure",
                vec![("code", json!(reply.status)), ("err", json!(content))],
            )
            .await;
            self.show(&format!("-> Failed to create a DNS name: {content}"));
            return Ok(Some(InstallResult::no_tls(
                self.registration_denied_message(&state.address),
            )));
        }
        if content.is_empty() {
            self.report("dns_name_failure", vec![("err", json!("empty hostname"))])
                .await;
            return Err(InstallResult::unhandled(anyhow!(
                "acquire DNS name: registry returned an empty hostname"
            )));
        }

        state.hostname = content.to_string();
        self.show(&format!("-> Acquiring DNS name {}", self.bold(&state.hostname)));
        Ok(None)
    }

    /// Requesting a certificate before the name resolves burns the issuer's
    /// retry budget, so wait until it resolves here first.
    pub(super) async fn await_dns_propagation(&self, state: &RunState) -> Stage {
        let dns = self.collab.dns.as_ref();
        let hostname = state.hostname.as_str();
        let started = Utc::now().timestamp();
        let mut attempt = 0u32;

        let propagated = self
            .wait_for("DNS propagation to this host", self.fast, || {
                attempt += 1;
                let host = probe_host(hostname, started, attempt);
                async move {
                    match dns.resolve(&host, 443).await {
                        Ok(addrs) if !addrs.is_empty() => StageOutcome::Success(()),
                        Ok(_) => StageOutcome::retryable(format!("{host} has no addresses")),
                        Err(err) => StageOutcome::retryable(format!("{err:#}")),
                    }
                }
            })
            .await;

        if let Err(failure) = propagated {
            self.report("dns_name_propagation_timeout", Meta::new()).await;
            return Err(InstallResult::curated(
                format!("{}\n{}", messages::DNS_NOT_PROPAGATED, messages::TRY_AGAIN),
                messages::DOCS_URL,
                poll_error(failure),
            ));
        }
        self.report("dns_name_propagated", Meta::new()).await;
        Ok(())
    }

    pub(super) async fn apply_host(&self, state: &RunState) -> Stage {
        let manifest = messages::host_manifest(&state.hostname, &state.email);
        if let Err(err) = self
            .collab
            .cluster
            .run(
                "install Host resource",
                Some(&manifest),
                &["-n", self.namespace(), "apply", "-f", "-"],
            )
            .await
        {
            self.report("fail_host_resource", vec![("err", json!(format!("{err:#}")))])
                .await;
            return Err(InstallResult::curated(
                messages::HOST_APPLY_FAILED,
                messages::DOCS_URL,
                err,
            ));
        }
        Ok(())
    }

    pub(super) async fn await_certificate(&self, state: &RunState) -> Stage {
        self.show("-> Obtaining a TLS certificate from Let's Encrypt");
        let namespace = self.namespace();
        let hostname = state.hostname.as_str();
        let cluster = self.collab.cluster.as_ref();
        let console = self.collab.console.as_ref();
        let host_field = |template: &'static str| {
            let args = ["-n", namespace, "get", "host", hostname, "-o", template];
            async move {
                cluster
                    .capture("get Host status", None, &args)
                    .await
                    .map(|out| out.trim().to_string())
            }
        };
        let host_field = &host_field;

        let issued = self
            .wait_for("TLS certificate acquisition", self.slow, || async move {
                let host_state = match host_field("go-template={{.status.state}}").await {
                    Ok(host_state) => host_state,
                    Err(err) => return StageOutcome::fatal(format!("{err:#}")),
                };
                match host_state.as_str() {
                    "Ready" => StageOutcome::Success(()),
                    "Error" => {
                        let reason = match host_field("go-template={{.status.errorReason}}").await
                        {
                            Ok(reason) => reason,
                            Err(err) => return StageOutcome::fatal(format!("{err:#}")),
                        };
                        let outcome = classify_acme_failure(&reason);
                        if let StageOutcome::Fatal(reason) = &outcome {
                            console.show("");
                            console.show_wrapped(&console.bold(&format!(
                                "Acquiring TLS certificate via ACME has failed: {reason}"
                            )));
                        }
                        outcome
                    }
                    other => StageOutcome::retryable(format!("Host state is {other}, not Ready")),
                }
            })
            .await;

        if let Err(failure) = issued {
            self.report("cert_provision_failed", Meta::new()).await;
            return Err(InstallResult::curated(
                format!(
                    "More information: kubectl -n {namespace} get host {hostname} -o yaml\n{}",
                    messages::TRY_AGAIN
                ),
                messages::DOCS_URL,
                poll_error(failure),
            ));
        }
        self.report("cert_provisioned", Meta::new()).await;
        self.show("-> TLS configured successfully");

        match self
            .collab
            .cluster
            .capture("show Host", None, &["-n", namespace, "get", "host", hostname])
            .await
        {
            Ok(output) => {
                for line in output.lines() {
                    self.show(line);
                }
                Ok(())
            }
            Err(err) => {
                self.report("fail_host_lookup", vec![("err", json!(format!("{err:#}")))])
                    .await;
                Err(InstallResult::curated(
                    format!("{}\n{}", messages::HOST_LOOKUP_FAILED, messages::TRY_AGAIN),
                    messages::DOCS_URL,
                    err,
                ))
            }
        }
    }

    pub(super) fn celebrate(&self, state: &RunState) {
        let hostname = state.hostname.as_str();
        self.show("");
        self.show(messages::COMPLETE);
        self.show(messages::SEPARATOR);
        self.show("");
        self.show_wrapped(&self.bold(&messages::full_success(hostname)));
        self.show("");
        self.open_browser(&format!("https://{hostname}/edge_stack/admin/"));
        self.show("");
        self.show_wrapped(&messages::future_login(
            &self.bold(&format!("edgectl login {hostname}")),
        ));
    }

    /// Telemetry only; never changes the outcome of the run.
    pub(super) async fn check_health(&self, state: &RunState) {
        let url = format!("https://{}/ambassador/v0/check_ready", state.hostname);
        let health = match self.collab.http.get(&url).await {
            Ok(reply) if reply.status == 200 => Ok(()),
            Ok(reply) => Err(format!(
                "check for AES health: wrong status code: {} instead of 200",
                reply.status
            )),
            Err(err) => Err(format!("{err:#}")),
        };
        match health {
            Ok(()) => {
                info!("AES reports healthy");
                self.report("aes_health_good", Meta::new()).await;
            }
            Err(err) => {
                warn!(error = %err, "AES health check failed");
                self.report("aes_health_bad", vec![("err", json!(err))]).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_splits_ip_from_hostname() {
        let body = registration_body("ops@example.com", "203.0.113.7", "cid", "iid");
        assert_eq!(body["Ip"], "203.0.113.7");
        assert_eq!(body["Hostname"], "");
        assert_eq!(body["AESInstallId"], "cid");
        assert_eq!(body["EdgectlInstallId"], "iid");

        let body = registration_body("ops@example.com", "lb.elb.amazonaws.com", "", "");
        assert_eq!(body["Ip"], "");
        assert_eq!(body["Hostname"], "lb.elb.amazonaws.com");
        assert_eq!(body["Email"], "ops@example.com");
    }

    #[test]
    fn probe_hosts_differ_per_attempt() {
        let first = probe_host("quiet-fox-1.edgestack.me", 1_600_000_000, 1);
        let second = probe_host("quiet-fox-1.edgestack.me", 1_600_000_000, 2);
        assert_eq!(first, "check-1600000000-1.quiet-fox-1.edgestack.me");
        assert_ne!(first, second);
    }
}

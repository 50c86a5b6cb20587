//! Operator-facing text shown by the installer.

pub const DOCS_URL: &str = "https://www.getambassador.io/docs/latest/tutorials/getting-started/";

pub const WELCOME: &str = "Installing the Ambassador Edge Stack";

pub const EMAIL_ASK: &str = "Please enter an email address for us to notify you before your TLS \
certificate and domain name expire. In order to acquire the TLS certificate, we share this email \
with Let's Encrypt.";

pub const EMAIL_QUERY_FALLBACK: &str = "email_query_failure@datawire.io";

pub const BEGINNING: &str = "Beginning Ambassador Edge Stack Installation";

pub const SEPARATOR: &str =
    "========================================================================";

pub const TELEMETRY_DISABLED: &str = "INFO: phone-home is disabled by environment variable";

pub const NO_KUBECTL_URL: &str = "https://kubernetes.io/docs/tasks/tools/install-kubectl/";

pub const NO_KUBECTL: &str = "The installer depends on the 'kubectl' executable. Make sure you \
have the latest release downloaded in your PATH, and that you have executable permissions.";

pub const NO_CLUSTER_URL: &str = "https://kubernetes.io/docs/setup/";

pub const NO_CLUSTER: &str = "Unable to communicate with the remote Kubernetes cluster using your \
kubectl context.\nTo further debug and diagnose cluster problems, use 'kubectl cluster-info dump' \
or get started and run Kubernetes.";

pub const ABORT_EXISTING: &str = "This tool does not support upgrades/downgrades at this time.\n\
The installer will now quit to avoid corrupting an existing installation of AES.";

pub const NO_TLS_SUCCESS: &str = "Congratulations! You've successfully installed the Ambassador \
Edge Stack in your Kubernetes cluster. However, we cannot connect to your cluster from the \
Internet, so we could not configure TLS automatically.";

pub const LOGIN_VIA_IP: &str = "The following command will open the Edge Policy Console once you \
accept a self-signed certificate in your browser.";

pub const LOGIN_VIA_PORT_FORWARD: &str = "You can use port forwarding to access your Edge Stack \
installation and the Edge Policy Console. You will need to accept a self-signed certificate in \
your browser.";

pub const FAIL_LOAD_BALANCER: &str = "Timed out waiting for the load balancer's IP address for \
the AES Service.\n\
- If a load balancer IP address shows up, simply run the installer again.\n\
- If your cluster doesn't support load balancers, you'll need to expose AES some other way.";

pub const NOT_LISTENING: &str = "It seems AES did not start in the expected time, or the AES load \
balancer is not reachable from here.";

pub const DNS_NOT_PROPAGATED: &str = "We are unable to resolve your new DNS name on this machine.";

pub const HOST_APPLY_FAILED: &str =
    "We failed to create a Host resource in your cluster. This is unexpected.";

pub const HOST_LOOKUP_FAILED: &str = "We failed to retrieve the Host resource from your cluster \
that we just created. This is unexpected.";

pub const TRY_AGAIN: &str = "If this appears to be a transient failure, please try running the \
installer again. It is safe to run the installer repeatedly on a cluster.";

pub const COMPLETE: &str = "AES Installation Complete!";

pub fn full_success(hostname: &str) -> String {
    format!(
        "Congratulations! You've successfully installed the Ambassador Edge Stack in your \
         Kubernetes cluster. Visit https://{hostname}"
    )
}

pub fn future_login(command: &str) -> String {
    format!("In the future, to log in to the Ambassador Edge Policy Console, run\n$ {command}")
}

pub fn see_docs(url: &str) -> String {
    format!("See {url}")
}

/// Manifest requesting a certificate for `hostname` from the ACME provider.
pub fn host_manifest(hostname: &str, email: &str) -> String {
    format!(
        "apiVersion: getambassador.io/v2\n\
         kind: Host\n\
         metadata:\n  name: {hostname}\n\
         spec:\n  hostname: {hostname}\n  acmeProvider:\n    email: {email}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_manifest_is_valid_yaml_layout() {
        let manifest = host_manifest("quiet-fox-1.edgestack.me", "ops@example.com");
        assert_eq!(
            manifest,
            "apiVersion: getambassador.io/v2\nkind: Host\nmetadata:\n  name: quiet-fox-1.edgestack.me\n\
             spec:\n  hostname: quiet-fox-1.edgestack.me\n  acmeProvider:\n    email: ops@example.com\n"
        );
    }
}

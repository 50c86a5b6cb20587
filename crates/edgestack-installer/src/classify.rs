//! Heuristics mapping noisy cluster observations onto discrete categories.
//!
//! Each classifier walks an ordered table and the first match wins.

use std::future::Future;

use edgestack_core::{ClusterKind, ExistingInstallation, InstallConfig, InstallMethod};
use tracing::{debug, info};

use crate::outcome::StageOutcome;

/// Node-label substrings, local single-node environments first.
const CLUSTER_MARKERS: &[(&str, ClusterKind)] = &[
    ("docker-desktop", ClusterKind::DockerDesktop),
    ("minikube", ClusterKind::Minikube),
    ("kind", ClusterKind::Kind),
    ("k3d", ClusterKind::K3d),
    ("gke", ClusterKind::Gke),
    ("aks", ClusterKind::Aks),
    ("compute", ClusterKind::Eks),
    ("ec2", ClusterKind::Ec2),
];

/// Label selector paired with the install method it identifies, in priority order.
pub type Fingerprint = &'static [(&'static str, InstallMethod)];

pub const INSTALLATION_FINGERPRINT: Fingerprint = &[
    (InstallConfig::MANAGED_BY_LABEL, InstallMethod::SelfManaged),
    ("app.kubernetes.io/managed-by=amb-oper", InstallMethod::Operator),
    ("app.kubernetes.io/name=ambassador", InstallMethod::Helm),
    ("product=aes", InstallMethod::ManifestsAes),
    ("service=ambassador", InstallMethod::ManifestsOss),
];

/// Markers in an issuer error meaning the name did not resolve yet. The
/// certificate controller retries these much sooner than other failures.
const ACME_DNS_MARKERS: &[&str] = &["NXDOMAIN", "urn:ietf:params:acme:error:dns"];

/// `None` is a valid outcome: the distribution is simply unknown.
pub fn classify_cluster(node_labels: &str) -> Option<ClusterKind> {
    CLUSTER_MARKERS
        .iter()
        .find(|(marker, _)| node_labels.contains(marker))
        .map(|(_, kind)| *kind)
}

/// Probe each selector in order and report the first one backed by a running
/// AES image. `probe` returns the container images of deployments matching a
/// selector, one per line; probe errors only disqualify that selector.
pub async fn detect_existing_installation<F, Fut>(
    fingerprint: &[(&str, InstallMethod)],
    image_repository: &str,
    mut probe: F,
) -> Option<ExistingInstallation>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = anyhow::Result<String>>,
{
    for (selector, method) in fingerprint {
        let images = match probe(selector).await {
            Ok(images) => images,
            Err(err) => {
                debug!(selector, error = %format!("{err:#}"), "deployment probe failed; skipping");
                continue;
            }
        };
        if let Some(version) = find_image_tag(&images, image_repository) {
            info!(selector, method = %method, version, "existing installation found");
            return Some(ExistingInstallation {
                version,
                method: *method,
            });
        }
    }
    None
}

/// Tag of the first `<repository>:<tag>` reference in a whitespace-separated listing.
pub fn find_image_tag(images: &str, repository: &str) -> Option<String> {
    images
        .split_whitespace()
        .map(|token| token.trim_matches(|c| c == '\'' || c == '"'))
        .filter_map(|image| image.strip_prefix(repository)?.strip_prefix(':'))
        .find(|tag| !tag.is_empty())
        .map(str::to_string)
}

/// Decide whether a certificate-issuance error is worth waiting out.
pub fn classify_acme_failure(reason: &str) -> StageOutcome {
    let reason = reason.trim();
    if ACME_DNS_MARKERS.iter().any(|marker| reason.contains(marker)) {
        return StageOutcome::retryable("waiting for the issuer to retry after NXDOMAIN");
    }
    if reason.is_empty() {
        return StageOutcome::fatal("certificate issuance failed without a reason");
    }
    StageOutcome::fatal(reason)
}

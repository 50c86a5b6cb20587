//! Classification vocabulary shared by the installer stages.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kubernetes distribution inferred from node labels.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterKind {
    DockerDesktop,
    Minikube,
    Kind,
    K3d,
    Gke,
    Aks,
    Eks,
    Ec2,
}

impl ClusterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ClusterKind::DockerDesktop => "docker-desktop",
            ClusterKind::Minikube => "minikube",
            ClusterKind::Kind => "kind",
            ClusterKind::K3d => "k3d",
            ClusterKind::Gke => "gke",
            ClusterKind::Aks => "aks",
            ClusterKind::Eks => "eks",
            ClusterKind::Ec2 => "ec2",
        }
    }

    /// Single-node development clusters with no public load balancer.
    pub fn is_local(self) -> bool {
        matches!(
            self,
            ClusterKind::DockerDesktop | ClusterKind::Minikube | ClusterKind::Kind | ClusterKind::K3d
        )
    }
}

impl fmt::Display for ClusterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a pre-existing installation was put in place.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum InstallMethod {
    /// Installed by a previous run of this tool.
    SelfManaged,
    /// Managed by the Ambassador operator.
    Operator,
    /// Installed from the chart by a plain Helm user.
    Helm,
    /// Raw AES manifests.
    ManifestsAes,
    /// Raw open-source Ambassador manifests.
    ManifestsOss,
}

impl InstallMethod {
    /// Telemetry label, kept stable across releases.
    pub fn as_str(self) -> &'static str {
        match self {
            InstallMethod::SelfManaged => "edgectl",
            InstallMethod::Operator => "operator",
            InstallMethod::Helm => "helm",
            InstallMethod::ManifestsAes => "aes",
            InstallMethod::ManifestsOss => "oss",
        }
    }

    /// Whether the installer must refuse to touch an installation made this way.
    pub fn blocks_install(self) -> bool {
        !matches!(self, InstallMethod::Helm)
    }
}

impl fmt::Display for InstallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deployment already running in the install namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingInstallation {
    pub version: String,
    pub method: InstallMethod,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionRuleError {
    #[error("version rule is empty")]
    Empty,
    #[error("invalid segment {segment:?} in version rule {rule:?}")]
    InvalidSegment { rule: String, segment: String },
}

/// Selects which published release to install by its application version.
///
/// Accepts `*`, an exact version such as `1.3.2`, or a dotted pattern whose
/// segments may be `*` (`1.3.*`). A trailing `*` also matches pre-release and
/// build suffixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRule {
    Latest,
    Pattern { raw: String, segments: Vec<Segment> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Wildcard,
}

impl VersionRule {
    pub fn parse(rule: &str) -> Result<Self, VersionRuleError> {
        let rule = rule.trim();
        if rule.is_empty() {
            return Err(VersionRuleError::Empty);
        }
        if rule == "*" || rule.eq_ignore_ascii_case("latest") {
            return Ok(VersionRule::Latest);
        }
        let raw = rule.trim_start_matches('v');
        let segments = raw
            .split('.')
            .map(|segment| match segment {
                "*" | "x" | "X" => Ok(Segment::Wildcard),
                literal if !literal.is_empty() && !literal.contains('*') => {
                    Ok(Segment::Literal(literal.to_string()))
                }
                other => Err(VersionRuleError::InvalidSegment {
                    rule: rule.to_string(),
                    segment: other.to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(VersionRule::Pattern {
            raw: rule.to_string(),
            segments,
        })
    }

    pub fn matches(&self, version: &str) -> bool {
        let segments = match self {
            VersionRule::Latest => return true,
            VersionRule::Pattern { segments, .. } => segments,
        };
        let candidate: Vec<&str> = version.trim().trim_start_matches('v').split('.').collect();
        let trailing_wildcard = matches!(segments.last(), Some(Segment::Wildcard));
        if candidate.len() < segments.len()
            || (candidate.len() > segments.len() && !trailing_wildcard)
        {
            return false;
        }
        segments
            .iter()
            .zip(&candidate)
            .all(|(segment, part)| match segment {
                Segment::Wildcard => true,
                Segment::Literal(literal) => literal == part,
            })
    }
}

impl fmt::Display for VersionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRule::Latest => f.write_str("*"),
            VersionRule::Pattern { raw, .. } => f.write_str(raw),
        }
    }
}

//! Terminal value of one installation run.

use std::fmt;

/// How a run ended, independent of the message shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// Installed with a hostname and a TLS certificate.
    Complete,
    /// Installed, but TLS could not be configured automatically.
    NoTls,
    Failed,
}

pub struct InstallResult {
    pub kind: ResultKind,
    /// Shown to the operator when the run ends; may be empty.
    pub message: String,
    pub docs_url: Option<&'static str>,
    /// Telemetry event reported when the result is shown.
    pub report: Option<&'static str>,
    /// Present exactly when the process should exit unsuccessfully.
    pub error: Option<anyhow::Error>,
}

impl InstallResult {
    pub fn success() -> Self {
        Self {
            kind: ResultKind::Complete,
            message: String::new(),
            docs_url: None,
            report: None,
            error: None,
        }
    }

    /// Expected, incomplete-success ending with its own explanation.
    pub fn no_tls(message: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::NoTls,
            message: message.into(),
            docs_url: Some(crate::messages::DOCS_URL),
            report: None,
            error: None,
        }
    }

    /// Failure the installer anticipated and can explain.
    pub fn curated(
        message: impl Into<String>,
        docs_url: &'static str,
        error: anyhow::Error,
    ) -> Self {
        Self {
            kind: ResultKind::Failed,
            message: message.into(),
            docs_url: Some(docs_url),
            report: None,
            error: Some(error),
        }
    }

    /// Failure shown generically.
    pub fn unhandled(error: anyhow::Error) -> Self {
        Self {
            kind: ResultKind::Failed,
            message: String::new(),
            docs_url: None,
            report: None,
            error: Some(error),
        }
    }

    pub fn with_report(mut self, event: &'static str) -> Self {
        self.report = Some(event);
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Debug for InstallResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallResult")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("docs_url", &self.docs_url)
            .field("report", &self.report)
            .field("error", &self.error.as_ref().map(|err| format!("{err:#}")))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn only_errors_fail_the_process() {
        assert!(InstallResult::success().is_success());
        assert!(InstallResult::no_tls("reachable by address only").is_success());
        assert!(!InstallResult::unhandled(anyhow!("boom")).is_success());
        let curated = InstallResult::curated("no kubectl", "https://example.com", anyhow!("missing"))
            .with_report("fail_no_kubectl");
        assert!(!curated.is_success());
        assert_eq!(curated.report, Some("fail_no_kubectl"));
    }
}

//! Usage reporting. Every call is best effort; failures are logged only.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use edgestack_core::InstallerConfig;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Extra key/value pairs attached to a single report.
pub type Meta = Vec<(&'static str, Value)>;

#[async_trait]
pub trait Telemetry: Send + Sync {
    fn disabled(&self) -> bool;

    /// Identifier of this machine's installer, stable across runs.
    fn install_id(&self) -> String;

    /// Identifier of this run.
    fn trace_id(&self) -> String;

    /// Attach a value to every later report.
    fn set_metadatum(&self, key: &str, value: Value);

    async fn report(&self, event: &str, meta: Meta);
}

const APPLICATION: &str = "edgectl";
const MODE: &str = "install";

pub struct Scout {
    client: Option<reqwest::Client>,
    url: String,
    install_id: String,
    trace_id: String,
    metadata: Mutex<BTreeMap<String, Value>>,
}

impl Scout {
    pub fn new(config: &InstallerConfig, enabled: bool) -> Result<Self> {
        Self::with_id_file(config, enabled, install_id_path().as_deref())
    }

    /// Like [`Scout::new`], keeping the install id in `id_file`.
    pub fn with_id_file(
        config: &InstallerConfig,
        enabled: bool,
        id_file: Option<&Path>,
    ) -> Result<Self> {
        let client = if enabled {
            Some(
                reqwest::Client::builder()
                    .timeout(std::time::Duration::from_secs(10))
                    .build()
                    .context("failed to build telemetry client")?,
            )
        } else {
            None
        };
        Ok(Self {
            client,
            url: config.endpoints.metrics_url.clone(),
            install_id: load_install_id(id_file),
            trace_id: Uuid::new_v4().to_string(),
            metadata: Mutex::new(BTreeMap::new()),
        })
    }

    fn payload(&self, event: &str, meta: Meta) -> Value {
        let mut metadata = self
            .metadata
            .lock()
            .map(|map| map.clone())
            .unwrap_or_default();
        metadata.insert("action".to_string(), json!(event));
        metadata.insert("mode".to_string(), json!(MODE));
        metadata.insert("trace_id".to_string(), json!(self.trace_id));
        for (key, value) in meta {
            metadata.insert(key.to_string(), value);
        }
        json!({
            "application": APPLICATION,
            "install_id": self.install_id,
            "version": env!("CARGO_PKG_VERSION"),
            "metadata": metadata,
        })
    }
}

fn install_id_path() -> Option<PathBuf> {
    InstallerConfig::default_config_dir()
        .ok()
        .map(|dir| dir.join("id"))
}

/// Read the persisted install id, creating one on first use. A fresh id is
/// used for this run when the file cannot be read or written.
fn load_install_id(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return Uuid::new_v4().to_string();
    };
    if let Ok(existing) = fs::read_to_string(path) {
        let existing = existing.trim();
        if Uuid::parse_str(existing).is_ok() {
            return existing.to_string();
        }
    }
    let id = Uuid::new_v4().to_string();
    let written = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| fs::write(path, &id));
    if let Err(err) = written {
        debug!(path = %path.display(), error = %err, "failed to persist install id");
    }
    id
}

#[async_trait]
impl Telemetry for Scout {
    fn disabled(&self) -> bool {
        self.client.is_none()
    }

    fn install_id(&self) -> String {
        self.install_id.clone()
    }

    fn trace_id(&self) -> String {
        self.trace_id.clone()
    }

    fn set_metadatum(&self, key: &str, value: Value) {
        info!(target: "metrics", key, value = %value, "metadatum");
        if let Ok(mut metadata) = self.metadata.lock() {
            metadata.insert(key.to_string(), value);
        }
    }

    async fn report(&self, event: &str, meta: Meta) {
        info!(target: "metrics", event, "report");
        let Some(client) = &self.client else {
            return;
        };
        let payload = self.payload(event, meta);
        match client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(target: "metrics", event, status = %response.status(), "report rejected");
            }
            Err(err) => warn!(target: "metrics", event, error = %err, "report failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scout(dir: &tempfile::TempDir) -> Scout {
        Scout::with_id_file(
            &InstallerConfig::default(),
            false,
            Some(&dir.path().join("edgestack").join("id")),
        )
        .expect("scout")
    }

    #[test]
    fn payload_merges_run_metadata_and_event_meta() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scout = scout(&dir);
        assert!(scout.disabled());
        scout.set_metadatum("k8s_v", json!("v1.17.0"));

        let payload = scout.payload("deploy", vec![("already_installed", json!(true))]);
        assert_eq!(payload["application"], "edgectl");
        assert_eq!(payload["install_id"], json!(scout.install_id()));
        let metadata = &payload["metadata"];
        assert_eq!(metadata["action"], "deploy");
        assert_eq!(metadata["mode"], "install");
        assert_eq!(metadata["trace_id"], json!(scout.trace_id()));
        assert_eq!(metadata["k8s_v"], "v1.17.0");
        assert_eq!(metadata["already_installed"], true);
    }

    #[test]
    fn install_id_persists_while_trace_ids_differ() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = scout(&dir);
        let second = scout(&dir);
        assert_eq!(first.install_id(), second.install_id());
        assert_ne!(first.trace_id(), second.trace_id());
        let stored = fs::read_to_string(dir.path().join("edgestack").join("id")).expect("id file");
        assert_eq!(stored, first.install_id());
    }

    #[test]
    fn unreadable_id_file_is_replaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("id");
        fs::write(&path, "not-a-uuid").expect("write");
        let id = load_install_id(Some(&path));
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(fs::read_to_string(&path).expect("id file"), id);
    }
}

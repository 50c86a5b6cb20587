//! Scripted collaborators for exercising the installer without a cluster.

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use edgestack_core::VersionRule;
use serde_json::Value;

use super::{
    Browser, ChartManager, ChartRelease, ClusterClient, Collaborators, Console, HttpClient,
    HttpReply, InstalledRelease, Meta, NameResolver, OperatorIdentity, Telemetry,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct RecordingConsole {
    lines: Mutex<Vec<String>>,
    input: Mutex<VecDeque<String>>,
}

impl RecordingConsole {
    pub fn with_input<const N: usize>(input: [&str; N]) -> Self {
        Self {
            lines: Mutex::default(),
            input: Mutex::new(input.iter().map(|line| format!("{line}\n")).collect()),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }

    pub fn transcript(&self) -> String {
        self.lines().join("\n")
    }
}

impl Console for RecordingConsole {
    fn show(&self, line: &str) {
        lock(&self.lines).push(line.to_string());
    }

    fn prompt(&self, _text: &str) {}

    fn read_line(&self) -> io::Result<Option<String>> {
        Ok(lock(&self.input).pop_front())
    }
}

/// Answers commands by the first rule whose key is contained in the joined
/// argument list; unmatched commands succeed with empty output.
#[derive(Default)]
pub struct FakeCluster {
    missing: bool,
    rules: Mutex<Vec<(String, Result<String, String>)>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCluster {
    /// A machine without the cluster CLI installed.
    pub fn without_kubectl() -> Self {
        Self {
            missing: true,
            ..Self::default()
        }
    }

    pub fn respond(self, key: &str, output: &str) -> Self {
        lock(&self.rules).push((key.to_string(), Ok(output.to_string())));
        self
    }

    pub fn fail(self, key: &str, error: &str) -> Self {
        lock(&self.rules).push((key.to_string(), Err(error.to_string())));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn called(&self, key: &str) -> bool {
        self.calls().iter().any(|call| call.contains(key))
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    fn locate(&self) -> Result<PathBuf> {
        if self.missing {
            Err(anyhow!("kubectl not found in PATH"))
        } else {
            Ok(PathBuf::from("/usr/local/bin/kubectl"))
        }
    }

    async fn capture(&self, label: &str, _input: Option<&str>, args: &[&str]) -> Result<String> {
        let command = args.join(" ");
        lock(&self.calls).push(command.clone());
        let rules = lock(&self.rules);
        match rules.iter().find(|(key, _)| command.contains(key.as_str())) {
            Some((_, Ok(output))) => Ok(output.clone()),
            Some((_, Err(error))) => Err(anyhow!("{label} failed: {error}")),
            None => Ok(String::new()),
        }
    }
}

pub struct FakeCharts {
    pub release: ChartRelease,
    pub already_installed: bool,
    installs: Mutex<Vec<BTreeMap<String, String>>>,
}

impl FakeCharts {
    pub fn new(app_version: &str) -> Self {
        Self {
            release: ChartRelease {
                chart_version: "6.5.2".to_string(),
                app_version: app_version.to_string(),
            },
            already_installed: false,
            installs: Mutex::default(),
        }
    }

    pub fn installs(&self) -> Vec<BTreeMap<String, String>> {
        lock(&self.installs).clone()
    }
}

#[async_trait]
impl ChartManager for FakeCharts {
    async fn resolve(&self, rule: &VersionRule) -> Result<ChartRelease> {
        if rule.matches(&self.release.app_version) {
            Ok(self.release.clone())
        } else {
            Err(anyhow!("no chart release matches version rule {rule}"))
        }
    }

    async fn download(&self, _release: &ChartRelease) -> Result<()> {
        Ok(())
    }

    async fn is_already_installed(&self) -> Result<bool> {
        Ok(self.already_installed)
    }

    async fn install(
        &self,
        release: &ChartRelease,
        values: &BTreeMap<String, String>,
    ) -> Result<InstalledRelease> {
        lock(&self.installs).push(values.clone());
        Ok(InstalledRelease {
            app_version: release.app_version.clone(),
            notes: String::new(),
        })
    }
}

/// Replies by URL substring; unmatched requests fail like a refused connection.
#[derive(Default)]
pub struct FakeHttp {
    replies: Mutex<Vec<(String, HttpReply)>>,
    posts: Mutex<Vec<(String, Value)>>,
}

impl FakeHttp {
    pub fn reply(self, url_part: &str, status: u16, headers: &[(&str, &str)], body: &str) -> Self {
        let reply = HttpReply {
            status,
            headers: headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            body: body.to_string(),
        };
        lock(&self.replies).push((url_part.to_string(), reply));
        self
    }

    pub fn posts(&self) -> Vec<(String, Value)> {
        lock(&self.posts).clone()
    }

    fn lookup(&self, url: &str) -> Result<HttpReply> {
        lock(&self.replies)
            .iter()
            .find(|(part, _)| url.contains(part.as_str()))
            .map(|(_, reply)| reply.clone())
            .ok_or_else(|| anyhow!("connection refused: {url}"))
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn get(&self, url: &str) -> Result<HttpReply> {
        self.lookup(url)
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply> {
        lock(&self.posts).push((url.to_string(), body.clone()));
        self.lookup(url)
    }
}

#[derive(Default)]
pub struct FakeResolver {
    unresolvable: bool,
    queries: Mutex<Vec<String>>,
}

impl FakeResolver {
    /// A resolver for which no name ever resolves.
    pub fn unresolvable() -> Self {
        Self {
            unresolvable: true,
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl NameResolver for FakeResolver {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>> {
        lock(&self.queries).push(host.to_string());
        if self.unresolvable {
            Err(anyhow!("failed to resolve {host}"))
        } else {
            Ok(vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)), port)])
        }
    }
}

#[derive(Default)]
pub struct RecordingTelemetry {
    pub is_disabled: bool,
    events: Mutex<Vec<(String, Meta)>>,
    metadata: Mutex<BTreeMap<String, Value>>,
}

impl RecordingTelemetry {
    pub fn switched_off() -> Self {
        Self {
            is_disabled: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<(String, Meta)> {
        lock(&self.events).clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events().into_iter().map(|(name, _)| name).collect()
    }

    pub fn metadata(&self) -> BTreeMap<String, Value> {
        lock(&self.metadata).clone()
    }
}

#[async_trait]
impl Telemetry for RecordingTelemetry {
    fn disabled(&self) -> bool {
        self.is_disabled
    }

    fn install_id(&self) -> String {
        "install-id".to_string()
    }

    fn trace_id(&self) -> String {
        "trace-id".to_string()
    }

    fn set_metadatum(&self, key: &str, value: Value) {
        lock(&self.metadata).insert(key.to_string(), value);
    }

    async fn report(&self, event: &str, meta: Meta) {
        lock(&self.events).push((event.to_string(), meta));
    }
}

#[derive(Default)]
pub struct RecordingBrowser {
    opened: Mutex<Vec<String>>,
}

impl RecordingBrowser {
    pub fn opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }
}

impl Browser for RecordingBrowser {
    fn open(&self, url: &str) -> Result<()> {
        lock(&self.opened).push(url.to_string());
        Ok(())
    }
}

/// Stands in for the operator's git configuration.
#[derive(Default)]
pub struct FixedIdentity(pub Option<String>);

#[async_trait]
impl OperatorIdentity for FixedIdentity {
    async fn default_email(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Typed handles on every fake, alongside the bundle handed to the installer.
pub struct Fakes {
    pub cluster: Arc<FakeCluster>,
    pub charts: Arc<FakeCharts>,
    pub http: Arc<FakeHttp>,
    pub dns: Arc<FakeResolver>,
    pub telemetry: Arc<RecordingTelemetry>,
    pub browser: Arc<RecordingBrowser>,
    pub console: Arc<RecordingConsole>,
    pub identity: Arc<FixedIdentity>,
}

impl Fakes {
    pub fn new(cluster: FakeCluster, charts: FakeCharts, http: FakeHttp) -> Self {
        Self {
            cluster: Arc::new(cluster),
            charts: Arc::new(charts),
            http: Arc::new(http),
            dns: Arc::new(FakeResolver::default()),
            telemetry: Arc::new(RecordingTelemetry::default()),
            browser: Arc::new(RecordingBrowser::default()),
            console: Arc::new(RecordingConsole::with_input(["ops@example.com"])),
            identity: Arc::new(FixedIdentity::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            cluster: self.cluster.clone(),
            charts: self.charts.clone(),
            http: self.http.clone(),
            dns: self.dns.clone(),
            telemetry: self.telemetry.clone(),
            browser: self.browser.clone(),
            console: self.console.clone(),
            identity: self.identity.clone(),
        }
    }
}

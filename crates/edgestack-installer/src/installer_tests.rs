use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use super::*;
use crate::collaborators::testing::{
    FakeCharts, FakeCluster, FakeHttp, FakeResolver, Fakes, FixedIdentity, RecordingConsole,
    RecordingTelemetry,
};
use crate::result::ResultKind;

const VERSIONS: &str =
    r#"{"clientVersion":{"gitVersion":"v1.17.3"},"serverVersion":{"gitVersion":"v1.16.6"}}"#;
const HOSTNAME: &str = "quiet-fox-1.edgestack.me";
const ADDRESS: &str = "203.0.113.7";

fn pods(version: &str) -> String {
    json!({"items": [{
        "metadata": {"name": "ambassador-7d9f"},
        "spec": {"containers": [
            {"name": "ambassador", "image": format!("quay.io/datawire/aes:{version}")}
        ]}
    }]})
    .to_string()
}

fn load_balancer() -> String {
    json!({"status": {"loadBalancer": {"ingress": [{"ip": ADDRESS}]}}}).to_string()
}

/// A reachable hosted cluster where every step converges at once. Rules added
/// to `overrides` beforehand take precedence.
fn cluster(overrides: FakeCluster) -> FakeCluster {
    overrides
        .respond("version -o json", VERSIONS)
        .respond("-Lkubernetes.io/hostname", "gke-pool-1-abcd Ready 5d")
        .respond("get pods -o json", &pods("1.5.2"))
        .respond("python3 kubewatch.py", "cluster-123\n")
        .respond("get svc ambassador -o json", &load_balancer())
        .respond("{{.status.state}}", "Ready")
        .respond(&format!("get host {HOSTNAME}"), "NAME  HOSTNAME  STATE\nquiet-fox  quiet-fox  Ready")
}

fn http(overrides: FakeHttp) -> FakeHttp {
    overrides
        .reply("/.well-known/acme-challenge/", 404, &[("server", "envoy")], "")
        .reply("register-domain", 200, &[], &format!("{HOSTNAME}\n"))
        .reply("check_ready", 200, &[], "")
}

fn installer(fakes: &Fakes) -> (Installer, CancellationToken) {
    let cancel = CancellationToken::new();
    let installer = Installer::new(
        InstallerConfig::default(),
        fakes.collaborators(),
        cancel.clone(),
    )
    .expect("default config is valid");
    (installer, cancel)
}

fn error_text(result: &InstallResult) -> String {
    result
        .error
        .as_ref()
        .map(|err| format!("{err:#}"))
        .unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn full_install_configures_tls() {
    let fakes = Fakes::new(
        cluster(FakeCluster::default()),
        FakeCharts::new("1.5.2"),
        http(FakeHttp::default()),
    );
    let (installer, _) = installer(&fakes);

    let result = installer.run_installation().await;

    assert_eq!(result.kind, ResultKind::Complete, "{result:?}");
    assert!(result.is_success());
    assert_eq!(fakes.charts.installs().len(), 1);
    assert_eq!(
        fakes.telemetry.event_names(),
        [
            "install",
            "deploy",
            "cluster_accessible",
            "aes_listening",
            "dns_name_propagated",
            "cert_provisioned",
            "aes_health_good",
        ]
    );
    let events = fakes.telemetry.events();
    assert_eq!(events[1].1, vec![("already_installed", json!(false))]);

    let posts = fakes.http.posts();
    assert_eq!(posts.len(), 1);
    let body = &posts[0].1;
    assert_eq!(body["Email"], "ops@example.com");
    assert_eq!(body["Ip"], ADDRESS);
    assert_eq!(body["AESInstallId"], "cluster-123");
    assert_eq!(body["EdgectlInstallId"], "install-id");

    assert!(fakes.cluster.called("apply -f -"));
    assert_eq!(
        fakes.browser.opened(),
        [format!("https://{HOSTNAME}/edge_stack/admin/")]
    );
    let metadata = fakes.telemetry.metadata();
    assert_eq!(metadata["aes_install_id"], "cluster-123");
    assert_eq!(metadata["k8s_v"], "v1.16.6");
    assert_eq!(metadata["cluster_info"], "gke");
    assert!(fakes
        .console
        .transcript()
        .contains(&format!("edgectl login {HOSTNAME}")));
}

#[tokio::test(start_paused = true)]
async fn local_cluster_stops_before_dns_registration() {
    let fakes = Fakes::new(
        cluster(FakeCluster::default().respond("-Lkubernetes.io/hostname", "minikube Ready")),
        FakeCharts::new("1.5.2"),
        http(FakeHttp::default()),
    );
    let (installer, _) = installer(&fakes);

    let result = installer.run_installation().await;

    assert_eq!(result.kind, ResultKind::NoTls);
    assert!(result.is_success());
    assert!(result.message.contains("could not configure TLS automatically"));
    assert!(fakes.http.posts().is_empty());
    assert!(fakes.dns.queries().is_empty());
    assert!(!fakes.cluster.called("get svc"));
    let events = fakes.telemetry.event_names();
    assert_eq!(events.last().map(String::as_str), Some("cluster_not_accessible"));
    assert!(events.contains(&"deploy".to_string()));
}

#[tokio::test(start_paused = true)]
async fn self_managed_installation_is_never_overwritten() {
    let fakes = Fakes::new(
        cluster(FakeCluster::default().respond(
            "-l app.kubernetes.io/managed-by=edgectl",
            "'quay.io/datawire/aes:1.2.0\n'",
        )),
        FakeCharts::new("1.5.2"),
        http(FakeHttp::default()),
    );
    let (installer, _) = installer(&fakes);

    let result = installer.run_installation().await;

    assert_eq!(result.kind, ResultKind::Failed);
    let error = error_text(&result);
    assert!(error.contains("1.2.0"), "{error}");
    assert!(error.contains("1.5.2"), "{error}");
    assert!(result.message.contains("does not support upgrades"));
    assert!(fakes.charts.installs().is_empty());
    assert!(!fakes.cluster.called("create namespace"));
    assert!(!fakes.cluster.called("wait --for"));

    let events = fakes.telemetry.events();
    let (_, meta) = events
        .iter()
        .find(|(name, _)| name == "fail_existing_oss")
        .expect("abort reported");
    assert_eq!(
        meta,
        &vec![("installing", json!("1.5.2")), ("found", json!("1.2.0"))]
    );
    assert_eq!(fakes.telemetry.metadata()["managed"], "edgectl");
}

#[tokio::test(start_paused = true)]
async fn refused_registration_ends_without_tls() {
    let fakes = Fakes::new(
        cluster(FakeCluster::default()),
        FakeCharts::new("1.5.2"),
        http(FakeHttp::default().reply("register-domain", 503, &[], "service unavailable\n")),
    );
    let (installer, _) = installer(&fakes);

    let result = installer.run_installation().await;

    assert_eq!(result.kind, ResultKind::NoTls);
    assert!(result.error.is_none());
    assert!(result
        .message
        .contains(&format!("edgectl login -n ambassador {ADDRESS}")));
    assert!(!fakes.cluster.called("apply -f -"));
    assert!(fakes.dns.queries().is_empty());

    let events = fakes.telemetry.events();
    let (_, meta) = events
        .iter()
        .find(|(name, _)| name == "dns_name_failure")
        .expect("failure reported");
    assert_eq!(
        meta,
        &vec![("code", json!(503)), ("err", json!("service unavailable"))]
    );
}

#[tokio::test(start_paused = true)]
async fn helm_installation_is_adopted() {
    let fakes = Fakes::new(
        cluster(
            FakeCluster::default()
                .respond("-Lkubernetes.io/hostname", "kind-control-plane Ready")
                .respond("-l app.kubernetes.io/name=ambassador", "quay.io/datawire/aes:1.4.0")
                .respond("get pods -o json", &pods("1.4.0")),
        ),
        FakeCharts::new("1.5.2"),
        http(FakeHttp::default()),
    );
    let (installer, _) = installer(&fakes);

    let result = installer.run_installation().await;

    assert!(result.is_success(), "{result:?}");
    assert!(fakes.charts.installs().is_empty());
    let events = fakes.telemetry.events();
    assert!(events.iter().any(|(name, _)| name == "existing_helm"));
    assert!(events
        .iter()
        .any(|(name, meta)| name == "deploy" && meta == &vec![("already_installed", json!(true))]));
    assert!(!events
        .iter()
        .any(|(name, meta)| name == "deploy" && meta == &vec![("already_installed", json!(false))]));
    assert_eq!(fakes.telemetry.metadata()["aes_install_id"], "cluster-123");
}

#[tokio::test(start_paused = true)]
async fn missing_kubectl_is_curated() {
    let fakes = Fakes::new(
        FakeCluster::without_kubectl(),
        FakeCharts::new("1.5.2"),
        FakeHttp::default(),
    );
    let (installer, _) = installer(&fakes);

    let result = installer.run_installation().await;

    assert!(!result.is_success());
    assert_eq!(result.docs_url, Some(messages::NO_KUBECTL_URL));
    assert_eq!(fakes.telemetry.event_names(), ["install", "fail_no_kubectl"]);
    assert_eq!(fakes.browser.opened(), [messages::NO_KUBECTL_URL]);
    assert!(fakes.cluster.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unreachable_cluster_is_curated() {
    let fakes = Fakes::new(
        FakeCluster::default().fail("cluster-info", "connection refused"),
        FakeCharts::new("1.5.2"),
        FakeHttp::default(),
    );
    let (installer, _) = installer(&fakes);

    let result = installer.run_installation().await;

    assert_eq!(result.docs_url, Some(messages::NO_CLUSTER_URL));
    assert!(result.message.contains("Unable to communicate"));
    assert_eq!(fakes.telemetry.event_names(), ["install", "fail_no_cluster"]);
}

#[tokio::test(start_paused = true)]
async fn version_probe_and_node_labels_are_best_effort() {
    let fakes = Fakes::new(
        cluster(
            FakeCluster::default()
                .respond("version -o json", "not json")
                .fail("-Lkubernetes.io/hostname", "forbidden"),
        ),
        FakeCharts::new("1.5.2"),
        http(FakeHttp::default()),
    );
    let (installer, _) = installer(&fakes);

    let result = installer.run_installation().await;

    assert!(result.is_success(), "{result:?}");
    let metadata = fakes.telemetry.metadata();
    assert_eq!(metadata["k8s_v"], "");
    assert_eq!(metadata["cluster_info"], "unknown");
}

#[tokio::test(start_paused = true)]
async fn failing_version_query_does_not_stop_the_run() {
    let fakes = Fakes::new(
        cluster(FakeCluster::default().fail("version -o json", "server timeout")),
        FakeCharts::new("1.5.2"),
        http(FakeHttp::default()),
    );
    let (installer, _) = installer(&fakes);

    let result = installer.run_installation().await;

    assert_eq!(result.kind, ResultKind::Complete, "{result:?}");
    assert_eq!(fakes.charts.installs().len(), 1);
    assert!(!fakes
        .telemetry
        .event_names()
        .contains(&"fail_no_cluster".to_string()));
    let metadata = fakes.telemetry.metadata();
    assert_eq!(metadata["kubectl_v"], "");
    assert_eq!(metadata["k8s_v"], "");
}

#[tokio::test(start_paused = true)]
async fn blank_answer_accepts_the_git_address() {
    let mut fakes = Fakes::new(
        cluster(FakeCluster::default()),
        FakeCharts::new("1.5.2"),
        http(FakeHttp::default()),
    );
    fakes.identity = Arc::new(FixedIdentity(Some("dev@example.com".to_string())));
    fakes.console = Arc::new(RecordingConsole::with_input([""]));
    let (installer, _) = installer(&fakes);

    let result = installer.run_installation().await;

    assert!(result.is_success(), "{result:?}");
    assert_eq!(fakes.http.posts()[0].1["Email"], "dev@example.com");
}

#[tokio::test(start_paused = true)]
async fn permanent_acme_failure_stops_polling() {
    let reason = "rateLimited: too many certificates already issued";
    let fakes = Fakes::new(
        cluster(
            FakeCluster::default()
                .respond("{{.status.state}}", "Error")
                .respond("{{.status.errorReason}}", reason),
        ),
        FakeCharts::new("1.5.2"),
        http(FakeHttp::default()),
    );
    let (installer, _) = installer(&fakes);
    let start = Instant::now();

    let result = installer.run_installation().await;

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(error_text(&result), reason);
    let state_queries = fakes
        .cluster
        .calls()
        .iter()
        .filter(|call| call.contains("{{.status.state}}"))
        .count();
    assert_eq!(state_queries, 1);
    assert!(fakes
        .telemetry
        .event_names()
        .contains(&"cert_provision_failed".to_string()));
    assert!(fakes
        .console
        .transcript()
        .contains("Acquiring TLS certificate via ACME has failed"));
}

#[tokio::test(start_paused = true)]
async fn nxdomain_keeps_waiting_until_the_deadline() {
    let fakes = Fakes::new(
        cluster(
            FakeCluster::default()
                .respond("{{.status.state}}", "Error")
                .respond("{{.status.errorReason}}", "DNS problem: NXDOMAIN looking up A"),
        ),
        FakeCharts::new("1.5.2"),
        http(FakeHttp::default()),
    );
    let (installer, _) = installer(&fakes);
    let start = Instant::now();

    let result = installer.run_installation().await;

    assert!(start.elapsed() >= PollPolicy::SLOW.timeout());
    assert!(error_text(&result).contains("timed out waiting for TLS certificate acquisition"));
    assert!(fakes
        .telemetry
        .event_names()
        .contains(&"cert_provision_failed".to_string()));
}

#[tokio::test(start_paused = true)]
async fn load_balancer_timeout_is_curated() {
    let pending = json!({"status": {"loadBalancer": {}}}).to_string();
    let fakes = Fakes::new(
        cluster(FakeCluster::default().respond("get svc ambassador -o json", &pending)),
        FakeCharts::new("1.5.2"),
        http(FakeHttp::default()),
    );
    let (installer, _) = installer(&fakes);

    let result = installer.run_installation().await;

    assert_eq!(result.kind, ResultKind::Failed);
    assert!(result.message.contains("Timed out waiting for the load balancer"));
    assert!(error_text(&result).contains("no address found"));
    assert!(fakes
        .telemetry
        .event_names()
        .contains(&"fail_loadbalancer_timeout".to_string()));
    assert!(fakes.http.posts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_the_current_wait() {
    let pending = json!({"status": {"loadBalancer": {}}}).to_string();
    let fakes = Fakes::new(
        cluster(FakeCluster::default().respond("get svc ambassador -o json", &pending)),
        FakeCharts::new("1.5.2"),
        http(FakeHttp::default()),
    );
    let (installer, cancel) = installer(&fakes);
    let cluster = fakes.cluster.clone();
    tokio::spawn(async move {
        while !cluster.called("get svc") {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        cancel.cancel();
    });

    let result = installer.run_installation().await;

    assert!(fakes.http.posts().is_empty());
    let interrupted = result
        .error
        .as_ref()
        .and_then(|err| err.downcast_ref::<PollFailure>())
        .is_some_and(PollFailure::is_interrupted);
    assert!(interrupted, "{result:?}");
}

#[tokio::test(start_paused = true)]
async fn dns_probes_use_distinct_names() {
    let mut fakes = Fakes::new(
        cluster(FakeCluster::default()),
        FakeCharts::new("1.5.2"),
        http(FakeHttp::default()),
    );
    fakes.dns = Arc::new(FakeResolver::unresolvable());
    let (installer, _) = installer(&fakes);

    let result = installer.run_installation().await;

    assert!(fakes
        .telemetry
        .event_names()
        .contains(&"dns_name_propagation_timeout".to_string()));
    assert!(result.message.contains("unable to resolve your new DNS name"));
    let queries = fakes.dns.queries();
    assert!(queries.len() > 1);
    let mut unique = queries.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), queries.len());
    assert!(queries.iter().all(|host| host.ends_with(HOSTNAME)));
}

#[tokio::test(start_paused = true)]
async fn disabled_telemetry_keeps_ids_out_of_registration() {
    let mut fakes = Fakes::new(
        cluster(FakeCluster::default()),
        FakeCharts::new("1.5.2"),
        http(FakeHttp::default()),
    );
    fakes.telemetry = Arc::new(RecordingTelemetry::switched_off());
    let (installer, _) = installer(&fakes);

    let result = installer.run_installation().await;

    assert!(result.is_success(), "{result:?}");
    let posts = fakes.http.posts();
    assert_eq!(posts[0].1["AESInstallId"], "");
    assert_eq!(posts[0].1["EdgectlInstallId"], "");
    assert!(fakes
        .console
        .transcript()
        .contains(messages::TELEMETRY_DISABLED));
}

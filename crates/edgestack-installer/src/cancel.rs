//! Operator interrupt handling.
//!
//! Waits for SIGINT or SIGTERM for the lifetime of a run and turns the first
//! one into run-wide cancellation.

use std::future::Future;
use std::sync::Arc;

use serde_json::json;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::collaborators::Telemetry;

/// Resolves with the name of the first termination signal received.
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_ok() {
            "interrupt"
        } else {
            std::future::pending().await
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                "terminated"
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = ctrl_c => name,
        name = terminate => name,
    }
}

/// Cancel the run, then report the interrupt. Returns quietly when the run
/// finishes first.
pub async fn watch_for_interrupt<S>(
    signal: S,
    telemetry: Arc<dyn Telemetry>,
    cancel: CancellationToken,
) where
    S: Future<Output = &'static str>,
{
    tokio::select! {
        _ = cancel.cancelled() => {}
        name = signal => {
            warn!(signal = name, "interrupted by operator");
            cancel.cancel();
            telemetry
                .report("user_interrupted", vec![("signal", json!(name))])
                .await;
        }
    }
}

pub fn spawn_watcher(telemetry: Arc<dyn Telemetry>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(watch_for_interrupt(shutdown_signal(), telemetry, cancel))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::collaborators::testing::RecordingTelemetry;
    use crate::collaborators::Meta;

    /// Telemetry whose reports never complete.
    struct UnreachableMetrics;

    #[async_trait]
    impl Telemetry for UnreachableMetrics {
        fn disabled(&self) -> bool {
            false
        }

        fn install_id(&self) -> String {
            String::new()
        }

        fn trace_id(&self) -> String {
            String::new()
        }

        fn set_metadatum(&self, _key: &str, _value: Value) {}

        async fn report(&self, _event: &str, _meta: Meta) {
            std::future::pending::<()>().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn signal_cancels_and_reports() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let cancel = CancellationToken::new();
        let signal = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            "interrupt"
        };

        watch_for_interrupt(signal, telemetry.clone(), cancel.clone()).await;

        assert!(cancel.is_cancelled());
        let events = telemetry.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "user_interrupted");
        assert_eq!(events[0].1, vec![("signal", json!("interrupt"))]);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_run_stops_watching() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        watch_for_interrupt(std::future::pending(), telemetry.clone(), cancel).await;

        assert!(telemetry.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_report_does_not_delay_cancellation() {
        let cancel = CancellationToken::new();
        let signal = async { "terminated" };
        tokio::spawn(watch_for_interrupt(
            signal,
            Arc::new(UnreachableMetrics),
            cancel.clone(),
        ));

        tokio::time::timeout(Duration::from_millis(10), cancel.cancelled())
            .await
            .expect("cancelled before the report finishes");
    }
}

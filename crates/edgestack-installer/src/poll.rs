//! Bounded retry loop used for every convergence wait.
//!
//! A check is retried on a fixed cadence until it succeeds, reports a fatal
//! failure, the deadline passes, or the run is cancelled. One progress notice
//! is shown to the operator if the wait drags on; it never moves the deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use edgestack_core::PollTimings;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::collaborators::Console;
use crate::outcome::{PollFailure, StageOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    retry_interval: Duration,
    progress_interval: Duration,
    timeout: Duration,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("poll policy must satisfy retry ({retry:?}) < progress ({progress:?}) < timeout ({timeout:?})")]
pub struct InvalidPolicy {
    retry: Duration,
    progress: Duration,
    timeout: Duration,
}

impl PollPolicy {
    /// Checks expected to converge within a couple of minutes.
    pub const FAST: PollPolicy = PollPolicy {
        retry_interval: Duration::from_millis(500),
        progress_interval: Duration::from_secs(15),
        timeout: Duration::from_secs(120),
    };

    /// Load balancers and certificate issuance.
    pub const SLOW: PollPolicy = PollPolicy {
        retry_interval: Duration::from_secs(3),
        progress_interval: Duration::from_secs(30),
        timeout: Duration::from_secs(300),
    };

    pub fn new(
        retry_interval: Duration,
        progress_interval: Duration,
        timeout: Duration,
    ) -> Result<Self, InvalidPolicy> {
        if retry_interval < progress_interval && progress_interval < timeout {
            Ok(Self {
                retry_interval,
                progress_interval,
                timeout,
            })
        } else {
            Err(InvalidPolicy {
                retry: retry_interval,
                progress: progress_interval,
                timeout,
            })
        }
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn progress_interval(&self) -> Duration {
        self.progress_interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl TryFrom<PollTimings> for PollPolicy {
    type Error = InvalidPolicy;

    fn try_from(timings: PollTimings) -> Result<Self, Self::Error> {
        PollPolicy::new(
            Duration::from_millis(timings.retry_ms),
            Duration::from_millis(timings.progress_ms),
            Duration::from_millis(timings.timeout_ms),
        )
    }
}

/// Runs checks under a [`PollPolicy`], observing the run-wide cancellation.
#[derive(Clone)]
pub struct Poller {
    console: Arc<dyn Console>,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(console: Arc<dyn Console>, cancel: CancellationToken) -> Self {
        Self { console, cancel }
    }

    pub async fn until<T, F, Fut>(
        &self,
        what: &str,
        policy: PollPolicy,
        check: F,
    ) -> Result<T, PollFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StageOutcome<T>>,
    {
        let start = Instant::now();
        info!(what, "waiting");
        let result = self.poll(what, policy, check).await;
        info!(
            what,
            elapsed_secs = format!("{:.1}", start.elapsed().as_secs_f64()),
            succeeded = result.is_ok(),
            "wait finished"
        );
        result
    }

    async fn poll<T, F, Fut>(
        &self,
        what: &str,
        policy: PollPolicy,
        mut check: F,
    ) -> Result<T, PollFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StageOutcome<T>>,
    {
        let deadline = sleep(policy.timeout);
        let progress = sleep(policy.progress_interval);
        tokio::pin!(deadline);
        tokio::pin!(progress);
        let mut progress_shown = false;
        let mut last_cause = None;

        loop {
            // A check in flight is dropped on cancellation or at the deadline.
            let attempt = check();
            tokio::pin!(attempt);
            let outcome = loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        return Err(PollFailure::Interrupted { what: what.to_string() });
                    }
                    _ = &mut deadline => {
                        return Err(PollFailure::TimedOut { what: what.to_string(), last_cause });
                    }
                    _ = &mut progress, if !progress_shown => {
                        progress_shown = true;
                        self.show_progress(what);
                    }
                    outcome = &mut attempt => break outcome,
                }
            };

            match outcome {
                StageOutcome::Success(value) => return Ok(value),
                StageOutcome::Fatal(cause) => return Err(PollFailure::Fatal(cause)),
                StageOutcome::Retryable(cause) => {
                    debug!(what, cause = %cause, "not ready yet");
                    last_cause = Some(cause);
                }
            }

            let retry = sleep(policy.retry_interval);
            tokio::pin!(retry);
            loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        return Err(PollFailure::Interrupted { what: what.to_string() });
                    }
                    _ = &mut deadline => {
                        return Err(PollFailure::TimedOut { what: what.to_string(), last_cause });
                    }
                    _ = &mut progress, if !progress_shown => {
                        progress_shown = true;
                        self.show_progress(what);
                        break;
                    }
                    _ = &mut retry => break,
                }
            }
        }
    }

    fn show_progress(&self, what: &str) {
        self.console
            .show(&format!("   Still waiting for {what}. (This may take a minute.)"));
    }
}

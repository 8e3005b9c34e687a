//! Quality-gate polling.

use std::sync::Arc;
use std::time::Duration;

use lading_core::obs::emit_gate_polled;
use lading_core::{AnalysisService, PipelineError, QualityVerdict, Result};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Polls the analysis service until it decides or the deadline passes.
///
/// Holds no shared state beyond the service handle; loop counters are local
/// to each `await_verdict` call.
pub struct GatePoller {
    service: Arc<dyn AnalysisService>,
}

impl GatePoller {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self { service }
    }

    /// Wait for a terminal verdict on `check_id`.
    ///
    /// Returns the first `Passed`/`Failed` verdict, or `TimedOut` once
    /// `timeout` has elapsed, including while a query is still in flight.
    /// Query errors are logged and count as `Pending`.
    /// The wait before the last poll is clipped so that poll lands on the
    /// deadline. Fails only with `Cancelled`, promptly after `cancel` fires.
    pub async fn await_verdict(
        &self,
        check_id: &str,
        timeout: Duration,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<QualityVerdict> {
        let deadline = Instant::now() + timeout;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let answer = tokio::select! {
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                answer = tokio::time::timeout_at(deadline, self.service.get_verdict(check_id)) => answer,
            };

            let Ok(answer) = answer else {
                warn!(check_id = %check_id, attempt = attempt, "quality gate query still unanswered at deadline");
                return Ok(timed_out(check_id, timeout, attempt));
            };

            match answer {
                Ok(verdict) => {
                    emit_gate_polled(check_id, attempt, verdict.status);
                    if verdict.is_terminal() {
                        return Ok(verdict);
                    }
                }
                Err(e) => {
                    warn!(check_id = %check_id, attempt = attempt, error = %e, "quality gate query failed");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(timed_out(check_id, timeout, attempt));
            }

            let wait = poll_interval.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

fn timed_out(check_id: &str, timeout: Duration, attempt: u32) -> QualityVerdict {
    QualityVerdict::timed_out(format!(
        "no verdict for {} after {}s ({} polls)",
        check_id,
        timeout.as_secs(),
        attempt
    ))
}

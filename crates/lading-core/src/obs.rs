//! Structured observability hooks for the pipeline lifecycle.
//!
//! - `run_span` tags every record emitted during a run with `run_id`
//! - `emit_*` functions log one record per lifecycle event: run start, state
//!   transition, stage finish, gate poll, run finish, notifier failure
//!
//! Verbosity follows `LADING_LOG` / `RUST_LOG`; see
//! [`crate::telemetry::init_tracing`].

use tracing::{info, warn};

use crate::domain::{RunOutcome, RunState, StageStatus, VerdictStatus};

/// Span carrying `run_id`, for instrumenting the run future.
///
/// # Example
///
/// ```ignore
/// sequence(ctx, stages, cancel)
///     .instrument(run_span(&run_id))
///     .await;
/// // every record emitted inside carries run_id
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("lading.run", run_id = %run_id)
}

/// Emit event: run started with its revision, tag and declared stage count.
///
/// # Example
///
/// ```ignore
/// emit_run_started("6f1c9e", "a1b2c3d4e5f6", "2.3.1-a1b2c3d", 5);
/// // logs: event=run.started run_id=6f1c9e revision=a1b2c3d4e5f6 tag=2.3.1-a1b2c3d stages=5
/// ```
pub fn emit_run_started(run_id: &str, revision: &str, tag: &str, stage_count: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        revision = %revision,
        tag = %tag,
        stages = stage_count,
    );
}

/// Emit event: the run moved from one lifecycle state to the next.
pub fn emit_run_state(run_id: &str, from: RunState, to: RunState) {
    info!(
        event = "run.state",
        run_id = %run_id,
        from = %from,
        to = %to,
    );
}

/// Emit event: one stage finished with its status and duration.
///
/// Failed stages log at `warn` and carry the error text.
pub fn emit_stage_finished(
    stage: &str,
    status: StageStatus,
    duration_ms: u64,
    error: Option<&str>,
) {
    match error {
        Some(error) => warn!(
            event = "stage.finished",
            stage = %stage,
            status = %status,
            duration_ms = duration_ms,
            error = %error,
        ),
        None => info!(
            event = "stage.finished",
            stage = %stage,
            status = %status,
            duration_ms = duration_ms,
        ),
    }
}

/// Emit event: one quality-gate poll answered (debug level).
pub fn emit_gate_polled(check_id: &str, attempt: u32, status: VerdictStatus) {
    tracing::debug!(
        event = "gate.polled",
        check_id = %check_id,
        attempt = attempt,
        status = %status,
    );
}

/// Emit event: run sealed with outcome, duration and the first failed stage.
///
/// # Example
///
/// ```ignore
/// emit_run_finished("6f1c9e", RunOutcome::Failed, 8120, Some("scan"));
/// // logs: event=run.finished run_id=6f1c9e outcome=Failed duration_ms=8120 failed_stage=scan
/// ```
pub fn emit_run_finished(run_id: &str, outcome: RunOutcome, duration_ms: u64, failed_stage: Option<&str>) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        outcome = ?outcome,
        duration_ms = duration_ms,
        failed_stage = failed_stage.unwrap_or("-"),
    );
}

/// Emit event: a notification hook failed or panicked (warning level).
///
/// Hooks are best effort; this record is the only trace of the failure.
pub fn emit_notifier_error(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.notify_error", run_id = %run_id, error = %error);
}

//! Stage execution.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use lading_core::obs::emit_stage_finished;
use lading_core::{PipelineError, Result, RunContext, StageResult};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::stage::Stage;

/// Runs one stage and converts whatever happens into a [`StageResult`].
///
/// Errors, panics, stage timeouts and cancellation all become `Failed`
/// results carrying the cause as text; nothing propagates past `run`.
pub struct StageRunner;

impl StageRunner {
    pub async fn run(stage: &Stage, ctx: &RunContext, cancel: &CancellationToken) -> StageResult {
        let start = Instant::now();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            res = Self::guarded(stage, ctx, cancel) => res,
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let result = match outcome {
            Ok(()) => StageResult::passed(&stage.name, duration_ms),
            Err(e) => StageResult::failed(&stage.name, e.to_string(), duration_ms),
        };

        emit_stage_finished(
            &result.stage_name,
            result.status,
            result.duration_ms,
            result.error.as_deref(),
        );
        result
    }

    async fn guarded(stage: &Stage, ctx: &RunContext, cancel: &CancellationToken) -> Result<()> {
        let action = AssertUnwindSafe(stage.action.execute(ctx, cancel)).catch_unwind();

        let caught = match stage.timeout {
            Some(limit) => tokio::time::timeout(limit, action)
                .await
                .map_err(|_| PipelineError::Timeout {
                    what: format!("stage '{}'", stage.name),
                    secs: limit.as_secs(),
                })?,
            None => action.await,
        };

        caught.map_err(|payload| {
            PipelineError::Collaborator(format!(
                "stage '{}' panicked: {}",
                stage.name,
                panic_message(payload.as_ref())
            ))
        })?
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lading_core::{Revision, StageStatus};
    use std::time::Duration;

    fn ctx() -> RunContext {
        RunContext::new(Revision::parse("a1b2c3d4").unwrap(), "1.0.0", "registry.local/app").unwrap()
    }

    #[tokio::test]
    async fn test_passing_stage() {
        let stage = Stage::from_fn("build", |_ctx| async { Ok(()) });
        let result = StageRunner::run(&stage, &ctx(), &CancellationToken::new()).await;
        assert_eq!(result.status, StageStatus::Passed);
        assert_eq!(result.stage_name, "build");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_error_becomes_failed_result() {
        let stage = Stage::from_fn("build", |_ctx| async {
            Err(PipelineError::BuildFailure("exit code 2".to_string()))
        });
        let result = StageRunner::run(&stage, &ctx(), &CancellationToken::new()).await;
        assert_eq!(result.status, StageStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("build failed: exit code 2"));
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_result() {
        let stage = Stage::from_fn("scan", |_ctx| async {
            if true {
                panic!("scanner exploded");
            }
            Ok(())
        });
        let result = StageRunner::run(&stage, &ctx(), &CancellationToken::new()).await;
        assert_eq!(result.status, StageStatus::Failed);
        assert!(result.error.unwrap().contains("scanner exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_timeout() {
        let stage = Stage::from_fn("push", |_ctx| async {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(())
        })
        .with_timeout(Duration::from_secs(5));
        let result = StageRunner::run(&stage, &ctx(), &CancellationToken::new()).await;
        assert_eq!(result.status, StageStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("stage 'push' timed out after 5s"));
    }

    #[tokio::test]
    async fn test_cancelled_stage_fails() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stage = Stage::from_fn("deploy", |_ctx| async {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(())
        });
        let result = StageRunner::run(&stage, &ctx(), &cancel).await;
        assert_eq!(result.status, StageStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
    }
}

//! Pipeline sequencing and the run entry point.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use lading_core::obs::{
    emit_notifier_error, emit_run_finished, emit_run_started, emit_run_state, run_span,
};
use lading_core::{
    PipelineRun, Result, RunContext, RunNotifier, RunRecorder, RunState, SourceControl,
    StageResult,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

use crate::runner::{panic_message, StageRunner};
use crate::stage::Stage;
use crate::stages::PipelineSettings;

/// Runs stages in strict order and reports the completed run once.
pub struct PipelineSequencer {
    notifier: Arc<dyn RunNotifier>,
}

impl PipelineSequencer {
    pub fn new(notifier: Arc<dyn RunNotifier>) -> Self {
        Self { notifier }
    }

    /// Execute `stages` against `ctx`.
    ///
    /// The first failed critical stage, or cancellation, marks every stage
    /// not yet started as `Skipped`. A failed non-critical stage is recorded
    /// and the sequence goes on. Exactly one notifier hook is called with
    /// the sealed run; its error or panic is logged and does not change the
    /// outcome.
    pub async fn execute(
        &self,
        ctx: &RunContext,
        stages: Vec<Stage>,
        cancel: &CancellationToken,
    ) -> PipelineRun {
        let run_id = ctx.run_id.to_string();
        self.sequence(ctx, stages, cancel)
            .instrument(run_span(&run_id))
            .await
    }

    async fn sequence(
        &self,
        ctx: &RunContext,
        stages: Vec<Stage>,
        cancel: &CancellationToken,
    ) -> PipelineRun {
        let run_id = ctx.run_id.to_string();
        emit_run_started(&run_id, ctx.revision.full(), ctx.tag.as_str(), stages.len());

        let mut recorder = RunRecorder::new(ctx);
        recorder.start();
        emit_run_state(&run_id, RunState::NotStarted, recorder.state());
        let mut aborted = false;

        for stage in &stages {
            if aborted {
                recorder.record(StageResult::skipped(&stage.name));
                continue;
            }
            if cancel.is_cancelled() {
                info!(stage = %stage.name, "run cancelled, skipping remaining stages");
                aborted = true;
                recorder.record(StageResult::skipped(&stage.name));
                continue;
            }

            let result = StageRunner::run(stage, ctx, cancel).await;
            if result.is_failed() && stage.critical {
                aborted = true;
            }
            recorder.record(result);
        }

        let before = recorder.state();
        let run = recorder.finish();
        emit_run_state(&run_id, before, run.state());
        emit_run_finished(
            &run_id,
            run.outcome(),
            run.duration_ms(),
            run.failed_stage().map(|s| s.stage_name.as_str()),
        );

        self.notify(&run_id, &run).await;
        run
    }

    async fn notify(&self, run_id: &str, run: &PipelineRun) {
        let hook = async {
            if run.is_success() {
                self.notifier.on_success(run).await
            } else {
                self.notifier.on_failure(run).await
            }
        };
        match AssertUnwindSafe(hook).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => emit_notifier_error(run_id, &e),
            Err(payload) => emit_notifier_error(
                run_id,
                &format!("notifier panicked: {}", panic_message(payload.as_ref())),
            ),
        }
    }
}

/// Validate settings, resolve the revision, fix the run context and execute
/// the stages.
///
/// `build_stages` receives the context so stage sets can depend on it.
/// Fails only when no run can start (invalid settings, revision resolution,
/// tag composition); stage failures are reported inside the returned run.
pub async fn run_pipeline<F>(
    source: &dyn SourceControl,
    settings: &PipelineSettings,
    build_stages: F,
    notifier: Arc<dyn RunNotifier>,
    cancel: &CancellationToken,
) -> Result<PipelineRun>
where
    F: FnOnce(&RunContext) -> Vec<Stage>,
{
    settings.validate()?;
    let revision = source.resolve_revision().await?;
    let ctx = RunContext::new(revision, &settings.version, &settings.image_repository)?;
    info!(run_id = %ctx.run_id, tag = %ctx.tag, image = %ctx.image, "run context ready");

    let stages = build_stages(&ctx);
    Ok(PipelineSequencer::new(notifier)
        .execute(&ctx, stages, cancel)
        .await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lading_core::fakes::RecordingNotifier;
    use async_trait::async_trait;
    use lading_core::{PipelineError, Revision, RunOutcome, StageStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct PanickingNotifier;

    #[async_trait]
    impl RunNotifier for PanickingNotifier {
        async fn on_success(&self, _run: &PipelineRun) -> Result<()> {
            panic!("webhook client poisoned");
        }

        async fn on_failure(&self, _run: &PipelineRun) -> Result<()> {
            panic!("webhook client poisoned");
        }
    }

    fn ctx() -> RunContext {
        RunContext::new(Revision::parse("a1b2c3d4e5f6").unwrap(), "2.3.1", "registry.local/web")
            .unwrap()
    }

    fn passing(name: &str, calls: Arc<AtomicUsize>) -> Stage {
        Stage::from_fn(name, move |_ctx| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn failing(name: &str) -> Stage {
        Stage::from_fn(name, |_ctx| async {
            Err(PipelineError::Collaborator("boom".to_string()))
        })
    }

    fn statuses(run: &PipelineRun) -> Vec<StageStatus> {
        run.stages().iter().map(|s| s.status).collect()
    }

    #[tokio::test]
    async fn test_all_passed_notifies_success_once() {
        let notifier = Arc::new(RecordingNotifier::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let stages = (0..4)
            .map(|i| passing(&format!("s{i}"), calls.clone()))
            .collect();

        let run = PipelineSequencer::new(notifier.clone())
            .execute(&ctx(), stages, &CancellationToken::new())
            .await;

        assert_eq!(run.outcome(), RunOutcome::Success);
        assert_eq!(run.count(StageStatus::Passed), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(notifier.successes().len(), 1);
        assert!(notifier.failures().is_empty());
    }

    #[tokio::test]
    async fn test_critical_failure_skips_the_rest() {
        // For every position k, stage k fails.
        for k in 0..5 {
            let notifier = Arc::new(RecordingNotifier::new());
            let calls = Arc::new(AtomicUsize::new(0));
            let stages = (0..5)
                .map(|i| {
                    if i == k {
                        failing(&format!("s{i}"))
                    } else {
                        passing(&format!("s{i}"), calls.clone())
                    }
                })
                .collect();

            let run = PipelineSequencer::new(notifier.clone())
                .execute(&ctx(), stages, &CancellationToken::new())
                .await;

            let mut expected = vec![StageStatus::Passed; k];
            expected.push(StageStatus::Failed);
            expected.extend(vec![StageStatus::Skipped; 4 - k]);
            assert_eq!(statuses(&run), expected, "failing stage {k}");
            assert_eq!(calls.load(Ordering::SeqCst), k);
            assert_eq!(run.outcome(), RunOutcome::Failed);
            assert_eq!(run.failed_stage().unwrap().stage_name, format!("s{k}"));
            assert_eq!(notifier.failures().len(), 1);
            assert!(notifier.successes().is_empty());
        }
    }

    #[tokio::test]
    async fn test_non_critical_failure_continues() {
        let notifier = Arc::new(RecordingNotifier::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let stages = vec![
            passing("build", calls.clone()),
            failing("lint").non_critical(),
            passing("push", calls.clone()),
        ];

        let run = PipelineSequencer::new(notifier.clone())
            .execute(&ctx(), stages, &CancellationToken::new())
            .await;

        assert_eq!(
            statuses(&run),
            vec![StageStatus::Passed, StageStatus::Failed, StageStatus::Passed]
        );
        assert_eq!(run.outcome(), RunOutcome::Failed);
        assert_eq!(notifier.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_everything() {
        let notifier = Arc::new(RecordingNotifier::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let run = PipelineSequencer::new(notifier.clone())
            .execute(
                &ctx(),
                vec![passing("a", calls.clone()), passing("b", calls.clone())],
                &cancel,
            )
            .await;

        assert_eq!(statuses(&run), vec![StageStatus::Skipped, StageStatus::Skipped]);
        assert_eq!(run.outcome(), RunOutcome::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(notifier.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_broken_notifier_does_not_change_outcome() {
        let notifier = Arc::new(RecordingNotifier::broken());
        let calls = Arc::new(AtomicUsize::new(0));

        let run = PipelineSequencer::new(notifier.clone())
            .execute(&ctx(), vec![passing("a", calls)], &CancellationToken::new())
            .await;

        assert!(run.is_success());
        assert_eq!(notifier.successes().len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_notifier_is_contained() {
        let calls = Arc::new(AtomicUsize::new(0));

        let run = PipelineSequencer::new(Arc::new(PanickingNotifier))
            .execute(&ctx(), vec![passing("a", calls.clone())], &CancellationToken::new())
            .await;

        assert!(run.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_returned_run_is_finished() {
        let calls = Arc::new(AtomicUsize::new(0));

        let run = PipelineSequencer::new(Arc::new(RecordingNotifier::new()))
            .execute(
                &ctx(),
                vec![passing("a", calls), failing("b")],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(run.state(), RunState::Finished(RunOutcome::Failed));
    }
}

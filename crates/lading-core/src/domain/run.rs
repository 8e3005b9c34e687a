//! Run records: per-stage results and the completed pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::revision::{ArtifactTag, ImageRef, Revision};
use super::tag::TagComposer;
use crate::error::Result;

/// Final status of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Passed,
    Failed,
    Skipped,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageStatus::Passed => "passed",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_name: String,
    pub status: StageStatus,
    /// Failure cause, present only for `Failed`.
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl StageResult {
    pub fn passed(stage_name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Passed,
            error: None,
            duration_ms,
        }
    }

    pub fn failed(stage_name: impl Into<String>, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Failed,
            error: Some(error.into()),
            duration_ms,
        }
    }

    pub fn skipped(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Skipped,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == StageStatus::Passed
    }

    pub fn is_failed(&self) -> bool {
        self.status == StageStatus::Failed
    }
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failed,
}

/// Lifecycle of a run: `NotStarted -> Running -> {Success, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Finished(RunOutcome),
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::NotStarted => "not_started",
            RunState::Running => "running",
            RunState::Finished(RunOutcome::Success) => "success",
            RunState::Finished(RunOutcome::Failed) => "failed",
        };
        f.write_str(s)
    }
}

/// Inputs fixed once per run and handed by reference to every stage.
///
/// The tag is composed here exactly once; stages never resolve the
/// revision again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: Uuid,
    pub revision: Revision,
    pub tag: ArtifactTag,
    pub image: ImageRef,
}

impl RunContext {
    pub fn new(revision: Revision, version: &str, image_repository: &str) -> Result<Self> {
        let tag = TagComposer::compose(version, revision.full())?;
        let image = ImageRef::new(image_repository, tag.clone());
        Ok(Self {
            run_id: Uuid::new_v4(),
            revision,
            tag,
            image,
        })
    }
}

/// Stack-local accumulator for stage results.
///
/// Results can only be appended; [`RunRecorder::finish`] consumes the
/// recorder so a completed [`PipelineRun`] has no mutable alias.
#[derive(Debug)]
pub struct RunRecorder {
    run_id: Uuid,
    revision: Revision,
    tag: ArtifactTag,
    stages: Vec<StageResult>,
    started_at: DateTime<Utc>,
    state: RunState,
}

impl RunRecorder {
    pub fn new(context: &RunContext) -> Self {
        Self {
            run_id: context.run_id,
            revision: context.revision.clone(),
            tag: context.tag.clone(),
            stages: Vec::new(),
            started_at: Utc::now(),
            state: RunState::NotStarted,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Move to `Running` and restart the clock. No-op once running.
    pub fn start(&mut self) {
        if self.state == RunState::NotStarted {
            self.started_at = Utc::now();
            self.state = RunState::Running;
        }
    }

    /// Append a result; recording into a fresh recorder starts it.
    pub fn record(&mut self, result: StageResult) {
        self.start();
        self.stages.push(result);
    }

    /// Seal the run. The outcome is `Success` only if every stage passed;
    /// the sealed run reports `RunState::Finished(outcome)`.
    pub fn finish(self) -> PipelineRun {
        let outcome = if self.stages.iter().all(|s| s.is_passed()) {
            RunOutcome::Success
        } else {
            RunOutcome::Failed
        };
        let finished_at = Utc::now();
        let duration_ms = (finished_at - self.started_at).num_milliseconds().max(0) as u64;
        PipelineRun {
            run_id: self.run_id,
            revision: self.revision,
            tag: self.tag,
            stages: self.stages,
            outcome,
            started_at: self.started_at,
            finished_at,
            duration_ms,
        }
    }
}

/// A completed pipeline run: the audit record handed to notifiers and
/// written by `lading run --report`.
///
/// Fields are private; a run is read-only once [`RunRecorder::finish`]
/// returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    run_id: Uuid,
    revision: Revision,
    tag: ArtifactTag,
    stages: Vec<StageResult>,
    outcome: RunOutcome,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    duration_ms: u64,
}

impl PipelineRun {
    /// Unique id of this execution, also carried by every log record.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Source revision resolved once at run start.
    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    /// Artifact tag shared by the built, scanned, pushed and deployed image.
    pub fn tag(&self) -> &ArtifactTag {
        &self.tag
    }

    /// One result per declared stage, in execution order.
    pub fn stages(&self) -> &[StageResult] {
        &self.stages
    }

    pub fn outcome(&self) -> RunOutcome {
        self.outcome
    }

    /// Always `Finished`: a `PipelineRun` only exists once sealed.
    pub fn state(&self) -> RunState {
        RunState::Finished(self.outcome)
    }

    /// `true` iff every stage passed; drives the CLI exit code.
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// Wall-clock time from start to seal.
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// The first stage that failed, if any.
    pub fn failed_stage(&self) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.is_failed())
    }

    /// Number of stages with `status`.
    pub fn count(&self, status: StageStatus) -> usize {
        self.stages.iter().filter(|s| s.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RunContext {
        RunContext::new(Revision::parse("a1b2c3d4e5f6").unwrap(), "2.3.1", "registry.local/web").unwrap()
    }

    #[test]
    fn test_context_composes_tag_once() {
        let ctx = context();
        assert_eq!(ctx.tag.as_str(), "2.3.1-a1b2c3d");
        assert_eq!(ctx.image.tag, ctx.tag);
        assert_eq!(ctx.image.to_string(), "registry.local/web:2.3.1-a1b2c3d");
    }

    #[test]
    fn test_recorder_all_passed_is_success() {
        let mut recorder = RunRecorder::new(&context());
        assert_eq!(recorder.state(), RunState::NotStarted);
        recorder.record(StageResult::passed("build", 10));
        recorder.record(StageResult::passed("scan", 5));
        assert_eq!(recorder.state(), RunState::Running);

        let run = recorder.finish();
        assert!(run.is_success());
        assert_eq!(run.count(StageStatus::Passed), 2);
        assert!(run.failed_stage().is_none());
    }

    #[test]
    fn test_state_moves_through_lifecycle() {
        let mut recorder = RunRecorder::new(&context());
        assert_eq!(recorder.state(), RunState::NotStarted);

        recorder.start();
        assert_eq!(recorder.state(), RunState::Running);
        assert_eq!(recorder.state().to_string(), "running");

        recorder.record(StageResult::failed("build", "exit 2", 10));
        let run = recorder.finish();

        assert_eq!(run.state(), RunState::Finished(RunOutcome::Failed));
        assert_eq!(run.state().to_string(), "failed");
    }

    #[test]
    fn test_start_twice_keeps_first_start_time() {
        let mut recorder = RunRecorder::new(&context());
        recorder.start();
        let started = recorder.started_at;
        recorder.start();
        assert_eq!(recorder.started_at, started);
    }

    #[test]
    fn test_recorder_with_failure_is_failed() {
        let mut recorder = RunRecorder::new(&context());
        recorder.record(StageResult::passed("build", 10));
        recorder.record(StageResult::failed("scan", "CVE-2024-0001", 5));
        recorder.record(StageResult::skipped("push"));

        let run = recorder.finish();
        assert_eq!(run.outcome(), RunOutcome::Failed);
        assert_eq!(run.failed_stage().unwrap().stage_name, "scan");
        assert_eq!(run.count(StageStatus::Skipped), 1);
    }

    #[test]
    fn test_empty_run_is_success() {
        let run = RunRecorder::new(&context()).finish();
        assert_eq!(run.outcome(), RunOutcome::Success);
        assert!(run.stages().is_empty());
    }

    #[test]
    fn test_run_serializes_to_json() {
        let mut recorder = RunRecorder::new(&context());
        recorder.record(StageResult::passed("build", 10));
        let run = recorder.finish();

        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["tag"], "2.3.1-a1b2c3d");
        assert_eq!(json["revision"], "a1b2c3d4e5f6");
        assert_eq!(json["outcome"], "success");
        assert_eq!(json["stages"][0]["status"], "passed");

        let back: PipelineRun = serde_json::from_value(json).unwrap();
        assert_eq!(back, run);
    }
}

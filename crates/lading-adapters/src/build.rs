//! Build and test through configured commands.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use lading_core::{BuildReport, BuildTool, PipelineError, Result};
use tracing::{info, warn};

use crate::process::Invocation;

/// Runs a build command, then a test command, in the working tree.
#[derive(Debug, Clone)]
pub struct CommandBuildTool {
    workdir: PathBuf,
    build: Vec<String>,
    test: Vec<String>,
    timeout: Option<Duration>,
    test_report: Option<PathBuf>,
}

impl CommandBuildTool {
    /// `build` and `test` are argv vectors; an empty `test` skips testing.
    pub fn new(workdir: impl Into<PathBuf>, build: Vec<String>, test: Vec<String>) -> Self {
        Self {
            workdir: workdir.into(),
            build,
            test,
            timeout: None,
            test_report: None,
        }
    }

    /// Per-command time limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Report file the test command writes, relative to the working tree.
    pub fn with_test_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.test_report = Some(path.into());
        self
    }
}

#[async_trait]
impl BuildTool for CommandBuildTool {
    async fn build_and_test(&self) -> Result<BuildReport> {
        let build = Invocation::from_argv(&self.build)?
            .current_dir(&self.workdir)
            .timeout(self.timeout);
        let out = build.checked(PipelineError::BuildFailure).await?;
        info!(command = %build.display(), duration_ms = out.duration_ms, "build finished");

        if self.test.is_empty() {
            return Ok(BuildReport::default());
        }

        let test = Invocation::from_argv(&self.test)?
            .current_dir(&self.workdir)
            .timeout(self.timeout);
        let out = test.checked(PipelineError::TestFailure).await?;
        info!(command = %test.display(), duration_ms = out.duration_ms, "tests finished");

        let test_report = self.test_report.as_ref().and_then(|rel| {
            let path = self.workdir.join(rel);
            if path.is_file() {
                Some(path)
            } else {
                warn!(path = %path.display(), "configured test report was not written");
                None
            }
        });
        Ok(BuildReport { test_report })
    }
}

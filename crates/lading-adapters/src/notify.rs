//! Post-run notifications.

use std::time::Duration;

use async_trait::async_trait;
use lading_core::{PipelineError, PipelineRun, Result, RunNotifier, StageStatus};
use serde::Serialize;
use tracing::{info, warn};

/// Writes a one-line run summary to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl RunNotifier for LogNotifier {
    async fn on_success(&self, run: &PipelineRun) -> Result<()> {
        info!(
            run_id = %run.run_id(),
            tag = %run.tag(),
            stages = run.count(StageStatus::Passed),
            duration_ms = run.duration_ms(),
            "pipeline succeeded"
        );
        Ok(())
    }

    async fn on_failure(&self, run: &PipelineRun) -> Result<()> {
        let failed = run.failed_stage();
        warn!(
            run_id = %run.run_id(),
            tag = %run.tag(),
            stage = failed.map(|s| s.stage_name.as_str()).unwrap_or("-"),
            error = failed.and_then(|s| s.error.as_deref()).unwrap_or("-"),
            skipped = run.count(StageStatus::Skipped),
            "pipeline failed"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    event: &'static str,
    run: &'a PipelineRun,
}

/// POSTs the run as JSON to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("lading/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PipelineError::Collaborator(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn post(&self, event: &'static str, run: &PipelineRun) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { event, run })
            .send()
            .await
            .map_err(|e| PipelineError::Collaborator(format!("webhook {event} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Collaborator(format!(
                "webhook {event} returned {status}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RunNotifier for WebhookNotifier {
    async fn on_success(&self, run: &PipelineRun) -> Result<()> {
        self.post("run.succeeded", run).await
    }

    async fn on_failure(&self, run: &PipelineRun) -> Result<()> {
        self.post("run.failed", run).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lading_core::{Revision, RunContext, RunRecorder, StageResult};
    use mockito::Matcher;
    use serde_json::json;

    fn run(failed: bool) -> PipelineRun {
        let ctx = RunContext::new(Revision::parse("a1b2c3d4e5f6").unwrap(), "2.3.1", "registry.local/web")
            .unwrap();
        let mut recorder = RunRecorder::new(&ctx);
        recorder.record(StageResult::passed("build", 1200));
        if failed {
            recorder.record(StageResult::failed("scan", "scan found 1 finding(s)", 300));
            recorder.record(StageResult::skipped("push"));
        }
        recorder.finish()
    }

    #[tokio::test]
    async fn test_webhook_posts_run_json() {
        let mut server = mockito::Server::new_async().await;
        let hook = server
            .mock("POST", "/hooks/deploy")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "event": "run.failed",
                "run": {"tag": "2.3.1-a1b2c3d", "outcome": "failed"}
            })))
            .with_status(204)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hooks/deploy", server.url())).unwrap();
        notifier.on_failure(&run(true)).await.unwrap();

        hook.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(500)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.url())).unwrap();
        let err = notifier.on_success(&run(false)).await.unwrap_err();

        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.on_success(&run(false)).await.is_ok());
        assert!(LogNotifier.on_failure(&run(true)).await.is_ok());
    }
}

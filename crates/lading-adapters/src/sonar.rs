//! SonarQube analysis and quality gate.
//!
//! Submission runs the scanner CLI, which uploads the analysis and leaves a
//! `report-task.txt` naming the compute-engine task. Polling reads the task
//! status from `/api/ce/task` and, once the task succeeded, the gate status of
//! the resulting analysis from `/api/qualitygates/project_status`.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use lading_core::{AnalysisService, PipelineError, QualityVerdict, Result};
use serde::Deserialize;
use tracing::info;

use crate::process::Invocation;

/// Report file written by the scanner, relative to the working tree.
pub const DEFAULT_REPORT_TASK: &str = ".scannerwork/report-task.txt";

#[derive(Debug, Clone)]
pub struct SonarAnalysisService {
    client: reqwest::Client,
    host_url: String,
    token: Option<String>,
    scanner: Vec<String>,
    workdir: PathBuf,
    report_task: PathBuf,
    scanner_timeout: Option<Duration>,
}

impl SonarAnalysisService {
    /// `scanner` is the scanner argv, e.g. `["sonar-scanner"]`.
    pub fn new(
        host_url: impl Into<String>,
        token: Option<String>,
        scanner: Vec<String>,
        workdir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("lading/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::Collaborator(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            host_url: host_url.into().trim_end_matches('/').to_string(),
            token,
            scanner,
            workdir: workdir.into(),
            report_task: PathBuf::from(DEFAULT_REPORT_TASK),
            scanner_timeout: None,
        })
    }

    pub fn with_report_task(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_task = path.into();
        self
    }

    pub fn with_scanner_timeout(mut self, timeout: Duration) -> Self {
        self.scanner_timeout = Some(timeout);
        self
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.host_url, path);
        let mut request = self.client.get(&url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::Collaborator(format!("GET {path} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Collaborator(format!(
                "GET {path} returned {status}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PipelineError::Collaborator(format!("GET {path}: unexpected body: {e}")))
    }
}

#[async_trait]
impl AnalysisService for SonarAnalysisService {
    async fn submit_analysis(&self, project_key: &str, version: &str) -> Result<String> {
        let mut scan = Invocation::from_argv(&self.scanner)?
            .arg(format!("-Dsonar.projectKey={project_key}"))
            .arg(format!("-Dsonar.projectVersion={version}"))
            .arg(format!("-Dsonar.host.url={}", self.host_url))
            .current_dir(&self.workdir)
            .timeout(self.scanner_timeout);
        if let Some(token) = &self.token {
            scan = scan.env("SONAR_TOKEN", token);
        }
        scan.checked(PipelineError::Collaborator).await?;

        let path = self.workdir.join(&self.report_task);
        let report = tokio::fs::read_to_string(&path).await.map_err(|e| {
            PipelineError::Collaborator(format!("cannot read {}: {e}", path.display()))
        })?;
        let task_id = parse_report_task(&report).ok_or_else(|| {
            PipelineError::Collaborator(format!("no ceTaskId in {}", path.display()))
        })?;

        info!(project = %project_key, task_id = %task_id, "analysis uploaded");
        Ok(task_id)
    }

    async fn get_verdict(&self, check_id: &str) -> Result<QualityVerdict> {
        let task: CeTaskResponse = self.get_json("/api/ce/task", &[("id", check_id)]).await?;
        match task.task.status.as_str() {
            "PENDING" | "IN_PROGRESS" => Ok(QualityVerdict::pending()),
            "SUCCESS" => {
                let analysis_id = task.task.analysis_id.ok_or_else(|| {
                    PipelineError::Collaborator(format!("task {check_id} succeeded without an analysis id"))
                })?;
                let gate: ProjectStatusResponse = self
                    .get_json(
                        "/api/qualitygates/project_status",
                        &[("analysisId", analysis_id.as_str())],
                    )
                    .await?;
                Ok(verdict_from_gate(&gate.project_status))
            }
            other => Ok(QualityVerdict::failed(vec![format!(
                "analysis task {check_id} ended {other}"
            )])),
        }
    }
}

/// `ceTaskId` from the scanner's `key=value` report file.
pub fn parse_report_task(content: &str) -> Option<String> {
    content
        .lines()
        .filter_map(|line| line.split_once('='))
        .find(|(key, _)| key.trim() == "ceTaskId")
        .map(|(_, value)| value.trim().to_string())
        .filter(|id| !id.is_empty())
}

#[derive(Debug, Deserialize)]
struct CeTaskResponse {
    task: CeTask,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CeTask {
    status: String,
    analysis_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectStatusResponse {
    project_status: ProjectStatus,
}

#[derive(Debug, Deserialize)]
struct ProjectStatus {
    status: String,
    #[serde(default)]
    conditions: Vec<GateCondition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GateCondition {
    status: String,
    metric_key: String,
    comparator: Option<String>,
    error_threshold: Option<String>,
    actual_value: Option<String>,
}

fn verdict_from_gate(gate: &ProjectStatus) -> QualityVerdict {
    match gate.status.as_str() {
        "OK" | "WARN" => QualityVerdict::passed(),
        "ERROR" => QualityVerdict::failed(
            gate.conditions
                .iter()
                .filter(|c| c.status == "ERROR")
                .map(describe_condition)
                .collect(),
        ),
        other => QualityVerdict::failed(vec![format!("quality gate status {other}")]),
    }
}

/// `new_coverage 41.2 < 80` for a condition that errors when `LT` 80.
fn describe_condition(c: &GateCondition) -> String {
    let op = match c.comparator.as_deref() {
        Some("LT") => "<",
        Some("GT") => ">",
        Some("EQ") => "==",
        Some("NE") => "!=",
        _ => "vs",
    };
    format!(
        "{} {} {} {}",
        c.metric_key,
        c.actual_value.as_deref().unwrap_or("?"),
        op,
        c.error_threshold.as_deref().unwrap_or("?")
    )
}

//! The standard build, gate, scan, push and deploy stages.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lading_core::{
    AnalysisService, BuildTool, ConfigStore, CredentialLease, CredentialProvider, ImageBuilder,
    PipelineError, Registry, Result, RunContext, Scanner, Severity,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::mutator::{StateMutator, DEFAULT_TAG_FIELD};
use crate::poller::GatePoller;
use crate::stage::{Stage, StageAction};

pub const BUILD_STAGE: &str = "build";
pub const QUALITY_GATE_STAGE: &str = "quality-gate";
pub const SCAN_STAGE: &str = "scan";
pub const PUSH_STAGE: &str = "push";
pub const DEPLOY_STAGE: &str = "deploy";

/// Credential scope for registry pushes.
pub const REGISTRY_SCOPE: &str = "registry";
/// Credential scope for config-store commits.
pub const CONFIG_STORE_SCOPE: &str = "config-store";

/// How many findings a scan failure lists before summarising the rest.
const SCAN_SUMMARY_LIMIT: usize = 5;

/// Handles to every external system the standard stages drive.
#[derive(Clone)]
pub struct Collaborators {
    pub build_tool: Arc<dyn BuildTool>,
    pub analysis: Arc<dyn AnalysisService>,
    pub image_builder: Arc<dyn ImageBuilder>,
    pub scanner: Arc<dyn Scanner>,
    pub registry: Arc<dyn Registry>,
    pub config_store: Arc<dyn ConfigStore>,
    pub credentials: Arc<dyn CredentialProvider>,
}

/// Quality-gate polling bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Run-independent inputs of the standard pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub version: String,
    pub project_key: String,
    pub image_repository: String,
    pub gate: GateSettings,
    pub severity_threshold: Severity,
    /// Path of the values document inside the config store.
    pub config_path: String,
    /// Dotted key path of the image tag inside that document.
    pub tag_field: String,
}

impl PipelineSettings {
    pub fn new(
        version: impl Into<String>,
        project_key: impl Into<String>,
        image_repository: impl Into<String>,
        config_path: impl Into<String>,
    ) -> Self {
        Self {
            version: version.into(),
            project_key: project_key.into(),
            image_repository: image_repository.into(),
            gate: GateSettings::default(),
            severity_threshold: Severity::Critical,
            config_path: config_path.into(),
            tag_field: DEFAULT_TAG_FIELD.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(PipelineError::InvalidVersion("version is empty".to_string()));
        }
        if self.image_repository.trim().is_empty() {
            return Err(PipelineError::Settings("image repository is empty".to_string()));
        }
        if self.config_path.trim().is_empty() {
            return Err(PipelineError::Settings("config path is empty".to_string()));
        }
        if self.gate.poll_interval.is_zero() {
            return Err(PipelineError::Settings(
                "gate poll interval must be positive".to_string(),
            ));
        }
        if self.gate.poll_interval > self.gate.timeout {
            return Err(PipelineError::Settings(format!(
                "gate poll interval ({}s) exceeds gate timeout ({}s)",
                self.gate.poll_interval.as_secs(),
                self.gate.timeout.as_secs()
            )));
        }
        Ok(())
    }
}

/// The five standard stages, in order, all critical.
pub fn standard_stages(collab: &Collaborators, settings: &PipelineSettings) -> Vec<Stage> {
    vec![
        Stage::new(
            BUILD_STAGE,
            BuildStage {
                build_tool: collab.build_tool.clone(),
                image_builder: collab.image_builder.clone(),
            },
        ),
        Stage::new(
            QUALITY_GATE_STAGE,
            QualityGateStage {
                analysis: collab.analysis.clone(),
                project_key: settings.project_key.clone(),
                version: settings.version.clone(),
                gate: settings.gate,
            },
        ),
        Stage::new(
            SCAN_STAGE,
            ScanStage {
                scanner: collab.scanner.clone(),
                threshold: settings.severity_threshold,
            },
        ),
        Stage::new(
            PUSH_STAGE,
            PushStage {
                registry: collab.registry.clone(),
                credentials: collab.credentials.clone(),
            },
        ),
        Stage::new(
            DEPLOY_STAGE,
            DeployStage {
                mutator: StateMutator::with_field(
                    collab.config_store.clone(),
                    settings.tag_field.clone(),
                ),
                credentials: collab.credentials.clone(),
                config_path: settings.config_path.clone(),
            },
        ),
    ]
}

// ---------------------------------------------------------------------------
// build
// ---------------------------------------------------------------------------

pub struct BuildStage {
    build_tool: Arc<dyn BuildTool>,
    image_builder: Arc<dyn ImageBuilder>,
}

#[async_trait]
impl StageAction for BuildStage {
    async fn execute(&self, ctx: &RunContext, _cancel: &CancellationToken) -> Result<()> {
        let report = self.build_tool.build_and_test().await?;
        if let Some(path) = &report.test_report {
            info!(report = %path.display(), "test report written");
        }

        let built = self.image_builder.build_image(&ctx.image).await?;
        if built != ctx.image {
            return Err(PipelineError::BuildFailure(format!(
                "image builder produced {built}, expected {}",
                ctx.image
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// quality-gate
// ---------------------------------------------------------------------------

pub struct QualityGateStage {
    analysis: Arc<dyn AnalysisService>,
    project_key: String,
    version: String,
    gate: GateSettings,
}

#[async_trait]
impl StageAction for QualityGateStage {
    async fn execute(&self, _ctx: &RunContext, cancel: &CancellationToken) -> Result<()> {
        let check_id = self
            .analysis
            .submit_analysis(&self.project_key, &self.version)
            .await?;
        info!(check_id = %check_id, project = %self.project_key, "analysis submitted");

        let verdict = GatePoller::new(self.analysis.clone())
            .await_verdict(&check_id, self.gate.timeout, self.gate.poll_interval, cancel)
            .await?;

        if verdict.is_passed() {
            Ok(())
        } else {
            Err(PipelineError::QualityGateFailure {
                status: verdict.status,
                reasons: verdict.reasons,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// scan
// ---------------------------------------------------------------------------

pub struct ScanStage {
    scanner: Arc<dyn Scanner>,
    threshold: Severity,
}

#[async_trait]
impl StageAction for ScanStage {
    async fn execute(&self, ctx: &RunContext, _cancel: &CancellationToken) -> Result<()> {
        let report = self.scanner.scan(&ctx.image, self.threshold).await?;
        if report.is_clean() {
            return Ok(());
        }
        Err(PipelineError::ScanFailure {
            count: report.findings.len(),
            threshold: self.threshold.to_string(),
            summary: report.summary(SCAN_SUMMARY_LIMIT),
        })
    }
}

// ---------------------------------------------------------------------------
// push
// ---------------------------------------------------------------------------

pub struct PushStage {
    registry: Arc<dyn Registry>,
    credentials: Arc<dyn CredentialProvider>,
}

#[async_trait]
impl StageAction for PushStage {
    async fn execute(&self, ctx: &RunContext, _cancel: &CancellationToken) -> Result<()> {
        let lease = CredentialLease::acquire(self.credentials.clone(), REGISTRY_SCOPE).await?;
        self.registry.push(&ctx.image, lease.credentials()).await?;
        info!(image = %ctx.image, "image pushed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// deploy
// ---------------------------------------------------------------------------

pub struct DeployStage {
    mutator: StateMutator,
    credentials: Arc<dyn CredentialProvider>,
    config_path: String,
}

#[async_trait]
impl StageAction for DeployStage {
    async fn execute(&self, ctx: &RunContext, _cancel: &CancellationToken) -> Result<()> {
        let lease = CredentialLease::acquire(self.credentials.clone(), CONFIG_STORE_SCOPE).await?;
        let result = self
            .mutator
            .apply_image_tag(&self.config_path, &ctx.tag, Some(lease.credentials()))
            .await?;
        info!(
            path = %result.path,
            revision = %result.revision,
            changed = result.changed,
            "deployment config updated"
        );
        Ok(())
    }
}

//! Contracts for the external tools a pipeline drives.
//!
//! Each trait is the narrow slice of a collaborator that the pipeline
//! consumes:
//! - `SourceControl`: which revision is being built
//! - `BuildTool`: compile and test the working tree
//! - `AnalysisService`: submit static analysis and read its quality gate
//! - `ImageBuilder` / `Scanner` / `Registry`: container image lifecycle
//! - `ConfigStore`: the declarative-config repository a CD reconciler watches
//! - `RunNotifier`: post-run success/failure hooks
//!
//! Process- and HTTP-backed implementations live in `lading-adapters`;
//! in-memory fakes live in [`crate::fakes`].

use std::path::PathBuf;

use async_trait::async_trait;

use crate::credentials::Credentials;
use crate::domain::{
    ConfigDocument, ImageRef, PipelineRun, QualityVerdict, Revision, ScanReport, Severity,
    StoreRevision,
};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Source control
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Resolve the revision of the snapshot being built.
    async fn resolve_revision(&self) -> Result<Revision>;
}

// ---------------------------------------------------------------------------
// Build and test
// ---------------------------------------------------------------------------

/// What a successful build/test invocation left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Test report written by the test runner, if configured.
    pub test_report: Option<PathBuf>,
}

#[async_trait]
pub trait BuildTool: Send + Sync {
    /// Build and test the working tree.
    ///
    /// Fails with `BuildFailure` or `TestFailure`.
    async fn build_and_test(&self) -> Result<BuildReport>;
}

// ---------------------------------------------------------------------------
// Static analysis
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Submit an analysis and return the id to poll.
    async fn submit_analysis(&self, project_key: &str, version: &str) -> Result<String>;

    /// Current verdict for a submitted analysis. `Pending` until decided.
    async fn get_verdict(&self, check_id: &str) -> Result<QualityVerdict>;
}

// ---------------------------------------------------------------------------
// Container image lifecycle
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Build the image and return the reference it was tagged with.
    async fn build_image(&self, image: &ImageRef) -> Result<ImageRef>;
}

#[async_trait]
pub trait Scanner: Send + Sync {
    /// Scan an image, reporting findings at or above `threshold`.
    async fn scan(&self, image: &ImageRef, threshold: Severity) -> Result<ScanReport>;
}

#[async_trait]
pub trait Registry: Send + Sync {
    /// Push an image. Fails with `PushFailure`.
    async fn push(&self, image: &ImageRef, credentials: &Credentials) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Declarative-config store
// ---------------------------------------------------------------------------

/// Version-controlled store reconciled onto the running system.
///
/// Guarantees:
/// - `read_config` records the store revision the content was read at.
/// - Both calls accept the same credentials; private stores need them to read.
/// - `commit` writes only if the store is still at `base`; otherwise it fails
///   with `Conflict` and leaves the store untouched.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn read_config(
        &self,
        path: &str,
        credentials: Option<&Credentials>,
    ) -> Result<ConfigDocument>;

    async fn commit(
        &self,
        path: &str,
        base: &StoreRevision,
        content: &str,
        message: &str,
        credentials: Option<&Credentials>,
    ) -> Result<StoreRevision>;
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Post-run hooks. Exactly one is called per run; errors are logged only.
#[async_trait]
pub trait RunNotifier: Send + Sync {
    async fn on_success(&self, run: &PipelineRun) -> Result<()>;

    async fn on_failure(&self, run: &PipelineRun) -> Result<()>;
}

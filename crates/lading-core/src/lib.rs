//! Lading Core - domain model for the pipeline orchestration engine
//!
//! Provides:
//! - Revisions, artifact tags and the immutable per-run context
//! - Stage results and completed pipeline runs
//! - Collaborator contracts (source control, build, analysis, image, registry,
//!   config store, notifications) and scoped credentials
//! - In-memory fakes for every collaborator
//! - Tracing setup and lifecycle log emitters

pub mod collaborators;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod fakes;
pub mod obs;
pub mod telemetry;

pub use collaborators::{
    AnalysisService, BuildReport, BuildTool, ConfigStore, ImageBuilder, Registry, RunNotifier,
    Scanner, SourceControl,
};
pub use credentials::{CredentialLease, CredentialProvider, Credentials};
pub use domain::{
    content_digest, ArtifactTag, CommitResult, ConfigDocument, Finding, ImageRef, PipelineRun,
    QualityVerdict, Revision, RunContext, RunOutcome, RunRecorder, RunState, ScanReport,
    Severity, StageResult, StageStatus, StoreRevision, TagComposer, VerdictStatus,
};
pub use error::{PipelineError, Result};
pub use telemetry::init_tracing;

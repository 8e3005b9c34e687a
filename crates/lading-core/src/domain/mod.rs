//! Domain model for pipeline runs.

pub mod config_doc;
pub mod revision;
pub mod run;
pub mod scan;
pub mod tag;
pub mod verdict;

pub use config_doc::{content_digest, CommitResult, ConfigDocument, StoreRevision};
pub use revision::{ArtifactTag, ImageRef, Revision, SHORT_REVISION_LEN};
pub use run::{
    PipelineRun, RunContext, RunOutcome, RunRecorder, RunState, StageResult, StageStatus,
};
pub use scan::{Finding, ScanReport, Severity};
pub use tag::TagComposer;
pub use verdict::{QualityVerdict, VerdictStatus};

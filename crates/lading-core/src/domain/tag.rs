//! Deterministic artifact tagging.

use super::revision::{ArtifactTag, Revision};
use crate::error::{PipelineError, Result};

/// Derives the artifact tag shared by image build, scan, push and deploy.
pub struct TagComposer;

impl TagComposer {
    /// Compose `{version}-{first 7 chars of revision}`.
    ///
    /// Fails with `InvalidRevision` when `revision` is shorter than 7
    /// characters or not hex, and `InvalidVersion` when `version` is empty.
    pub fn compose(version: &str, revision: &str) -> Result<ArtifactTag> {
        let version = version.trim();
        if version.is_empty() {
            return Err(PipelineError::InvalidVersion(
                "version must not be empty".to_string(),
            ));
        }
        if version.chars().any(|c| c.is_whitespace() || c == ':' || c == '/') {
            return Err(PipelineError::InvalidVersion(format!(
                "'{version}' cannot be used in an image tag"
            )));
        }
        let revision = Revision::parse(revision)?;
        Ok(ArtifactTag::from_composed(format!(
            "{}-{}",
            version,
            revision.short()
        )))
    }
}

//! Source revisions and the artifact identifiers derived from them.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Length of the conventional short revision form.
pub const SHORT_REVISION_LEN: usize = 7;

/// Immutable identifier of the source snapshot being built.
///
/// The inner string is private so a `Revision` always holds at least
/// [`SHORT_REVISION_LEN`] hex characters, in the case they were given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision(String);

impl Revision {
    /// Validate and wrap a full revision hash (surrounding whitespace is trimmed).
    pub fn parse(full: &str) -> Result<Self> {
        let full = full.trim();
        if full.len() < SHORT_REVISION_LEN {
            return Err(PipelineError::InvalidRevision(format!(
                "'{full}' is shorter than {SHORT_REVISION_LEN} characters"
            )));
        }
        if !full.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PipelineError::InvalidRevision(format!(
                "'{full}' is not a hex string"
            )));
        }
        Ok(Revision(full.to_string()))
    }

    /// Full hash.
    pub fn full(&self) -> &str {
        &self.0
    }

    /// Short form (first 7 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..SHORT_REVISION_LEN]
    }
}

impl TryFrom<String> for Revision {
    type Error = PipelineError;

    fn try_from(s: String) -> Result<Self> {
        Revision::parse(&s)
    }
}

impl From<Revision> for String {
    fn from(r: Revision) -> Self {
        r.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Artifact identifier `{version}-{shortRevision}`.
///
/// Only [`crate::TagComposer`] constructs tags from scratch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactTag(String);

impl ArtifactTag {
    pub(crate) fn from_composed(tag: String) -> Self {
        ArtifactTag(tag)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Container image reference `{repository}:{tag}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub repository: String,
    pub tag: ArtifactTag,
}

impl ImageRef {
    pub fn new(repository: impl Into<String>, tag: ArtifactTag) -> Self {
        Self {
            repository: repository.into(),
            tag,
        }
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_short_form() {
        let rev = Revision::parse("a1b2c3d4e5f6").unwrap();
        assert_eq!(rev.full(), "a1b2c3d4e5f6");
        assert_eq!(rev.short(), "a1b2c3d");
    }

    #[test]
    fn test_revision_trims_and_keeps_case() {
        let rev = Revision::parse("  A1B2C3D4\n").unwrap();
        assert_eq!(rev.full(), "A1B2C3D4");
        assert_eq!(rev.short(), "A1B2C3D");
    }

    #[test]
    fn test_revision_rejects_short_input() {
        let err = Revision::parse("abc").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRevision(_)));
    }

    #[test]
    fn test_revision_rejects_non_hex() {
        let err = Revision::parse("main-branch").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRevision(_)));
    }

    #[test]
    fn test_revision_serde_validates() {
        let ok: Revision = serde_json::from_str("\"a1b2c3d4\"").unwrap();
        assert_eq!(ok.short(), "a1b2c3d");
        assert!(serde_json::from_str::<Revision>("\"zz\"").is_err());
    }

    #[test]
    fn test_image_ref_display() {
        let image = ImageRef::new(
            "registry.local/shop/web",
            ArtifactTag::from_composed("2.3.1-a1b2c3d".to_string()),
        );
        assert_eq!(image.to_string(), "registry.local/shop/web:2.3.1-a1b2c3d");
    }
}

//! GitOps hand-off: update the deployed image tag in the config store.

use std::sync::Arc;

use lading_core::{
    content_digest, ArtifactTag, CommitResult, ConfigStore, Credentials, PipelineError, Result,
};
use tracing::info;

use crate::yaml::{read_scalar, set_scalar};

/// Default dotted key path of the image tag in a values document.
pub const DEFAULT_TAG_FIELD: &str = "image.tag";

/// Applies a single image-tag change to the config store.
///
/// One read, one edit, at most one commit. A store that moved past the read
/// base surfaces as `Conflict`; there is no retry and nothing to roll back,
/// since the previously committed config stays in place.
pub struct StateMutator {
    store: Arc<dyn ConfigStore>,
    field_path: String,
}

impl StateMutator {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self::with_field(store, DEFAULT_TAG_FIELD)
    }

    pub fn with_field(store: Arc<dyn ConfigStore>, field_path: impl Into<String>) -> Self {
        Self {
            store,
            field_path: field_path.into(),
        }
    }

    /// Commit message used for a tag update.
    pub fn commit_message(config_path: &str, tag: &ArtifactTag) -> String {
        format!("deploy: set image tag to {tag} in {config_path}")
    }

    pub async fn apply_image_tag(
        &self,
        config_path: &str,
        tag: &ArtifactTag,
        credentials: Option<&Credentials>,
    ) -> Result<CommitResult> {
        let doc = self.store.read_config(config_path, credentials).await?;
        let edit = set_scalar(&doc.content, &self.field_path, tag.as_str())?;

        let previous_digest = content_digest(&doc.content);
        let message = Self::commit_message(config_path, tag);

        if edit.content == doc.content {
            info!(path = %config_path, tag = %tag, "image tag already current, nothing to commit");
            return Ok(CommitResult {
                path: config_path.to_string(),
                revision: doc.base,
                message,
                changed: false,
                new_digest: previous_digest.clone(),
                previous_digest,
            });
        }

        match read_scalar(&edit.content, &self.field_path)? {
            Some(ref value) if value == tag.as_str() => {}
            other => {
                return Err(PipelineError::ConfigField(format!(
                    "'{}' reads back as {:?} after edit, expected '{}'",
                    self.field_path, other, tag
                )))
            }
        }

        let revision = self
            .store
            .commit(config_path, &doc.base, &edit.content, &message, credentials)
            .await?;

        info!(
            path = %config_path,
            previous = %edit.previous,
            tag = %tag,
            revision = %revision,
            "image tag committed"
        );

        Ok(CommitResult {
            path: config_path.to_string(),
            revision,
            message,
            changed: true,
            previous_digest,
            new_digest: content_digest(&edit.content),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lading_core::fakes::MemoryConfigStore;
    use lading_core::TagComposer;

    const PATH: &str = "apps/web/values.yaml";
    const VALUES: &str = "replicaCount: 2\nimage:\n  repository: registry.local/web\n  tag: 2.3.0-0f0f0f0\n";

    fn tag() -> ArtifactTag {
        TagComposer::compose("2.3.1", "a1b2c3d4e5f6").unwrap()
    }

    #[tokio::test]
    async fn test_applies_tag_and_commits_once() {
        let store = Arc::new(MemoryConfigStore::with_file(PATH, VALUES));
        let mutator = StateMutator::new(store.clone());

        let result = mutator.apply_image_tag(PATH, &tag(), None).await.unwrap();

        assert!(result.changed);
        assert_eq!(result.revision, store.head());
        assert_eq!(
            store.content(PATH).unwrap(),
            VALUES.replace("2.3.0-0f0f0f0", "2.3.1-a1b2c3d")
        );
        assert_eq!(
            store.messages(),
            vec!["deploy: set image tag to 2.3.1-a1b2c3d in apps/web/values.yaml".to_string()]
        );
        assert_ne!(result.previous_digest, result.new_digest);
    }

    #[tokio::test]
    async fn test_unchanged_tag_commits_nothing() {
        let current = VALUES.replace("2.3.0-0f0f0f0", "2.3.1-a1b2c3d");
        let store = Arc::new(MemoryConfigStore::with_file(PATH, &current));
        let mutator = StateMutator::new(store.clone());

        let result = mutator.apply_image_tag(PATH, &tag(), None).await.unwrap();

        assert!(!result.changed);
        assert_eq!(result.previous_digest, result.new_digest);
        assert!(store.messages().is_empty());
    }

    #[tokio::test]
    async fn test_advanced_remote_is_a_conflict_and_store_is_unchanged() {
        let concurrent = VALUES.replace("replicaCount: 2", "replicaCount: 5");
        let store = Arc::new(MemoryConfigStore::with_file(PATH, VALUES));
        store.advance_after_next_read(PATH, &concurrent);
        let mutator = StateMutator::new(store.clone());

        let err = mutator.apply_image_tag(PATH, &tag(), None).await.unwrap_err();

        match err {
            PipelineError::Conflict { path, expected, actual } => {
                assert_eq!(path, PATH);
                assert_eq!(expected, "rev-0");
                assert_eq!(actual, "rev-1");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        // Only the concurrent writer's change is in the store.
        assert_eq!(store.content(PATH).unwrap(), concurrent);
        assert_eq!(store.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_field_fails_without_commit() {
        let store = Arc::new(MemoryConfigStore::with_file(PATH, VALUES));
        let mutator = StateMutator::with_field(store.clone(), "deployment.image.tag");

        let err = mutator.apply_image_tag(PATH, &tag(), None).await.unwrap_err();

        assert!(matches!(err, PipelineError::ConfigField(_)));
        assert_eq!(store.content(PATH).unwrap(), VALUES);
        assert!(store.messages().is_empty());
    }

    #[tokio::test]
    async fn test_private_store_reads_and_commits_with_credentials() {
        let store = Arc::new(MemoryConfigStore::with_file(PATH, VALUES).requiring_credentials("ci-bot"));
        let mutator = StateMutator::new(store.clone());
        let creds = Credentials::new("ci-bot", "deploy-token");

        let result = mutator
            .apply_image_tag(PATH, &tag(), Some(&creds))
            .await
            .unwrap();

        assert!(result.changed);
        assert_eq!(store.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_private_store_without_credentials_fails_at_read() {
        let store = Arc::new(MemoryConfigStore::with_file(PATH, VALUES).requiring_credentials("ci-bot"));
        let mutator = StateMutator::new(store.clone());

        let err = mutator.apply_image_tag(PATH, &tag(), None).await.unwrap_err();

        assert!(err.to_string().contains("authentication required"));
        assert!(store.messages().is_empty());
    }
}

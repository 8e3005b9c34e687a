//! Credentials from the process environment.

use std::collections::HashMap;

use async_trait::async_trait;
use lading_core::{CredentialProvider, Credentials, PipelineError, Result};

#[derive(Debug, Clone)]
struct EnvScope {
    username: String,
    secret_var: String,
}

/// Maps each scope to a username and the environment variable holding its
/// secret. The variable is read on every acquisition, never cached.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialProvider {
    scopes: HashMap<String, EnvScope>,
}

impl EnvCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(
        mut self,
        scope: impl Into<String>,
        username: impl Into<String>,
        secret_var: impl Into<String>,
    ) -> Self {
        self.scopes.insert(
            scope.into(),
            EnvScope {
                username: username.into(),
                secret_var: secret_var.into(),
            },
        );
        self
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn fetch(&self, scope: &str) -> Result<Credentials> {
        let entry = self
            .scopes
            .get(scope)
            .ok_or_else(|| PipelineError::Credentials(format!("no credentials configured for {scope}")))?;
        let secret = std::env::var(&entry.secret_var).map_err(|_| {
            PipelineError::Credentials(format!("{} is not set (scope {scope})", entry.secret_var))
        })?;
        Ok(Credentials::new(entry.username.clone(), secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_secret_from_env() {
        std::env::set_var("LADING_TEST_REGISTRY_PASSWORD", "s3cret");
        let provider = EnvCredentialProvider::new().with_scope(
            "registry",
            "ci-bot",
            "LADING_TEST_REGISTRY_PASSWORD",
        );

        let creds = provider.fetch("registry").await.unwrap();

        assert_eq!(creds.username, "ci-bot");
        assert_eq!(creds.secret(), "s3cret");
    }

    #[tokio::test]
    async fn test_unset_variable() {
        let provider = EnvCredentialProvider::new().with_scope(
            "config-store",
            "ci-bot",
            "LADING_TEST_UNSET_TOKEN",
        );

        let err = provider.fetch("config-store").await.unwrap_err();

        assert!(matches!(err, PipelineError::Credentials(_)));
        assert!(err.to_string().contains("LADING_TEST_UNSET_TOKEN"));
    }

    #[tokio::test]
    async fn test_unknown_scope() {
        let err = EnvCredentialProvider::new().fetch("registry").await.unwrap_err();
        assert!(err.to_string().contains("no credentials configured for registry"));
    }
}

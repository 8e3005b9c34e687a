//! Scoped credential acquisition.
//!
//! Credentials are never ambient: a stage acquires a [`CredentialLease`] for
//! the one collaborator call that needs it, and the lease hands the secret
//! back to its provider when it drops, whatever the call's outcome.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;

/// A username/secret pair for one collaborator.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    secret: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Source of credentials, keyed by scope (e.g. `"registry"`, `"config-store"`).
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Fetch credentials for `scope`.
    async fn fetch(&self, scope: &str) -> Result<Credentials>;

    /// Called once when the lease for `scope` is dropped.
    fn release(&self, _scope: &str) {}
}

/// Credentials held for the lifetime of one collaborator call.
pub struct CredentialLease {
    scope: String,
    credentials: Credentials,
    provider: Arc<dyn CredentialProvider>,
}

impl CredentialLease {
    /// Acquire credentials for `scope` from `provider`.
    pub async fn acquire(provider: Arc<dyn CredentialProvider>, scope: &str) -> Result<Self> {
        let credentials = provider.fetch(scope).await?;
        debug!(scope = %scope, "credentials acquired");
        Ok(Self {
            scope: scope.to_string(),
            credentials,
            provider,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl Drop for CredentialLease {
    fn drop(&mut self) {
        self.provider.release(&self.scope);
        debug!(scope = %self.scope, "credentials released");
    }
}

//! Git integration: the revision being built.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lading_core::{PipelineError, Result, Revision, SourceControl};

use crate::process::{CommandOutput, Invocation};

/// Run `git <args>` in `dir`; a non-zero exit is a `Collaborator` error.
pub(crate) async fn git(dir: &Path, args: &[&str]) -> Result<CommandOutput> {
    Invocation::new("git")
        .args(args.iter().copied())
        .current_dir(dir)
        .checked(PipelineError::Collaborator)
        .await
}

/// Resolves the revision from `HEAD` of a local working tree.
#[derive(Debug, Clone)]
pub struct GitSourceControl {
    repo_dir: PathBuf,
}

impl GitSourceControl {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }
}

#[async_trait]
impl SourceControl for GitSourceControl {
    async fn resolve_revision(&self) -> Result<Revision> {
        let out = git(&self.repo_dir, &["rev-parse", "HEAD"]).await?;
        Revision::parse(out.stdout.trim())
    }
}

//! Git-backed declarative-config store.
//!
//! The store works entirely on object plumbing: reads come from the fetched
//! remote-tracking ref, and commits are built with a private index on top of
//! the base revision, then pushed without force. The working tree and the
//! local branches of the clone are never touched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use lading_core::{ConfigDocument, ConfigStore, Credentials, PipelineError, Result, StoreRevision};
use tracing::{debug, info};

use crate::process::{CommandOutput, Invocation};

const DEFAULT_FILE_MODE: &str = "100644";

#[derive(Debug, Clone)]
pub struct GitConfigStore {
    program: String,
    repo_dir: PathBuf,
    remote: String,
    branch: String,
    author_name: String,
    author_email: String,
    timeout: Option<Duration>,
}

impl GitConfigStore {
    /// `repo_dir` is any git repository with `remote` configured.
    pub fn new(repo_dir: impl Into<PathBuf>, remote: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            program: "git".to_string(),
            repo_dir: repo_dir.into(),
            remote: remote.into(),
            branch: branch.into(),
            author_name: "lading".to_string(),
            author_email: "lading@localhost".to_string(),
            timeout: Some(Duration::from_secs(120)),
        }
    }

    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    /// Git executable to run, `git` on `PATH` by default.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn tracking_ref(&self) -> String {
        format!("refs/remotes/{}/{}", self.remote, self.branch)
    }

    /// A git invocation in the repository. With credentials, an inline
    /// helper hands them to git from the environment so they never appear
    /// on a command line.
    fn git(&self, credentials: Option<&Credentials>) -> Invocation {
        let mut inv = Invocation::new(self.program.as_str())
            .current_dir(&self.repo_dir)
            .timeout(self.timeout)
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(creds) = credentials {
            inv = inv
                .args(["-c", "credential.helper="])
                .arg("-c")
                .arg(
                    "credential.helper=!f() { echo \"username=${LADING_GIT_USERNAME}\"; \
                     echo \"password=${LADING_GIT_PASSWORD}\"; }; f",
                )
                .env("LADING_GIT_USERNAME", &creds.username)
                .env("LADING_GIT_PASSWORD", creds.secret());
        }
        inv
    }

    async fn run(&self, inv: Invocation) -> Result<CommandOutput> {
        inv.checked(PipelineError::Collaborator).await
    }

    /// Fetch the branch and return the remote head.
    async fn fetch(&self, credentials: Option<&Credentials>) -> Result<StoreRevision> {
        let refspec = format!("+refs/heads/{}:{}", self.branch, self.tracking_ref());
        self.run(
            self.git(credentials)
                .args(["fetch", "--quiet", self.remote.as_str(), refspec.as_str()]),
        )
        .await?;
        let out = self
            .run(self.git(None).args(["rev-parse", self.tracking_ref().as_str()]))
            .await?;
        Ok(StoreRevision(out.stdout.trim().to_string()))
    }

    async fn git_dir(&self) -> Result<PathBuf> {
        let out = self
            .run(self.git(None).args(["rev-parse", "--git-dir"]))
            .await?;
        let dir = PathBuf::from(out.stdout.trim());
        Ok(if dir.is_absolute() {
            dir
        } else {
            self.repo_dir.join(dir)
        })
    }

    /// Build a commit on `base` that replaces `path` with `content`.
    async fn write_commit(
        &self,
        base: &StoreRevision,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<String> {
        let listing = self
            .run(self.git(None).args(["ls-tree", base.0.as_str(), "--", path]))
            .await?;
        let mode = listing
            .stdout
            .split_whitespace()
            .next()
            .unwrap_or(DEFAULT_FILE_MODE)
            .to_string();

        let blob = self
            .run(self.git(None).args(["hash-object", "-w", "--stdin"]).stdin(content))
            .await?
            .stdout
            .trim()
            .to_string();

        let index = self
            .git_dir()
            .await?
            .join(format!("lading-index-{}", std::process::id()));
        let tree = self.write_tree(&index, base, &mode, &blob, path).await;
        let _ = tokio::fs::remove_file(&index).await;
        let tree = tree?;

        let commit = self
            .run(
                self.git(None)
                    .args(["commit-tree", tree.as_str(), "-p", base.0.as_str(), "-m", message])
                    .env("GIT_AUTHOR_NAME", &self.author_name)
                    .env("GIT_AUTHOR_EMAIL", &self.author_email)
                    .env("GIT_COMMITTER_NAME", &self.author_name)
                    .env("GIT_COMMITTER_EMAIL", &self.author_email),
            )
            .await?;
        Ok(commit.stdout.trim().to_string())
    }

    async fn write_tree(
        &self,
        index: &Path,
        base: &StoreRevision,
        mode: &str,
        blob: &str,
        path: &str,
    ) -> Result<String> {
        let index = index.to_string_lossy().to_string();
        let with_index = |inv: Invocation| inv.env("GIT_INDEX_FILE", index.clone());

        self.run(with_index(self.git(None).args(["read-tree", base.0.as_str()])))
            .await?;
        let cacheinfo = format!("{mode},{blob},{path}");
        self.run(with_index(
            self.git(None)
                .args(["update-index", "--add", "--cacheinfo", cacheinfo.as_str()]),
        ))
        .await?;
        let out = self
            .run(with_index(self.git(None).arg("write-tree")))
            .await?;
        Ok(out.stdout.trim().to_string())
    }
}

#[async_trait]
impl ConfigStore for GitConfigStore {
    async fn read_config(
        &self,
        path: &str,
        credentials: Option<&Credentials>,
    ) -> Result<ConfigDocument> {
        let base = self.fetch(credentials).await?;
        let spec = format!("{}:{}", base.0, path);
        let out = self.git(None).args(["show", spec.as_str()]).output().await?;
        if !out.success() {
            return Err(PipelineError::ConfigField(format!(
                "{path} not found on {}/{} at {}",
                self.remote,
                self.branch,
                base
            )));
        }
        debug!(path = %path, base = %base, "config read");
        Ok(ConfigDocument {
            path: path.to_string(),
            content: out.stdout,
            base,
        })
    }

    async fn commit(
        &self,
        path: &str,
        base: &StoreRevision,
        content: &str,
        message: &str,
        credentials: Option<&Credentials>,
    ) -> Result<StoreRevision> {
        let conflict = |actual: &StoreRevision| PipelineError::Conflict {
            path: path.to_string(),
            expected: base.to_string(),
            actual: actual.to_string(),
        };

        let head = self.fetch(credentials).await?;
        if &head != base {
            return Err(conflict(&head));
        }

        let commit = self.write_commit(base, path, content, message).await?;
        let target = format!("{commit}:refs/heads/{}", self.branch);
        let pushed = self
            .git(credentials)
            .args(["push", "--quiet", self.remote.as_str(), target.as_str()])
            .output()
            .await?;

        if !pushed.success() {
            // Someone landed first between our fetch and push.
            let head = self.fetch(credentials).await?;
            if &head != base {
                return Err(conflict(&head));
            }
            return Err(PipelineError::Collaborator(format!(
                "push to {}/{} failed: {}",
                self.remote,
                self.branch,
                pushed.tail(5)
            )));
        }

        info!(path = %path, base = %base, commit = %commit, "config committed");
        Ok(StoreRevision(commit))
    }
}

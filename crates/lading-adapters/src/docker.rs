//! Container image build and registry push through the docker CLI.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use lading_core::{Credentials, ImageBuilder, ImageRef, PipelineError, Registry, Result};
use tracing::{info, warn};

use crate::process::Invocation;

/// `docker build -f <dockerfile> -t <image> <context>`.
#[derive(Debug, Clone)]
pub struct DockerImageBuilder {
    program: String,
    context: PathBuf,
    dockerfile: PathBuf,
    timeout: Option<Duration>,
}

impl DockerImageBuilder {
    pub fn new(context: impl Into<PathBuf>) -> Self {
        let context = context.into();
        Self {
            program: "docker".to_string(),
            dockerfile: context.join("Dockerfile"),
            context,
            timeout: None,
        }
    }

    /// Use a docker-compatible CLI (e.g. `podman`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_dockerfile(mut self, dockerfile: impl Into<PathBuf>) -> Self {
        self.dockerfile = dockerfile.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl ImageBuilder for DockerImageBuilder {
    async fn build_image(&self, image: &ImageRef) -> Result<ImageRef> {
        let out = Invocation::new(&self.program)
            .arg("build")
            .arg("-f")
            .arg(self.dockerfile.to_string_lossy())
            .arg("-t")
            .arg(image.to_string())
            .arg(self.context.to_string_lossy())
            .timeout(self.timeout)
            .checked(PipelineError::BuildFailure)
            .await?;
        info!(image = %image, duration_ms = out.duration_ms, "image built");
        Ok(image.clone())
    }
}

/// Pushes with a short-lived `docker login` session.
///
/// The password goes over stdin only. `docker logout` runs after every
/// successful login, whatever the push outcome.
#[derive(Debug, Clone)]
pub struct DockerRegistry {
    program: String,
    host: String,
    timeout: Option<Duration>,
}

impl DockerRegistry {
    /// `host` is the registry to log in to, e.g. `registry.local:5000`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            program: "docker".to_string(),
            host: host.into(),
            timeout: None,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn logout(&self) {
        let logout = Invocation::new(&self.program)
            .arg("logout")
            .arg(&self.host)
            .timeout(self.timeout)
            .checked(PipelineError::Collaborator)
            .await;
        if let Err(e) = logout {
            warn!(host = %self.host, error = %e, "registry logout failed");
        }
    }
}

#[async_trait]
impl Registry for DockerRegistry {
    async fn push(&self, image: &ImageRef, credentials: &Credentials) -> Result<()> {
        Invocation::new(&self.program)
            .arg("login")
            .arg(&self.host)
            .arg("--username")
            .arg(&credentials.username)
            .arg("--password-stdin")
            .stdin(credentials.secret())
            .timeout(self.timeout)
            .checked(|reason| PipelineError::PushFailure(format!("login: {reason}")))
            .await?;

        let pushed = Invocation::new(&self.program)
            .arg("push")
            .arg(image.to_string())
            .timeout(self.timeout)
            .checked(PipelineError::PushFailure)
            .await;

        self.logout().await;

        let out = pushed?;
        info!(image = %image, duration_ms = out.duration_ms, "image pushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lading_core::TagComposer;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// A docker stand-in that logs its argv and stdin, failing on `fail_on`.
    fn fake_docker(dir: &Path, fail_on: &str) -> String {
        let script = dir.join("docker");
        let log = dir.join("calls.log");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\n\
                 echo \"$@\" >> {log}\n\
                 if [ \"$1\" = login ]; then read pw; echo \"stdin:$pw\" >> {log}; fi\n\
                 if [ \"$1\" = \"{fail_on}\" ]; then echo \"$1 refused\" >&2; exit 1; fi\n",
                log = log.display(),
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.to_string_lossy().to_string()
    }

    fn calls(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn image() -> ImageRef {
        ImageRef::new(
            "registry.local/web",
            TagComposer::compose("2.3.1", "a1b2c3d4e5f6").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_build_passes_tag_and_context() {
        let dir = tempfile::tempdir().unwrap();
        let docker = fake_docker(dir.path(), "none");
        let builder = DockerImageBuilder::new("/src/web").with_program(docker);

        let built = builder.build_image(&image()).await.unwrap();

        assert_eq!(built, image());
        assert_eq!(
            calls(dir.path()),
            vec!["build -f /src/web/Dockerfile -t registry.local/web:2.3.1-a1b2c3d /src/web"]
        );
    }

    #[tokio::test]
    async fn test_push_logs_in_over_stdin_and_out() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DockerRegistry::new("registry.local").with_program(fake_docker(dir.path(), "none"));

        registry
            .push(&image(), &Credentials::new("ci-bot", "s3cret"))
            .await
            .unwrap();

        let calls = calls(dir.path());
        assert_eq!(
            calls,
            vec![
                "login registry.local --username ci-bot --password-stdin",
                "stdin:s3cret",
                "push registry.local/web:2.3.1-a1b2c3d",
                "logout registry.local",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_push_still_logs_out() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DockerRegistry::new("registry.local").with_program(fake_docker(dir.path(), "push"));

        let err = registry
            .push(&image(), &Credentials::new("ci-bot", "s3cret"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::PushFailure(_)));
        assert!(err.to_string().contains("push refused"));
        assert_eq!(calls(dir.path()).last().unwrap(), "logout registry.local");
    }

    #[tokio::test]
    async fn test_failed_login_never_pushes() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DockerRegistry::new("registry.local").with_program(fake_docker(dir.path(), "login"));

        let err = registry
            .push(&image(), &Credentials::new("ci-bot", "wrong"))
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("push failed: login:"));
        assert!(!calls(dir.path()).iter().any(|c| c.starts_with("push")));
        assert!(!calls(dir.path()).iter().any(|c| c.starts_with("logout")));
    }
}

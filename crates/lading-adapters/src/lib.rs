//! Lading Adapters - collaborators backed by real tools
//!
//! Process-driven: `git`, the configured build/test commands, the Sonar
//! scanner, `docker`, `trivy`. HTTP-driven: the Sonar web API and webhooks.
//! Every adapter implements a `lading_core` collaborator trait and reports
//! failures as `PipelineError`.

pub mod build;
pub mod config_store;
pub mod credentials;
pub mod docker;
pub mod git;
pub mod notify;
pub mod process;
pub mod sonar;
pub mod trivy;

pub use build::CommandBuildTool;
pub use config_store::GitConfigStore;
pub use credentials::EnvCredentialProvider;
pub use docker::{DockerImageBuilder, DockerRegistry};
pub use git::GitSourceControl;
pub use notify::{LogNotifier, WebhookNotifier};
pub use process::{CommandOutput, Invocation};
pub use sonar::SonarAnalysisService;
pub use trivy::TrivyScanner;

//! `lading.toml` loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use lading_core::{PipelineError, Severity};
use lading_pipeline::{GateSettings, PipelineSettings, DEFAULT_TAG_FIELD};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "lading.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LadingConfig {
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub gate: GateSection,
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub registry: RegistrySection,
    pub deploy: DeploySection,
    #[serde(default)]
    pub notify: NotifySection,

    /// Directory relative paths resolve against; set by [`LadingConfig::load`].
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PipelineSection {
    pub version: Option<String>,
    pub project_key: String,
    pub image_repository: String,
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct BuildSection {
    pub command: Vec<String>,
    pub test_command: Vec<String>,
    pub timeout_secs: u64,
    pub test_report: Option<PathBuf>,
    pub dockerfile: PathBuf,
    pub image_context: PathBuf,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            command: vec!["cargo".to_string(), "build".to_string(), "--release".to_string()],
            test_command: vec!["cargo".to_string(), "test".to_string()],
            timeout_secs: 1800,
            test_report: None,
            dockerfile: PathBuf::from("Dockerfile"),
            image_context: default_workdir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct GateSection {
    pub host_url: String,
    pub token_env: String,
    pub scanner: Vec<String>,
    pub report_task: PathBuf,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for GateSection {
    fn default() -> Self {
        let gate = GateSettings::default();
        Self {
            host_url: "http://localhost:9000".to_string(),
            token_env: "SONAR_TOKEN".to_string(),
            scanner: vec!["sonar-scanner".to_string()],
            report_task: PathBuf::from(lading_adapters::sonar::DEFAULT_REPORT_TASK),
            timeout_secs: gate.timeout.as_secs(),
            poll_interval_secs: gate.poll_interval.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ScanSection {
    pub severity_threshold: String,
    pub program: String,
    pub timeout_secs: u64,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            severity_threshold: "CRITICAL".to_string(),
            program: "trivy".to_string(),
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RegistrySection {
    pub program: String,
    /// Registry to log in to; defaults to the host part of the image repository.
    pub host: Option<String>,
    pub username: String,
    pub password_env: String,
    pub timeout_secs: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            host: None,
            username: "lading".to_string(),
            password_env: "REGISTRY_PASSWORD".to_string(),
            timeout_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DeploySection {
    pub repo_dir: PathBuf,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub config_path: String,
    #[serde(default = "default_field")]
    pub field: String,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
    #[serde(default = "default_author_name")]
    pub username: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NotifySection {
    pub webhook_url: Option<String>,
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".")
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_field() -> String {
    DEFAULT_TAG_FIELD.to_string()
}

fn default_author_name() -> String {
    "lading".to_string()
}

fn default_author_email() -> String {
    "lading@localhost".to_string()
}

fn default_token_env() -> String {
    "DEPLOY_TOKEN".to_string()
}

const DOCKER_HUB: &str = "docker.io";

/// The first path segment names a registry only when it looks like a host
/// (`.` or `:` in it, or `localhost`); `myorg/app` lives on Docker Hub.
fn registry_of(repository: &str) -> &str {
    match repository.split_once('/') {
        Some((first, _)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            first
        }
        _ => DOCKER_HUB,
    }
}

impl LadingConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config = Self::parse(&raw)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(default_workdir);
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut config: LadingConfig = toml::from_str(raw)?;
        config.base_dir = default_workdir();
        Ok(config)
    }

    /// Resolve `path` against the config file's directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn workdir(&self) -> PathBuf {
        self.resolve(&self.pipeline.workdir)
    }

    /// Registry to log in to: `[registry].host`, else the registry part of
    /// the image repository, else Docker Hub.
    pub fn registry_host(&self) -> String {
        self.registry
            .host
            .clone()
            .unwrap_or_else(|| registry_of(&self.pipeline.image_repository).to_string())
    }

    /// Pipeline settings, with `version` taking precedence over the file.
    pub fn to_settings(&self, version: Option<&str>) -> lading_core::Result<PipelineSettings> {
        let version = version
            .map(str::to_string)
            .or_else(|| self.pipeline.version.clone())
            .ok_or_else(|| {
                PipelineError::InvalidVersion(
                    "no version given; set [pipeline].version or pass --version".to_string(),
                )
            })?;

        if self.build.command.is_empty() {
            return Err(PipelineError::Settings("[build].command is empty".to_string()));
        }
        if self.gate.scanner.is_empty() {
            return Err(PipelineError::Settings("[gate].scanner is empty".to_string()));
        }

        let mut settings = PipelineSettings::new(
            version,
            self.pipeline.project_key.clone(),
            self.pipeline.image_repository.clone(),
            self.deploy.config_path.clone(),
        );
        settings.gate = GateSettings {
            timeout: Duration::from_secs(self.gate.timeout_secs),
            poll_interval: Duration::from_secs(self.gate.poll_interval_secs),
        };
        settings.severity_threshold = self.scan.severity_threshold.parse::<Severity>()?;
        settings.tag_field = self.deploy.field.clone();
        settings.validate()?;
        Ok(settings)
    }
}

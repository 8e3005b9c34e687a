//! Builds concrete collaborators from configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use lading_adapters::{
    CommandBuildTool, DockerImageBuilder, DockerRegistry, EnvCredentialProvider,
    GitConfigStore, LogNotifier, SonarAnalysisService, TrivyScanner, WebhookNotifier,
};
use lading_core::RunNotifier;
use lading_pipeline::{Collaborators, CONFIG_STORE_SCOPE, REGISTRY_SCOPE};

use crate::config::LadingConfig;

pub fn collaborators(config: &LadingConfig) -> Result<Collaborators> {
    let workdir = config.workdir();

    let mut build_tool = CommandBuildTool::new(
        &workdir,
        config.build.command.clone(),
        config.build.test_command.clone(),
    )
    .with_timeout(Duration::from_secs(config.build.timeout_secs));
    if let Some(report) = &config.build.test_report {
        build_tool = build_tool.with_test_report(report);
    }

    let token = std::env::var(&config.gate.token_env).ok();
    let analysis = SonarAnalysisService::new(
        config.gate.host_url.clone(),
        token,
        config.gate.scanner.clone(),
        &workdir,
    )?
    .with_report_task(&config.gate.report_task)
    .with_scanner_timeout(Duration::from_secs(config.build.timeout_secs));

    let image_context = config.resolve(&config.build.image_context);
    let image_builder = DockerImageBuilder::new(&image_context)
        .with_program(config.registry.program.clone())
        .with_dockerfile(image_context.join(&config.build.dockerfile))
        .with_timeout(Duration::from_secs(config.build.timeout_secs));

    let scanner = TrivyScanner::new(config.scan.program.clone())
        .with_timeout(Duration::from_secs(config.scan.timeout_secs));

    let registry = DockerRegistry::new(config.registry_host())
        .with_program(config.registry.program.clone())
        .with_timeout(Duration::from_secs(config.registry.timeout_secs));

    let config_store = GitConfigStore::new(
        config.resolve(&config.deploy.repo_dir),
        config.deploy.remote.clone(),
        config.deploy.branch.clone(),
    )
    .with_author(
        config.deploy.author_name.clone(),
        config.deploy.author_email.clone(),
    );

    let credentials = EnvCredentialProvider::new()
        .with_scope(
            REGISTRY_SCOPE,
            config.registry.username.clone(),
            config.registry.password_env.clone(),
        )
        .with_scope(
            CONFIG_STORE_SCOPE,
            config.deploy.username.clone(),
            config.deploy.token_env.clone(),
        );

    Ok(Collaborators {
        build_tool: Arc::new(build_tool),
        analysis: Arc::new(analysis),
        image_builder: Arc::new(image_builder),
        scanner: Arc::new(scanner),
        registry: Arc::new(registry),
        config_store: Arc::new(config_store),
        credentials: Arc::new(credentials),
    })
}

/// Webhook when configured, log otherwise.
pub fn notifier(config: &LadingConfig) -> Result<Arc<dyn RunNotifier>> {
    let notifier: Arc<dyn RunNotifier> = match &config.notify.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
        None => Arc::new(LogNotifier),
    };
    Ok(notifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_wires() {
        let config = LadingConfig::parse(include_str!("../lading.example.toml")).unwrap();
        assert!(collaborators(&config).is_ok());
        assert!(notifier(&config).is_ok());
    }
}

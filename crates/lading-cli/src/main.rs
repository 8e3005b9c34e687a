//! Lading - build, gate, scan, publish and deploy in one fail-fast run
//!
//! ## Commands
//!
//! - `run`: execute the standard pipeline for the current revision
//! - `tag`: print the artifact tag for a version and revision
//! - `check-config`: load and validate `lading.toml`

mod config;
mod wiring;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lading_adapters::GitSourceControl;
use lading_core::{PipelineRun, SourceControl, StageStatus, TagComposer};
use lading_pipeline::{run_pipeline, standard_stages};
use tokio_util::sync::CancellationToken;
use tracing::{warn, Level};

use crate::config::{LadingConfig, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(name = "lading")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build, gate, scan, publish and deploy pipeline runner", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for the current revision
    Run {
        /// Pipeline configuration file
        #[arg(short, long, env = "LADING_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Release version (overrides [pipeline].version)
        #[arg(long, env = "LADING_VERSION")]
        version: Option<String>,

        /// Write the completed run as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Print the artifact tag for a version and revision
    Tag {
        /// Release version
        #[arg(long)]
        version: String,

        /// Revision (default: HEAD of the current directory)
        #[arg(long)]
        revision: Option<String>,
    },

    /// Load and validate the configuration
    CheckConfig {
        /// Pipeline configuration file
        #[arg(short, long, env = "LADING_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Release version (overrides [pipeline].version)
        #[arg(long, env = "LADING_VERSION")]
        version: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    lading_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            config,
            version,
            report,
        } => cmd_run(&config, version.as_deref(), report.as_deref()).await,
        Commands::Tag { version, revision } => {
            cmd_tag(&version, revision.as_deref()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::CheckConfig { config, version } => {
            cmd_check_config(&config, version.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_run(config_path: &Path, version: Option<&str>, report: Option<&Path>) -> Result<ExitCode> {
    let config = LadingConfig::load(config_path)?;
    let settings = config
        .to_settings(version)
        .context("Invalid pipeline settings")?;
    let collab = wiring::collaborators(&config)?;
    let notifier = wiring::notifier(&config)?;
    let source = GitSourceControl::new(config.workdir());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling run");
                cancel.cancel();
            }
        }
    });

    let run = run_pipeline(
        &source,
        &settings,
        |_ctx| standard_stages(&collab, &settings),
        notifier,
        &cancel,
    )
    .await
    .context("Pipeline could not start")?;

    print_summary(&run);

    if let Some(path) = report {
        let json = serde_json::to_string_pretty(&run)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run report to {}", path.display()))?;
        println!("Report: {}", path.display());
    }

    Ok(exit_code(&run))
}

async fn cmd_tag(version: &str, revision: Option<&str>) -> Result<()> {
    let revision = match revision {
        Some(r) => r.to_string(),
        None => GitSourceControl::new(".")
            .resolve_revision()
            .await
            .context("Failed to resolve HEAD")?
            .full()
            .to_string(),
    };
    let tag = TagComposer::compose(version, &revision)?;
    println!("{tag}");
    Ok(())
}

fn cmd_check_config(config_path: &Path, version: Option<&str>) -> Result<()> {
    let config = LadingConfig::load(config_path)?;
    let settings = config
        .to_settings(version)
        .context("Invalid pipeline settings")?;
    wiring::collaborators(&config)?;

    println!("✓ {} is valid", config_path.display());
    println!("  project:   {}", settings.project_key);
    println!("  version:   {}", settings.version);
    println!("  image:     {}", settings.image_repository);
    println!("  threshold: {}", settings.severity_threshold);
    println!(
        "  gate:      {}s timeout, {}s interval",
        settings.gate.timeout.as_secs(),
        settings.gate.poll_interval.as_secs()
    );
    println!("  deploy:    {} ({})", settings.config_path, settings.tag_field);
    Ok(())
}

fn exit_code(run: &PipelineRun) -> ExitCode {
    if run.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_summary(run: &PipelineRun) {
    println!();
    println!("Run ID:   {}", run.run_id());
    println!("Revision: {}", run.revision());
    println!("Tag:      {}", run.tag());
    println!(
        "Status:   {}",
        if run.is_success() { "✓ PASSED" } else { "✗ FAILED" }
    );
    println!("Duration: {}ms", run.duration_ms());
    println!();

    for stage in run.stages() {
        let mark = match stage.status {
            StageStatus::Passed => "✓",
            StageStatus::Failed => "✗",
            StageStatus::Skipped => "-",
        };
        match &stage.error {
            Some(error) => println!(
                "  {} {} ({}ms): {}",
                mark, stage.stage_name, stage.duration_ms, error
            ),
            None => println!("  {} {} ({}ms)", mark, stage.stage_name, stage.duration_ms),
        }
    }

    println!();
    println!(
        "Summary: {}/{} stages passed",
        run.count(StageStatus::Passed),
        run.stages().len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use lading_core::{Revision, RunContext, RunRecorder, StageResult};

    fn context() -> RunContext {
        RunContext::new(Revision::parse("a1b2c3d4e5f6").unwrap(), "2.3.1", "registry.local/web")
            .unwrap()
    }

    #[test]
    fn test_exit_code_follows_outcome() {
        let mut ok = RunRecorder::new(&context());
        ok.record(StageResult::passed("build", 5));
        assert_eq!(exit_code(&ok.finish()), ExitCode::SUCCESS);

        let mut failed = RunRecorder::new(&context());
        failed.record(StageResult::failed("build", "build failed: exit 1", 5));
        failed.record(StageResult::skipped("deploy"));
        assert_eq!(exit_code(&failed.finish()), ExitCode::FAILURE);
    }

    #[tokio::test]
    async fn test_tag_with_explicit_revision() {
        assert!(cmd_tag("1.0.0", Some("a1b2c3d4")).await.is_ok());
        assert!(cmd_tag("1.0.0", Some("ab")).await.is_err());
    }

    #[test]
    fn test_check_config_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_check_config(&dir.path().join("lading.toml"), None).is_err());
    }

    #[test]
    fn test_check_config_accepts_example() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lading.toml");
        std::fs::write(&path, include_str!("../lading.example.toml")).unwrap();
        assert!(cmd_check_config(&path, Some("3.0.0")).is_ok());
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "lading",
            "--json",
            "run",
            "--config",
            "ci/lading.toml",
            "--version",
            "2.3.1",
            "--report",
            "run.json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run {
                config,
                version,
                report,
            } => {
                assert_eq!(config, PathBuf::from("ci/lading.toml"));
                assert_eq!(version.as_deref(), Some("2.3.1"));
                assert_eq!(report, Some(PathBuf::from("run.json")));
            }
            _ => panic!("expected run"),
        }
    }
}

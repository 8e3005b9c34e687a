//! Image vulnerability scanning with Trivy.

use std::time::Duration;

use async_trait::async_trait;
use lading_core::{Finding, ImageRef, PipelineError, Result, ScanReport, Scanner, Severity};
use serde::Deserialize;
use tracing::info;

use crate::process::Invocation;

/// `trivy image --quiet --format json <image>`; findings are filtered here
/// rather than by trivy so the threshold logic lives in one place.
#[derive(Debug, Clone)]
pub struct TrivyScanner {
    program: String,
    timeout: Option<Duration>,
}

impl Default for TrivyScanner {
    fn default() -> Self {
        Self::new("trivy")
    }
}

impl TrivyScanner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Scanner for TrivyScanner {
    async fn scan(&self, image: &ImageRef, threshold: Severity) -> Result<ScanReport> {
        let out = Invocation::new(&self.program)
            .args(["image", "--quiet", "--format", "json"])
            .arg(image.to_string())
            .timeout(self.timeout)
            .checked(PipelineError::Collaborator)
            .await?;

        let report = parse_report(&out.stdout, threshold)?;
        info!(
            image = %image,
            threshold = %threshold,
            findings = report.findings.len(),
            "scan finished"
        );
        Ok(report)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrivyReport {
    #[serde(default)]
    results: Vec<TrivyResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrivyResult {
    #[serde(default)]
    vulnerabilities: Option<Vec<TrivyVulnerability>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrivyVulnerability {
    #[serde(rename = "VulnerabilityID")]
    vulnerability_id: String,
    pkg_name: String,
    severity: String,
    title: Option<String>,
}

/// Parse trivy's JSON report, keeping findings at or above `threshold`.
///
/// Severities trivy reports that we do not know map to `Unknown`.
pub fn parse_report(json: &str, threshold: Severity) -> Result<ScanReport> {
    let report: TrivyReport = serde_json::from_str(json)?;
    let findings = report
        .results
        .into_iter()
        .flat_map(|r| r.vulnerabilities.unwrap_or_default())
        .map(|v| Finding {
            severity: v.severity.parse().unwrap_or(Severity::Unknown),
            id: v.vulnerability_id,
            package: v.pkg_name,
            title: v.title,
        });
    Ok(ScanReport::filtered(threshold, findings))
}

//! Vulnerability scan findings and severity thresholds.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Finding severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl std::str::FromStr for Severity {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNKNOWN" => Ok(Severity::Unknown),
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(PipelineError::Collaborator(format!(
                "unknown severity '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Unknown => "UNKNOWN",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// A single scanner finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub package: String,
    pub severity: Severity,
    pub title: Option<String>,
}

/// Findings at or above the requested threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub threshold: Severity,
    pub findings: Vec<Finding>,
}

impl ScanReport {
    /// Keep only findings at or above `threshold`, most severe first.
    pub fn filtered(threshold: Severity, findings: impl IntoIterator<Item = Finding>) -> Self {
        let mut findings: Vec<Finding> = findings
            .into_iter()
            .filter(|f| f.severity >= threshold)
            .collect();
        findings.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.id.cmp(&b.id)));
        Self {
            threshold,
            findings,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// Short human summary, e.g. `CVE-2024-1 (openssl, CRITICAL), ...`.
    pub fn summary(&self, limit: usize) -> String {
        let mut parts: Vec<String> = self
            .findings
            .iter()
            .take(limit)
            .map(|f| format!("{} ({}, {})", f.id, f.package, f.severity))
            .collect();
        if self.findings.len() > limit {
            parts.push(format!("and {} more", self.findings.len() - limit));
        }
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(id: &str, severity: Severity) -> Finding {
        Finding {
            id: id.to_string(),
            package: "openssl".to_string(),
            severity,
            title: None,
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Low > Severity::Unknown);
    }

    #[test]
    fn test_severity_parse_case_insensitive() {
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!(" High ".parse::<Severity>().unwrap(), Severity::High);
        assert!("severe".parse::<Severity>().is_err());
    }

    #[test]
    fn test_filtered_drops_below_threshold() {
        let report = ScanReport::filtered(
            Severity::High,
            vec![
                finding("CVE-1", Severity::Low),
                finding("CVE-2", Severity::High),
                finding("CVE-3", Severity::Critical),
            ],
        );
        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.findings[0].id, "CVE-3");
        assert!(!report.is_clean());
    }

    #[test]
    fn test_summary_truncates() {
        let report = ScanReport::filtered(
            Severity::Low,
            vec![
                finding("CVE-1", Severity::Low),
                finding("CVE-2", Severity::Low),
                finding("CVE-3", Severity::Low),
            ],
        );
        let summary = report.summary(2);
        assert!(summary.contains("CVE-1 (openssl, LOW)"));
        assert!(summary.ends_with("and 1 more"));
    }
}

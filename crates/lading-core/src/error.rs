//! Error taxonomy for pipeline stages and collaborators.

use crate::domain::verdict::VerdictStatus;

/// Errors produced by stage actions and the collaborators they call.
///
/// Every variant is caught at the stage runner boundary and recorded as
/// `StageResult::error` text; none of them escapes a running pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("build failed: {0}")]
    BuildFailure(String),

    #[error("tests failed: {0}")]
    TestFailure(String),

    #[error("quality gate {status}: {}", reasons_or_none(.reasons))]
    QualityGateFailure {
        status: VerdictStatus,
        reasons: Vec<String>,
    },

    #[error("scan found {count} finding(s) at or above {threshold}: {summary}")]
    ScanFailure {
        count: usize,
        threshold: String,
        summary: String,
    },

    #[error("push failed: {0}")]
    PushFailure(String),

    #[error("config store conflict on {path}: read at {expected}, remote is now {actual}")]
    Conflict {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("invalid revision: {0}")]
    InvalidRevision(String),

    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("config field error: {0}")]
    ConfigField(String),

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("credentials unavailable: {0}")]
    Credentials(String),

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{what} timed out after {secs}s")]
    Timeout { what: String, secs: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn reasons_or_none(reasons: &[String]) -> String {
    if reasons.is_empty() {
        "no reasons reported".to_string()
    } else {
        reasons.join("; ")
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_gate_failure_display() {
        let err = PipelineError::QualityGateFailure {
            status: VerdictStatus::Failed,
            reasons: vec!["coverage 41.0 < 80".to_string(), "bugs 3 > 0".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("quality gate failed"));
        assert!(msg.contains("coverage 41.0 < 80; bugs 3 > 0"));
    }

    #[test]
    fn test_quality_gate_timeout_display() {
        let err = PipelineError::QualityGateFailure {
            status: VerdictStatus::TimedOut,
            reasons: vec![],
        };
        assert_eq!(err.to_string(), "quality gate timed out: no reasons reported");
    }

    #[test]
    fn test_conflict_display() {
        let err = PipelineError::Conflict {
            path: "apps/web/values.yaml".to_string(),
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("apps/web/values.yaml"));
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }
}

//! Quality-gate verdicts reported by the analysis service.

use serde::{Deserialize, Serialize};

/// Status of a quality-gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Pending,
    Passed,
    Failed,
    TimedOut,
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VerdictStatus::Pending => "pending",
            VerdictStatus::Passed => "passed",
            VerdictStatus::Failed => "failed",
            VerdictStatus::TimedOut => "timed out",
        };
        f.write_str(s)
    }
}

/// A quality-gate answer with its ordered reasons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub status: VerdictStatus,
    pub reasons: Vec<String>,
}

impl QualityVerdict {
    pub fn pending() -> Self {
        Self {
            status: VerdictStatus::Pending,
            reasons: Vec::new(),
        }
    }

    pub fn passed() -> Self {
        Self {
            status: VerdictStatus::Passed,
            reasons: Vec::new(),
        }
    }

    pub fn failed(reasons: Vec<String>) -> Self {
        Self {
            status: VerdictStatus::Failed,
            reasons,
        }
    }

    pub fn timed_out(reason: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::TimedOut,
            reasons: vec![reason.into()],
        }
    }

    /// `Passed` and `Failed` end polling; `Pending` does not, and `TimedOut`
    /// is only ever produced locally by the poller.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, VerdictStatus::Passed | VerdictStatus::Failed)
    }

    pub fn is_passed(&self) -> bool {
        self.status == VerdictStatus::Passed
    }
}

use serde::{Deserialize, Serialize};

/// Status transitions are one-directional except the explicit
/// `retry_failed` gate out of `FailedPipeline`. The four terminals mirror
/// `quality_gate::GateStatus` one-for-one, plus `FailedPipeline` also
/// covers a worker-level error raised before the gate ever runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    CompletedWithWarnings,
    DegradedNoEvidence,
    FailedPipeline,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::CompletedWithWarnings
                | RunStatus::DegradedNoEvidence
                | RunStatus::FailedPipeline
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithWarnings => "completed_with_warnings",
            RunStatus::DegradedNoEvidence => "degraded_no_evidence",
            RunStatus::FailedPipeline => "failed_pipeline",
        }
    }
}

/// A single execution of the assessment pipeline against one company and
/// reporting period. `run_hash` is the canonical fingerprint over the
/// inputs that determine the outputs; identical inputs across two runs
/// produce an identical `run_hash` and may share a cache entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub id: String,
    pub tenant_id: String,
    pub company_id: i64,
    pub reporting_year: i64,
    pub status: RunStatus,
    pub run_hash: Option<String>,
    pub bypass_cache: bool,
    pub llm_provider: String,
    pub created_at: String,
    pub finished_at: Option<String>,
    pub failure_category: Option<String>,
    pub failure_message: Option<String>,
}

/// Materiality configuration resolved for a run: which regimes and
/// jurisdictions apply, feeding both legacy and registry applicability
/// resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMateriality {
    pub selected_regimes: Vec<String>,
    pub selected_jurisdictions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_four_gate_terminals_are_terminal() {
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::CompletedWithWarnings.is_terminal());
        assert!(RunStatus::DegradedNoEvidence.is_terminal());
        assert!(RunStatus::FailedPipeline.is_terminal());
    }
}

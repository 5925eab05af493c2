//! Evaluates run metrics against configured thresholds and selects the
//! terminal status (§4.11). Precedence is fixed: pipeline-ingestion
//! failures outrank evidence failures, which outrank warnings-only.

use crate::config::QualityGateThresholds;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Completed,
    CompletedWithWarnings,
    DegradedNoEvidence,
    FailedPipeline,
}

impl GateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GateStatus::Completed => "completed",
            GateStatus::CompletedWithWarnings => "completed_with_warnings",
            GateStatus::DegradedNoEvidence => "degraded_no_evidence",
            GateStatus::FailedPipeline => "failed_pipeline",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityGateMetrics {
    pub docs_discovered: i64,
    pub docs_ingested: i64,
    pub chunks_indexed: i64,
    pub chunk_not_found_count: i64,
    pub chunk_not_found_rate: f64,
    pub required_narrative_chunk_not_found: bool,
    pub evidence_hits_total: i64,
    pub min_evidence_hits_per_required_section: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGateDecision {
    pub status: GateStatus,
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
}

fn numeric_below(code: &str, observed: i64, threshold: i64) -> Option<String> {
    (observed < threshold).then(|| format!("{code}:{observed}<{threshold}"))
}

fn rate_above(code: &str, observed: f64, threshold: f64) -> Option<String> {
    (observed > threshold).then(|| format!("{code}:{observed:.6}>{threshold:.6}"))
}

/// Evaluates the gate. Failures and warnings are returned sorted for
/// deterministic manifest output.
pub fn evaluate(metrics: &QualityGateMetrics, config: &QualityGateThresholds) -> QualityGateDecision {
    let mut pipeline_failures = Vec::new();
    pipeline_failures.extend(numeric_below(
        "docs_discovered_below_min",
        metrics.docs_discovered,
        config.min_docs_discovered,
    ));
    pipeline_failures.extend(numeric_below(
        "docs_ingested_below_min",
        metrics.docs_ingested,
        config.min_docs_ingested,
    ));
    pipeline_failures.extend(numeric_below(
        "chunks_indexed_below_min",
        metrics.chunks_indexed,
        config.min_chunks_indexed,
    ));

    if !pipeline_failures.is_empty() {
        pipeline_failures.sort();
        return QualityGateDecision {
            status: GateStatus::FailedPipeline,
            failures: pipeline_failures,
            warnings: vec![],
        };
    }

    let mut evidence_failures = Vec::new();
    evidence_failures.extend(rate_above(
        "chunk_not_found_rate_above_max",
        metrics.chunk_not_found_rate,
        config.max_chunk_not_found_rate,
    ));
    if config.fail_on_required_narrative_chunk_not_found && metrics.required_narrative_chunk_not_found {
        evidence_failures.push("required_narrative_chunk_not_found".to_string());
    }
    evidence_failures.extend(numeric_below(
        "evidence_hits_below_min",
        metrics.evidence_hits_total,
        config.min_evidence_hits,
    ));
    evidence_failures.extend(numeric_below(
        "required_section_evidence_hits_below_min",
        metrics.min_evidence_hits_per_required_section,
        config.min_evidence_hits_per_section,
    ));

    if !evidence_failures.is_empty() {
        evidence_failures.sort();
        return QualityGateDecision {
            status: GateStatus::DegradedNoEvidence,
            failures: evidence_failures,
            warnings: vec![],
        };
    }

    let mut warnings = Vec::new();
    if metrics.chunk_not_found_count > 0 {
        warnings.push(format!(
            "chunk_not_found_count_nonzero:{}",
            metrics.chunk_not_found_count
        ));
    }
    warnings.sort();

    if warnings.is_empty() {
        QualityGateDecision {
            status: GateStatus::Completed,
            failures: vec![],
            warnings: vec![],
        }
    } else {
        QualityGateDecision {
            status: GateStatus::CompletedWithWarnings,
            failures: vec![],
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> QualityGateThresholds {
        QualityGateThresholds {
            min_docs_discovered: 3,
            min_docs_ingested: 3,
            min_chunks_indexed: 1,
            max_chunk_not_found_rate: 0.1,
            min_evidence_hits: 1,
            min_evidence_hits_per_section: 1,
            fail_on_required_narrative_chunk_not_found: true,
        }
    }

    #[test]
    fn pipeline_failures_take_precedence_over_everything_else() {
        let metrics = QualityGateMetrics {
            docs_discovered: 2,
            docs_ingested: 3,
            chunks_indexed: 1,
            chunk_not_found_rate: 0.9,
            evidence_hits_total: 0,
            ..Default::default()
        };
        let decision = evaluate(&metrics, &config());
        assert_eq!(decision.status, GateStatus::FailedPipeline);
        assert_eq!(decision.failures, vec!["docs_discovered_below_min:2<3"]);
    }

    #[test]
    fn evidence_failure_formats_rate_to_six_decimals() {
        let metrics = QualityGateMetrics {
            docs_discovered: 3,
            docs_ingested: 3,
            chunks_indexed: 10,
            chunk_not_found_count: 2,
            chunk_not_found_rate: 0.142_857,
            evidence_hits_total: 5,
            min_evidence_hits_per_required_section: 2,
            required_narrative_chunk_not_found: false,
        };
        let decision = evaluate(&metrics, &config());
        assert_eq!(decision.status, GateStatus::DegradedNoEvidence);
        assert!(decision
            .failures
            .contains(&"chunk_not_found_rate_above_max:0.142857>0.100000".to_string()));
    }

    #[test]
    fn warnings_only_when_all_thresholds_pass_but_some_chunk_not_found() {
        let metrics = QualityGateMetrics {
            docs_discovered: 3,
            docs_ingested: 3,
            chunks_indexed: 10,
            chunk_not_found_count: 1,
            chunk_not_found_rate: 0.01,
            evidence_hits_total: 5,
            min_evidence_hits_per_required_section: 2,
            required_narrative_chunk_not_found: false,
        };
        let decision = evaluate(&metrics, &config());
        assert_eq!(decision.status, GateStatus::CompletedWithWarnings);
    }

    #[test]
    fn clean_metrics_produce_completed_with_no_issues() {
        let metrics = QualityGateMetrics {
            docs_discovered: 3,
            docs_ingested: 3,
            chunks_indexed: 10,
            chunk_not_found_count: 0,
            chunk_not_found_rate: 0.0,
            evidence_hits_total: 5,
            min_evidence_hits_per_required_section: 2,
            required_narrative_chunk_not_found: false,
        };
        let decision = evaluate(&metrics, &config());
        assert_eq!(decision.status, GateStatus::Completed);
        assert!(decision.failures.is_empty());
        assert!(decision.warnings.is_empty());
    }
}

//! Offline regression check for the quality gate (§4.11, §4.16): runs a
//! synthetic metrics scenario through each rung of the precedence ladder
//! (pipeline failure, evidence failure, warnings-only, clean) and checks the
//! decision against what that rung is supposed to produce. Exits non-zero on
//! any scenario whose actual decision doesn't match the expected one.

use compliance_core::config::QualityGateThresholds;
use compliance_core::quality_gate::{evaluate, GateStatus, QualityGateMetrics};

fn thresholds() -> QualityGateThresholds {
    QualityGateThresholds {
        min_docs_discovered: 3,
        min_docs_ingested: 3,
        min_chunks_indexed: 1,
        max_chunk_not_found_rate: 0.25,
        min_evidence_hits: 1,
        min_evidence_hits_per_section: 1,
        fail_on_required_narrative_chunk_not_found: true,
    }
}

struct Scenario {
    gate_id: &'static str,
    metrics: QualityGateMetrics,
    expected: GateStatus,
}

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            gate_id: "pipeline_ingestion_failure_outranks_everything",
            metrics: QualityGateMetrics {
                docs_discovered: 1,
                docs_ingested: 1,
                chunks_indexed: 0,
                chunk_not_found_rate: 0.9,
                evidence_hits_total: 0,
                ..Default::default()
            },
            expected: GateStatus::FailedPipeline,
        },
        Scenario {
            gate_id: "evidence_failure_when_pipeline_ingestion_is_healthy",
            metrics: QualityGateMetrics {
                docs_discovered: 3,
                docs_ingested: 3,
                chunks_indexed: 10,
                chunk_not_found_count: 8,
                chunk_not_found_rate: 0.8,
                evidence_hits_total: 5,
                min_evidence_hits_per_required_section: 2,
                required_narrative_chunk_not_found: false,
            },
            expected: GateStatus::DegradedNoEvidence,
        },
        Scenario {
            gate_id: "warnings_only_when_all_thresholds_pass",
            metrics: QualityGateMetrics {
                docs_discovered: 3,
                docs_ingested: 3,
                chunks_indexed: 10,
                chunk_not_found_count: 1,
                chunk_not_found_rate: 0.05,
                evidence_hits_total: 5,
                min_evidence_hits_per_required_section: 2,
                required_narrative_chunk_not_found: false,
            },
            expected: GateStatus::CompletedWithWarnings,
        },
        Scenario {
            gate_id: "clean_metrics_complete_with_no_issues",
            metrics: QualityGateMetrics {
                docs_discovered: 3,
                docs_ingested: 3,
                chunks_indexed: 10,
                chunk_not_found_count: 0,
                chunk_not_found_rate: 0.0,
                evidence_hits_total: 5,
                min_evidence_hits_per_required_section: 2,
                required_narrative_chunk_not_found: false,
            },
            expected: GateStatus::Completed,
        },
    ]
}

fn main() {
    let config = thresholds();
    let mut any_mismatch = false;

    for scenario in scenarios() {
        let decision = evaluate(&scenario.metrics, &config);
        let result = if decision.status == scenario.expected { "PASS" } else { "FAIL" };
        if result == "FAIL" {
            any_mismatch = true;
        }
        println!(
            "GATE {} {} expected={} actual={} failures={} warnings={}",
            scenario.gate_id,
            result,
            scenario.expected.as_str(),
            decision.status.as_str(),
            serde_json::to_string(&decision.failures).unwrap(),
            serde_json::to_string(&decision.warnings).unwrap(),
        );
    }

    if any_mismatch {
        std::process::exit(1);
    }
}

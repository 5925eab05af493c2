//! Run Manifest construction (§4.13): the top-level summary document written
//! once a run reaches a terminal status.

use crate::determinism::json_canonical::to_canonical_bytes;
use crate::determinism::run_id::sha256_hex;
use crate::entities::{DatapointAssessment, DisclosureStatus, RunManifest};
use crate::error::CoreResult;
use crate::quality_gate::QualityGateDecision;

/// Identifies the manifest's own shape/field set, independent of the
/// regulatory compiler or extraction prompt versions it carries through.
pub const REPORT_TEMPLATE_VERSION: &str = "manifest-v1";

/// `prompt_hash` for the manifest: the single assessment prompt hash if
/// every assessment's prompt hash agrees, otherwise the hash of the sorted,
/// deduplicated set of prompt hashes.
pub fn aggregate_prompt_hash(prompt_hashes: &[String]) -> CoreResult<String> {
    let mut unique: Vec<String> = prompt_hashes.to_vec();
    unique.sort();
    unique.dedup();
    match unique.len() {
        1 => Ok(unique.into_iter().next().unwrap()),
        _ => Ok(sha256_hex(&to_canonical_bytes(&unique)?)),
    }
}

/// `model_name` for the manifest, using the same single-value-or-aggregate
/// rule as `aggregate_prompt_hash`: the one model every assessment used, or
/// `"mixed"` when a run spanned more than one.
fn aggregate_model_name(model_names: &[String]) -> String {
    let mut unique: Vec<&String> = model_names.iter().collect();
    unique.sort();
    unique.dedup();
    match unique.len() {
        0 => "none".to_string(),
        1 => unique[0].clone(),
        _ => "mixed".to_string(),
    }
}

/// Everything about the compiled regulatory plan and process build that the
/// manifest carries through without re-deriving it.
#[derive(Debug, Clone, Default)]
pub struct RegulatoryProvenance {
    pub regulatory_plan_json: Option<serde_json::Value>,
    pub regulatory_registry_version: Option<String>,
    pub regulatory_compiler_version: String,
    pub report_template_version: String,
    pub git_sha: String,
}

#[allow(clippy::too_many_arguments)]
pub fn build_manifest(
    run_id: &str,
    tenant_id: &str,
    company_id: i64,
    reporting_year: i64,
    status: &str,
    run_hash: &str,
    plan_hash: Option<String>,
    retrieval_params: serde_json::Value,
    provenance: RegulatoryProvenance,
    document_ids: Vec<i64>,
    document_hashes: Vec<String>,
    assessments: &[DatapointAssessment],
    gate_decision: &QualityGateDecision,
    generated_at: &str,
) -> CoreResult<RunManifest> {
    let mut document_hashes = document_hashes;
    document_hashes.sort();
    document_hashes.dedup();

    let present_count = assessments
        .iter()
        .filter(|a| a.status == DisclosureStatus::Present)
        .count() as i64;
    let partial_count = assessments
        .iter()
        .filter(|a| a.status == DisclosureStatus::Partial)
        .count() as i64;
    let absent_count = assessments
        .iter()
        .filter(|a| a.status == DisclosureStatus::Absent)
        .count() as i64;
    let na_count = assessments
        .iter()
        .filter(|a| a.status == DisclosureStatus::Na)
        .count() as i64;

    let mut failure_codes = gate_decision.failures.clone();
    failure_codes.extend(gate_decision.warnings.clone());
    failure_codes.sort();

    let prompt_hashes: Vec<String> = assessments.iter().map(|a| a.prompt_hash.clone()).collect();
    let model_names: Vec<String> = assessments.iter().map(|a| a.model_name.clone()).collect();

    Ok(RunManifest {
        run_id: run_id.to_string(),
        tenant_id: tenant_id.to_string(),
        company_id,
        reporting_year,
        status: status.to_string(),
        run_hash: run_hash.to_string(),
        plan_hash,
        document_ids,
        document_hashes,
        required_datapoint_count: assessments.len() as i64,
        present_count,
        partial_count,
        absent_count,
        na_count,
        quality_gate_status: gate_decision.status.as_str().to_string(),
        quality_gate_failure_codes: failure_codes,
        generated_at: generated_at.to_string(),
        prompt_hash: aggregate_prompt_hash(&prompt_hashes)?,
        model_name: aggregate_model_name(&model_names),
        retrieval_params,
        regulatory_plan_json: provenance.regulatory_plan_json,
        regulatory_registry_version: provenance.regulatory_registry_version,
        regulatory_compiler_version: provenance.regulatory_compiler_version,
        report_template_version: provenance.report_template_version,
        git_sha: provenance.git_sha,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Citation;
    use crate::quality_gate::GateStatus;

    fn assessment(status: DisclosureStatus) -> DatapointAssessment {
        DatapointAssessment {
            run_id: "r1".to_string(),
            required_datapoint_id: "dp.1".to_string(),
            status,
            extracted_value: None,
            unit: None,
            citations: vec![Citation { document_id: 1, chunk_id: "c1".to_string(), page_number: 1 }],
            verifier_notes: vec![],
            model_name: "deterministic-local-v1".to_string(),
            prompt_hash: "ph1".to_string(),
            retrieval_params: serde_json::json!({}),
        }
    }

    #[test]
    fn single_matching_prompt_hash_is_returned_unchanged() {
        assert_eq!(aggregate_prompt_hash(&["ph1".to_string(), "ph1".to_string()]).unwrap(), "ph1");
    }

    #[test]
    fn divergent_prompt_hashes_are_combined_deterministically() {
        let a = aggregate_prompt_hash(&["ph1".to_string(), "ph2".to_string()]).unwrap();
        let b = aggregate_prompt_hash(&["ph2".to_string(), "ph1".to_string()]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, "ph1");
    }

    #[test]
    fn manifest_counts_assessments_by_status() {
        let assessments = vec![
            assessment(DisclosureStatus::Present),
            assessment(DisclosureStatus::Partial),
            assessment(DisclosureStatus::Absent),
            assessment(DisclosureStatus::Na),
        ];
        let decision = QualityGateDecision {
            status: GateStatus::Completed,
            failures: vec![],
            warnings: vec![],
        };
        let manifest = build_manifest(
            "r1",
            "t1",
            1,
            2026,
            "completed",
            "hash1",
            Some("plan1".to_string()),
            serde_json::json!({"top_k": 5}),
            RegulatoryProvenance {
                regulatory_compiler_version: "1".to_string(),
                report_template_version: "1".to_string(),
                git_sha: "deadbeef".to_string(),
                ..Default::default()
            },
            vec![1, 2],
            vec!["h2".to_string(), "h1".to_string(), "h1".to_string()],
            &assessments,
            &decision,
            "2026-01-01T00:00:00Z",
        )
        .unwrap();
        assert_eq!(manifest.present_count, 1);
        assert_eq!(manifest.partial_count, 1);
        assert_eq!(manifest.absent_count, 1);
        assert_eq!(manifest.na_count, 1);
        assert_eq!(manifest.document_hashes, vec!["h1".to_string(), "h2".to_string()]);
        assert_eq!(manifest.prompt_hash, "ph1");
        assert_eq!(manifest.model_name, "deterministic-local-v1");
    }

    #[test]
    fn mixed_model_names_aggregate_to_mixed() {
        let mut a = assessment(DisclosureStatus::Present);
        a.model_name = "other-model".to_string();
        let assessments = vec![assessment(DisclosureStatus::Absent), a];
        let decision = QualityGateDecision {
            status: GateStatus::Completed,
            failures: vec![],
            warnings: vec![],
        };
        let manifest = build_manifest(
            "r1",
            "t1",
            1,
            2026,
            "completed",
            "hash1",
            None,
            serde_json::json!({}),
            RegulatoryProvenance::default(),
            vec![],
            vec![],
            &assessments,
            &decision,
            "2026-01-01T00:00:00Z",
        )
        .unwrap();
        assert_eq!(manifest.model_name, "mixed");
    }
}

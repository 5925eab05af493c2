use serde::{Deserialize, Serialize};

/// The exact input payload a run was enqueued with, persisted idempotently
/// by `(run_id, tenant_id)` before execution starts so a rerun of the same
/// run can always recover what it was asked to do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunInputSnapshot {
    pub run_id: String,
    pub tenant_id: String,
    pub payload: serde_json::Value,
    pub checksum: String,
}

/// Cache row keyed by `(tenant_id, run_hash)`. `bypass_cache` runs never read
/// or write this table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunCacheEntry {
    pub tenant_id: String,
    pub run_hash: String,
    pub run_id: String,
    pub created_at: String,
}

/// The top-level summary document written once a run reaches a terminal
/// status: everything an evidence pack reader needs without re-deriving it
/// from the assessment and obligation-coverage tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunManifest {
    pub run_id: String,
    pub tenant_id: String,
    pub company_id: i64,
    pub reporting_year: i64,
    pub status: String,
    pub run_hash: String,
    pub plan_hash: Option<String>,
    pub document_ids: Vec<i64>,
    pub document_hashes: Vec<String>,
    pub required_datapoint_count: i64,
    pub present_count: i64,
    pub partial_count: i64,
    pub absent_count: i64,
    pub na_count: i64,
    pub quality_gate_status: String,
    pub quality_gate_failure_codes: Vec<String>,
    pub generated_at: String,
    pub prompt_hash: String,
    pub model_name: String,
    pub retrieval_params: serde_json::Value,
    pub regulatory_plan_json: Option<serde_json::Value>,
    pub regulatory_registry_version: Option<String>,
    pub regulatory_compiler_version: String,
    pub report_template_version: String,
    pub git_sha: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_round_trips_through_json() {
        let manifest = RunManifest {
            run_id: "r1".to_string(),
            tenant_id: "t1".to_string(),
            company_id: 1,
            reporting_year: 2026,
            status: "completed".to_string(),
            run_hash: "abc".to_string(),
            plan_hash: Some("def".to_string()),
            document_ids: vec![1, 2],
            document_hashes: vec!["h1".to_string()],
            required_datapoint_count: 10,
            present_count: 7,
            partial_count: 2,
            absent_count: 1,
            na_count: 0,
            quality_gate_status: "pass".to_string(),
            quality_gate_failure_codes: vec![],
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            prompt_hash: "ph1".to_string(),
            model_name: "deterministic-local-v1".to_string(),
            retrieval_params: serde_json::json!({"top_k": 5}),
            regulatory_plan_json: None,
            regulatory_registry_version: None,
            regulatory_compiler_version: "1".to_string(),
            report_template_version: "1".to_string(),
            git_sha: "unknown".to_string(),
        };
        let json = serde_json::to_string(&manifest).unwrap();
        let back: RunManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(manifest, back);
    }
}

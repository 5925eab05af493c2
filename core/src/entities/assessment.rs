use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisclosureStatus {
    Present,
    Partial,
    Absent,
    /// The datapoint does not apply to this company/period (e.g. an
    /// optional element a company opted out of under `applies_if`, rather
    /// than one the compiler excluded from the required set entirely).
    Na,
}

/// One required datapoint's outcome for a run: the verifier's final status,
/// the supporting chunk citations, and the raw extracted value. Deleted and
/// reinserted wholesale on every run of the same `run_id` so a partial
/// rerun can never leave a stale row behind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatapointAssessment {
    pub run_id: String,
    pub required_datapoint_id: String,
    pub status: DisclosureStatus,
    pub extracted_value: Option<serde_json::Value>,
    pub unit: Option<String>,
    pub citations: Vec<Citation>,
    pub verifier_notes: Vec<String>,
    pub model_name: String,
    pub prompt_hash: String,
    pub retrieval_params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub document_id: i64,
    pub chunk_id: String,
    pub page_number: i64,
}

/// Per-run diagnostics recorded alongside assessments: counts explaining why
/// a datapoint landed at the status it did, surfaced in the evidence pack
/// and consulted by the quality gate's warnings-only branch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionDiagnostics {
    pub run_id: String,
    pub required_datapoint_id: String,
    pub chunks_considered: i64,
    pub chunks_with_zero_retrieval_score: i64,
    pub chunk_not_found_in_citation: bool,
    pub verifier_downgraded: bool,
}

//! Run Input Snapshot construction (§4.13): the exact payload a run was
//! enqueued with, captured once before heavy work begins so a later rerun
//! can always recover what it was asked to do.

use crate::determinism::json_canonical::to_canonical_bytes;
use crate::determinism::run_id::sha256_hex;
use crate::error::CoreResult;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInputs {
    pub run_id: String,
    pub tenant_id: String,
    pub company_id: i64,
    pub company_profile: serde_json::Value,
    pub materiality_inputs: serde_json::Value,
    pub bundle_id: String,
    pub bundle_version: String,
    pub compiler_mode: String,
    pub retrieval: serde_json::Value,
    pub required_datapoint_universe: serde_json::Value,
    pub discovery_candidates: Vec<i64>,
    pub selected_documents: Vec<i64>,
    pub retrieval_smoke_test: serde_json::Value,
}

pub fn build_snapshot_payload(inputs: &SnapshotInputs) -> CoreResult<serde_json::Value> {
    Ok(serde_json::to_value(inputs)?)
}

pub fn snapshot_checksum(inputs: &SnapshotInputs) -> CoreResult<String> {
    Ok(sha256_hex(&to_canonical_bytes(inputs)?))
}

use crate::determinism::json_canonical;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// One entry in a run's append-only event journal. Ordered by
/// `(created_at, id)`; `payload` is always canonical JSON (§3 RunEvent).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunEvent {
    pub id: i64,
    pub run_id: String,
    pub tenant_id: String,
    pub created_at: String, // RFC3339 UTC
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// Every event_type the run worker is permitted to emit, paired with the
/// detail keys that must be present in `payload`. Anything outside this
/// taxonomy is a programming error, not a recoverable one.
pub fn required_payload_keys(event_type: &str) -> &'static [&'static str] {
    match event_type {
        "run.execution.started" => &[
            "tenant_id",
            "bundle_id",
            "bundle_version",
            "llm_provider",
            "research_provider",
            "bypass_cache",
        ],
        "run.execution.warning" => &["tenant_id", "reason"],
        "run.execution.integrity_warning" => &["tenant_id", "failure_count", "diagnostics_count"],
        "run.execution.retrieval_smoke_test" => &["tenant_id", "diagnostic"],
        "run.execution.quality_gated" => &["tenant_id", "decision", "metrics"],
        "run.execution.completed" => &["tenant_id", "assessment_count", "final_status"],
        "run.execution.failed" => &["tenant_id", "failure_category", "retryable"],
        "run.state_changed" => &["from_status", "to_status"],
        _ => &[],
    }
}

pub fn validate_event_taxonomy(event_type: &str, payload: &serde_json::Value) -> CoreResult<()> {
    let allowed = [
        "run.execution.started",
        "run.execution.warning",
        "run.execution.integrity_warning",
        "run.execution.retrieval_smoke_test",
        "run.execution.quality_gated",
        "run.execution.completed",
        "run.execution.failed",
        "run.state_changed",
    ];
    if !allowed.contains(&event_type) {
        return Err(CoreError::InvalidInput(format!(
            "unknown event_type {event_type}"
        )));
    }
    for key in required_payload_keys(event_type) {
        if payload.get(key).is_none() {
            return Err(CoreError::InvalidInput(format!(
                "event {event_type} missing payload.{key}"
            )));
        }
    }
    Ok(())
}

impl RunEvent {
    pub fn canonical_payload_bytes(&self) -> CoreResult<Vec<u8>> {
        json_canonical::to_canonical_bytes(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_unknown_event_type() {
        let err = validate_event_taxonomy("made.up.event", &json!({})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn rejects_missing_required_keys() {
        let err = validate_event_taxonomy("run.execution.started", &json!({"tenant_id": "t1"}))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn accepts_complete_payload() {
        validate_event_taxonomy(
            "run.execution.started",
            &json!({
                "tenant_id": "t1",
                "bundle_id": "esrs_mini",
                "bundle_version": "2026.01",
                "llm_provider": "deterministic_fallback",
                "research_provider": "none",
                "bypass_cache": false,
            }),
        )
        .unwrap();
    }
}

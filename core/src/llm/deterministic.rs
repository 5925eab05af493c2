//! Built-in deterministic transport (§4.7): used whenever `llm_provider` is
//! anything other than `local_lm_studio` or `openai_cloud`, including the
//! golden deterministic-run scenario. Performs no I/O and never fails.

use crate::error::CoreResult;
use crate::llm::client::LmTransport;

pub const DETERMINISTIC_MODEL_NAME: &str = "deterministic-local-v1";

pub const LOCAL_LM_STUDIO: &str = "local_lm_studio";
pub const OPENAI_CLOUD: &str = "openai_cloud";

pub struct DeterministicAbsentTransport;

impl LmTransport for DeterministicAbsentTransport {
    fn model_name(&self) -> &str {
        DETERMINISTIC_MODEL_NAME
    }

    fn complete(&self, _prompt: &str, _datapoint_key: &str) -> CoreResult<String> {
        Ok(serde_json::json!({
            "status": "Absent",
            "value": serde_json::Value::Null,
            "evidence_chunk_ids": [],
            "rationale": "deterministic fallback: no provider configured",
        })
        .to_string())
    }
}

/// Whether `llm_provider` names a real, configured transport. Anything
/// outside this set (including typos and unknown provider names) routes to
/// the deterministic fallback rather than failing -- the system stays
/// reproducible even when misconfigured.
pub fn is_configured_provider(llm_provider: &str) -> bool {
    matches!(llm_provider, LOCAL_LM_STUDIO | OPENAI_CLOUD)
}

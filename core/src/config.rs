//! Process-wide settings, parsed once at startup into an immutable value.
//! Nothing in the core reads the environment again after [`Settings::from_env`]
//! returns; callers thread the value through by reference.

use crate::error::{CoreError, CoreResult};
use std::env;

#[derive(Debug, Clone)]
pub struct QualityGateThresholds {
    pub min_docs_discovered: i64,
    pub min_docs_ingested: i64,
    pub min_chunks_indexed: i64,
    pub max_chunk_not_found_rate: f64,
    pub min_evidence_hits: i64,
    pub min_evidence_hits_per_section: i64,
    pub fail_on_required_narrative_chunk_not_found: bool,
}

impl Default for QualityGateThresholds {
    fn default() -> Self {
        Self {
            min_docs_discovered: 1,
            min_docs_ingested: 1,
            min_chunks_indexed: 1,
            max_chunk_not_found_rate: 0.25,
            min_evidence_hits: 1,
            min_evidence_hits_per_section: 1,
            fail_on_required_narrative_chunk_not_found: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub object_storage_root: String,
    pub object_storage_uri_prefix: String,
    pub evidence_pack_output_root: String,
    pub git_sha: String,
    pub feature_registry_compiler: bool,
    pub feature_registry_report_matrix: bool,
    pub quality_gate: QualityGateThresholds,
    pub integrity_warning_failure_threshold: f64,
    pub retrieval_smoke_top_k: i64,
    pub retrieval_smoke_auto_relax_filters: bool,
    pub lm_base_url: Option<String>,
    pub lm_api_key: Option<String>,
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> CoreResult<bool> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(CoreError::Config(format!(
                "{key} must be a boolean, got {other:?}"
            ))),
        },
    }
}

fn env_i64(key: &str, default: i64) -> CoreResult<i64> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<i64>()
            .map_err(|_| CoreError::Config(format!("{key} must be an integer, got {raw:?}"))),
    }
}

fn env_f64(key: &str, default: f64) -> CoreResult<f64> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<f64>()
            .map_err(|_| CoreError::Config(format!("{key} must be a float, got {raw:?}"))),
    }
}

impl Settings {
    /// Parses every known environment variable once. Call this exactly once
    /// per process; a malformed value is a fatal startup error, never a
    /// deferred one.
    pub fn from_env() -> CoreResult<Self> {
        let quality_gate = QualityGateThresholds {
            min_docs_discovered: env_i64("QUALITY_GATE_MIN_DOCS_DISCOVERED", 1)?,
            min_docs_ingested: env_i64("QUALITY_GATE_MIN_DOCS_INGESTED", 1)?,
            min_chunks_indexed: env_i64("QUALITY_GATE_MIN_CHUNKS_INDEXED", 1)?,
            max_chunk_not_found_rate: env_f64("QUALITY_GATE_MAX_CHUNK_NOT_FOUND_RATE", 0.25)?,
            min_evidence_hits: env_i64("QUALITY_GATE_MIN_EVIDENCE_HITS", 1)?,
            min_evidence_hits_per_section: env_i64(
                "QUALITY_GATE_MIN_EVIDENCE_HITS_PER_SECTION",
                1,
            )?,
            fail_on_required_narrative_chunk_not_found: env_bool(
                "QUALITY_GATE_FAIL_ON_REQUIRED_NARRATIVE_CHUNK_NOT_FOUND",
                false,
            )?,
        };

        Ok(Self {
            database_url: env_string("DATABASE_URL", "sqlite://compliance.db"),
            object_storage_root: env_string("OBJECT_STORAGE_ROOT", "./object_store"),
            object_storage_uri_prefix: env_string("OBJECT_STORAGE_URI_PREFIX", "file://"),
            evidence_pack_output_root: env_string("EVIDENCE_PACK_OUTPUT_ROOT", "./evidence_packs"),
            git_sha: env_string("GIT_SHA", "unknown"),
            feature_registry_compiler: env_bool("FEATURE_REGISTRY_COMPILER", true)?,
            feature_registry_report_matrix: env_bool("FEATURE_REGISTRY_REPORT_MATRIX", false)?,
            quality_gate,
            integrity_warning_failure_threshold: env_f64(
                "INTEGRITY_WARNING_FAILURE_THRESHOLD",
                0.5,
            )?,
            retrieval_smoke_top_k: env_i64("RETRIEVAL_SMOKE_TOP_K", 5)?,
            retrieval_smoke_auto_relax_filters: env_bool(
                "RETRIEVAL_SMOKE_AUTO_RELAX_FILTERS",
                true,
            )?,
            lm_base_url: env::var("LM_BASE_URL").ok(),
            lm_api_key: env::var("LM_API_KEY").ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_bool_rejects_garbage() {
        std::env::set_var("CORE_TEST_BOOL_FLAG", "not-a-bool");
        let err = env_bool("CORE_TEST_BOOL_FLAG", false).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
        std::env::remove_var("CORE_TEST_BOOL_FLAG");
    }

    #[test]
    fn defaults_apply_when_unset() {
        std::env::remove_var("QUALITY_GATE_MIN_DOCS_DISCOVERED");
        let settings = Settings::from_env().expect("settings parse");
        assert_eq!(settings.quality_gate.min_docs_discovered, 1);
        assert_eq!(settings.retrieval_smoke_top_k, 5);
    }
}

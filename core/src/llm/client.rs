//! Schema-enforced, temperature-pinned LM extraction client (§4.7).
//! Prompt construction is pure; the transport is abstracted behind
//! [`LmTransport`] so the deterministic fallback provider (`llm/deterministic.rs`)
//! can stand in without any network dependency.

use crate::determinism::run_id::sha256_hex;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

pub const TEMPERATURE: f64 = 0.0;

/// Identifies the prompt-construction logic itself (not any one rendered
/// prompt). Feeds the run hash at a point in the pipeline before any
/// datapoint has actually been extracted, so bumping this is how a prompt
/// template change is made to invalidate the run cache.
pub const PROMPT_TEMPLATE_VERSION: &str = "extraction-prompt-v1";

pub fn prompt_template_hash() -> String {
    sha256_hex(PROMPT_TEMPLATE_VERSION.as_bytes())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Present,
    Partial,
    Absent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionResult {
    pub status: ExtractionStatus,
    pub value: Option<String>,
    pub evidence_chunk_ids: Vec<String>,
    pub rationale: String,
    pub model_name: String,
}

impl ExtractionResult {
    /// Evidence gating (§4.7): `Present`/`Partial` must carry at least one
    /// evidence chunk ID.
    pub fn validate_evidence_gating(&self) -> CoreResult<()> {
        let needs_evidence = matches!(
            self.status,
            ExtractionStatus::Present | ExtractionStatus::Partial
        );
        if needs_evidence && self.evidence_chunk_ids.is_empty() {
            return Err(CoreError::SchemaValidationError(format!(
                "status {:?} requires at least one evidence_chunk_id",
                self.status
            )));
        }
        Ok(())
    }
}

/// Uniform transport interface every LM backend implements, letting the
/// extraction client stay identical across the deterministic fallback and
/// any real OpenAI-compatible provider.
pub trait LmTransport: Send + Sync {
    fn model_name(&self) -> &str;
    fn complete(&self, prompt: &str, datapoint_key: &str) -> CoreResult<String>;
}

/// Builds the deterministic extraction prompt for one datapoint against its
/// retrieved context chunks. Pure: identical inputs produce an identical
/// string, so `prompt_hash` is stable across runs.
pub fn build_prompt(datapoint_title: &str, disclosure_reference: &str, context_chunks: &[(String, String)]) -> String {
    let mut sections = vec![format!(
        "Datapoint: {datapoint_title}\nDisclosure reference: {disclosure_reference}"
    )];
    for (chunk_id, text) in context_chunks {
        sections.push(format!("[{chunk_id}] {text}"));
    }
    sections.join("\n\n")
}

pub fn prompt_hash(prompt: &str) -> String {
    sha256_hex(prompt.as_bytes())
}

/// Extracts the first JSON object from `raw`: a raw parse first, then a
/// fenced ```json block, then the outermost `{...}` window. Matches the
/// robustness the transport needs against chatty model output that wraps
/// JSON in prose.
pub fn extract_first_json_object(raw: &str) -> CoreResult<serde_json::Value> {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(raw.trim()) {
        if v.is_object() {
            return Ok(v);
        }
    }
    if let Some(fenced) = extract_fenced_json(raw) {
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(&fenced) {
            if v.is_object() {
                return Ok(v);
            }
        }
    }
    if let Some(window) = extract_outermost_braces(raw) {
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(&window) {
            if v.is_object() {
                return Ok(v);
            }
        }
    }
    Err(CoreError::SchemaParseError(
        "no JSON object found in LM response".to_string(),
    ))
}

fn extract_fenced_json(raw: &str) -> Option<String> {
    let marker = "```json";
    let start = raw.find(marker)? + marker.len();
    let rest = &raw[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

fn extract_outermost_braces(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(raw[start..=end].to_string())
}

fn parse_extraction_result(value: &serde_json::Value, model_name: &str) -> CoreResult<ExtractionResult> {
    let status_str = value
        .get("status")
        .and_then(|s| s.as_str())
        .ok_or_else(|| CoreError::SchemaValidationError("missing field: status".to_string()))?;
    let status = match status_str {
        "Present" => ExtractionStatus::Present,
        "Partial" => ExtractionStatus::Partial,
        "Absent" => ExtractionStatus::Absent,
        other => {
            return Err(CoreError::SchemaValidationError(format!(
                "unknown status: {other}"
            )))
        }
    };
    let value_field = value
        .get("value")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let evidence_chunk_ids = value
        .get("evidence_chunk_ids")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();
    let rationale = value
        .get("rationale")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let result = ExtractionResult {
        status,
        value: value_field,
        evidence_chunk_ids,
        rationale,
        model_name: model_name.to_string(),
    };
    result.validate_evidence_gating()?;
    Ok(result)
}

/// Invokes the transport for one datapoint and parses+validates its
/// response. This is the only function that should be called by the
/// assessment pipeline; it hides prompt construction and parsing behind a
/// single entry point.
pub fn extract(
    transport: &dyn LmTransport,
    datapoint_title: &str,
    disclosure_reference: &str,
    datapoint_key: &str,
    context_chunks: &[(String, String)],
) -> CoreResult<(ExtractionResult, String)> {
    let prompt = build_prompt(datapoint_title, disclosure_reference, context_chunks);
    let hash = prompt_hash(&prompt);
    let raw = transport.complete(&prompt, datapoint_key)?;
    let json = extract_first_json_object(&raw)?;
    let result = parse_extraction_result(&json, transport.model_name())?;
    Ok((result, hash))
}

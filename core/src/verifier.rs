//! Post-extraction verification (§4.8): cross-checks a declared value
//! against the text of its cited chunks and downgrades the status once on
//! any failure.
//!
//! Deliberate deviation from the system this was distilled from: that
//! system downgrades straight to `Absent` on any verification failure. This
//! verifier instead downgrades one step at a time
//! (`Present -> Partial -> Absent`), matching the single-step rule this
//! crate's own specification calls for, and only clears evidence once the
//! status actually reaches `Absent`.

use crate::llm::{ExtractionResult, ExtractionStatus};
use regex::Regex;
use std::sync::OnceLock;

const UNIT_TOKENS: &[&str] = &[
    "%", "tco2e", "co2e", "kg", "tonnes", "tonne", "tons", "ton", "mwh", "kwh", "gwh", "eur", "usd",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReasonCode {
    ChunkNotFound,
    EmptyChunk,
    NumericMismatch,
    BaselineMissing,
}

impl FailureReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReasonCode::ChunkNotFound => "CHUNK_NOT_FOUND",
            FailureReasonCode::EmptyChunk => "EMPTY_CHUNK",
            FailureReasonCode::NumericMismatch => "NUMERIC_MISMATCH",
            FailureReasonCode::BaselineMissing => "BASELINE_MISSING",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerifiedExtraction {
    pub result: ExtractionResult,
    pub failure_reason_code: Option<FailureReasonCode>,
    pub rationale_additions: Vec<String>,
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d[\d,\.]*").unwrap())
}

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap())
}

fn is_year_token(token: &str) -> bool {
    year_regex().is_match(token) && token.len() == 4
}

fn normalize_decimal(token: &str) -> String {
    token.replace(',', ".")
}

fn downgrade_once(status: ExtractionStatus) -> ExtractionStatus {
    match status {
        ExtractionStatus::Present => ExtractionStatus::Partial,
        ExtractionStatus::Partial => ExtractionStatus::Absent,
        ExtractionStatus::Absent => ExtractionStatus::Absent,
    }
}

fn cited_text_for<'a>(
    extraction: &ExtractionResult,
    chunk_texts: &'a std::collections::HashMap<String, String>,
) -> Result<String, FailureReasonCode> {
    let mut combined = String::new();
    for chunk_id in &extraction.evidence_chunk_ids {
        match chunk_texts.get(chunk_id) {
            Some(text) => {
                combined.push_str(text);
                combined.push(' ');
            }
            None => return Err(FailureReasonCode::ChunkNotFound),
        }
    }
    if combined.trim().is_empty() {
        return Err(FailureReasonCode::EmptyChunk);
    }
    Ok(combined)
}

fn check_numbers_units_years(value: &str, cited_text_lower: &str) -> Option<FailureReasonCode> {
    for m in number_regex().find_iter(value) {
        let token = m.as_str();
        if is_year_token(token) {
            continue;
        }
        let normalized = normalize_decimal(token);
        if !cited_text_lower.contains(&normalized) && !cited_text_lower.contains(token) {
            return Some(FailureReasonCode::NumericMismatch);
        }
    }
    for m in year_regex().find_iter(value) {
        if !cited_text_lower.contains(m.as_str()) {
            return Some(FailureReasonCode::NumericMismatch);
        }
    }
    for unit in UNIT_TOKENS {
        if value.to_ascii_lowercase().contains(unit) && !cited_text_lower.contains(unit) {
            return Some(FailureReasonCode::NumericMismatch);
        }
    }
    None
}

fn check_metric_requirements(
    value: &str,
    datapoint_type: &str,
    requires_baseline: bool,
) -> Option<FailureReasonCode> {
    if datapoint_type != "metric" {
        return None;
    }
    let numbers: Vec<&str> = number_regex().find_iter(value).map(|m| m.as_str()).collect();
    let years: Vec<&str> = year_regex().find_iter(value).map(|m| m.as_str()).collect();
    let has_unit = UNIT_TOKENS
        .iter()
        .any(|u| value.to_ascii_lowercase().contains(u));

    if numbers.is_empty() || !has_unit || years.is_empty() {
        return Some(FailureReasonCode::NumericMismatch);
    }

    let has_percent = value.contains('%');
    if (has_percent || requires_baseline) && (numbers.len() < 2 || years.len() < 2) {
        return Some(FailureReasonCode::BaselineMissing);
    }
    None
}

/// Verifies one extraction result. `chunk_texts` maps every chunk ID in the
/// retrieval result set (not just the cited ones) to its text, so a cited
/// ID outside that set is detectable as `CHUNK_NOT_FOUND`.
pub fn verify(
    extraction: ExtractionResult,
    chunk_texts: &std::collections::HashMap<String, String>,
    datapoint_type: &str,
    requires_baseline: bool,
) -> VerifiedExtraction {
    if !matches!(
        extraction.status,
        ExtractionStatus::Present | ExtractionStatus::Partial
    ) {
        return VerifiedExtraction {
            result: extraction,
            failure_reason_code: None,
            rationale_additions: vec![],
        };
    }

    let failure = match cited_text_for(&extraction, chunk_texts) {
        Err(code) => Some(code),
        Ok(combined) => {
            let cited_lower = combined.to_ascii_lowercase();
            let value = extraction.value.clone().unwrap_or_default();
            check_numbers_units_years(&value, &cited_lower)
                .or_else(|| check_metric_requirements(&value, datapoint_type, requires_baseline))
        }
    };

    match failure {
        None => VerifiedExtraction {
            result: extraction,
            failure_reason_code: None,
            rationale_additions: vec![],
        },
        Some(code) => {
            let value_desc = extraction.value.clone().unwrap_or_default();
            let new_status = downgrade_once(extraction.status);
            let mut additions = vec![format!(
                "verification failed ({}): numeric value not found in evidence: {}",
                code.as_str(),
                value_desc
            )];
            let mut evidence_chunk_ids = extraction.evidence_chunk_ids;
            if new_status == ExtractionStatus::Absent {
                evidence_chunk_ids.clear();
                additions.push("evidence cleared after downgrade to Absent".to_string());
            }
            VerifiedExtraction {
                result: ExtractionResult {
                    status: new_status,
                    evidence_chunk_ids,
                    ..extraction
                },
                failure_reason_code: Some(code),
                rationale_additions: additions,
            }
        }
    }
}

//! Per-required-datapoint orchestration (§4.8): retrieve, extract, verify,
//! for every datapoint a run resolved. Assessments and diagnostics are
//! written wholesale per run, never patched in place, so a rerun of the same
//! `run_id` can never leave a stale row from a previous attempt.

use crate::entities::{
    Chunk, Citation, DatapointAssessment, DisclosureStatus, Embedding, ExtractionDiagnostics,
    RequiredDatapoint,
};
use crate::error::CoreResult;
use crate::llm::{extract, ExtractionStatus, LmTransport};
use crate::retrieval::policy::{retrieve, ScoredChunk};
use crate::verifier::verify;
use std::collections::HashMap;

/// Everything the pipeline needs about one document's chunks to retrieve and
/// cite against it: text keyed by chunk ID, plus a lookup of document/page
/// for citation records.
pub struct ChunkIndex<'a> {
    pub chunks: &'a [Chunk],
    pub embeddings: &'a HashMap<String, Embedding>,
}

fn chunk_texts(chunks: &[Chunk]) -> HashMap<String, String> {
    chunks
        .iter()
        .map(|c| (c.chunk_id.clone(), c.text.clone()))
        .collect()
}

fn status_to_disclosure(status: ExtractionStatus) -> DisclosureStatus {
    match status {
        ExtractionStatus::Present => DisclosureStatus::Present,
        ExtractionStatus::Partial => DisclosureStatus::Partial,
        ExtractionStatus::Absent => DisclosureStatus::Absent,
    }
}

fn citations_for(
    evidence_chunk_ids: &[String],
    chunks_by_id: &HashMap<String, &Chunk>,
) -> Vec<Citation> {
    evidence_chunk_ids
        .iter()
        .filter_map(|id| chunks_by_id.get(id))
        .map(|c| Citation {
            document_id: c.document_id,
            chunk_id: c.chunk_id.clone(),
            page_number: c.page_number,
        })
        .collect()
}

/// Assesses one required datapoint: retrieves its context chunks, extracts
/// through `transport`, verifies the result, and returns the assessment plus
/// its diagnostics. `top_k` and `retrieval_query` are supplied by the
/// caller so the same retrieval policy version used elsewhere in the run
/// applies here too.
pub fn assess_datapoint(
    run_id: &str,
    datapoint: &RequiredDatapoint,
    index: &ChunkIndex<'_>,
    top_k: usize,
    transport: &dyn LmTransport,
) -> CoreResult<(DatapointAssessment, ExtractionDiagnostics)> {
    let query = format!("{} {}", datapoint.title, datapoint.disclosure_reference);
    let scored: Vec<ScoredChunk> = retrieve(index.chunks, index.embeddings, &query, None, top_k);
    let zero_score_count = scored.iter().filter(|s| s.combined_score == 0.0).count() as i64;

    let chunks_by_id: HashMap<String, &Chunk> =
        index.chunks.iter().map(|c| (c.chunk_id.clone(), c)).collect();
    let context_chunks: Vec<(String, String)> = scored
        .iter()
        .filter_map(|s| chunks_by_id.get(&s.chunk_id).map(|c| (c.chunk_id.clone(), c.text.clone())))
        .collect();

    let (extraction, prompt_hash) = extract(
        transport,
        &datapoint.title,
        &datapoint.disclosure_reference,
        &datapoint.required_datapoint_id,
        &context_chunks,
    )?;
    let model_name = extraction.model_name.clone();

    let texts = chunk_texts(index.chunks);
    let verified = verify(extraction, &texts, &datapoint.datapoint_type, false);

    let chunk_not_found_in_citation = verified.failure_reason_code.as_ref().is_some_and(|code| {
        matches!(code, crate::verifier::FailureReasonCode::ChunkNotFound)
    });
    let verifier_downgraded = verified.failure_reason_code.is_some();

    let retrieval_params = serde_json::to_value(crate::retrieval::policy::retrieval_params(top_k, None))?;

    let assessment = DatapointAssessment {
        run_id: run_id.to_string(),
        required_datapoint_id: datapoint.required_datapoint_id.clone(),
        status: status_to_disclosure(verified.result.status),
        extracted_value: verified.result.value.clone().map(serde_json::Value::String),
        unit: None,
        citations: citations_for(&verified.result.evidence_chunk_ids, &chunks_by_id),
        verifier_notes: verified.rationale_additions,
        model_name,
        prompt_hash,
        retrieval_params,
    };

    let diagnostics = ExtractionDiagnostics {
        run_id: run_id.to_string(),
        required_datapoint_id: datapoint.required_datapoint_id.clone(),
        chunks_considered: scored.len() as i64,
        chunks_with_zero_retrieval_score: zero_score_count,
        chunk_not_found_in_citation,
        verifier_downgraded,
    };

    Ok((assessment, diagnostics))
}

/// Assesses every required datapoint for a run, in the order supplied.
/// Returns the full assessment and diagnostics sets ready for a wholesale
/// replace into the store.
pub fn assess_all(
    run_id: &str,
    required: &[RequiredDatapoint],
    index: &ChunkIndex<'_>,
    top_k: usize,
    transport: &dyn LmTransport,
) -> CoreResult<(Vec<DatapointAssessment>, Vec<ExtractionDiagnostics>)> {
    let mut assessments = Vec::with_capacity(required.len());
    let mut diagnostics = Vec::with_capacity(required.len());
    for datapoint in required {
        let (assessment, diag) = assess_datapoint(run_id, datapoint, index, top_k, transport)?;
        assessments.push(assessment);
        diagnostics.push(diag);
    }
    Ok((assessments, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::DeterministicAbsentTransport;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            document_id: 1,
            chunk_id: id.to_string(),
            page_number: 1,
            start_offset: 0,
            end_offset: text.len() as i64,
            text: text.to_string(),
            content_tsv: text.to_ascii_lowercase(),
        }
    }

    fn datapoint() -> RequiredDatapoint {
        RequiredDatapoint {
            required_datapoint_id: "dp.1".to_string(),
            title: "Scope 1 emissions".to_string(),
            disclosure_reference: "ESRS E1.6".to_string(),
            datapoint_type: "narrative".to_string(),
            obligation_id: Some("E1".to_string()),
            element_id: Some("E1-6".to_string()),
        }
    }

    #[test]
    fn deterministic_fallback_always_yields_absent_assessment() {
        let chunks = vec![chunk("c1", "Scope 1 emissions were 42 tCO2e in 2026")];
        let embeddings = HashMap::new();
        let index = ChunkIndex { chunks: &chunks, embeddings: &embeddings };
        let transport = DeterministicAbsentTransport;
        let (assessment, diagnostics) =
            assess_datapoint("r1", &datapoint(), &index, 5, &transport).unwrap();
        assert_eq!(assessment.status, DisclosureStatus::Absent);
        assert!(assessment.citations.is_empty());
        assert!(!diagnostics.verifier_downgraded);
    }

    #[test]
    fn assess_all_preserves_datapoint_order() {
        let chunks = vec![chunk("c1", "unrelated text")];
        let embeddings = HashMap::new();
        let index = ChunkIndex { chunks: &chunks, embeddings: &embeddings };
        let transport = DeterministicAbsentTransport;
        let dps = vec![datapoint(), RequiredDatapoint {
            required_datapoint_id: "dp.2".to_string(),
            ..datapoint()
        }];
        let (assessments, diagnostics) = assess_all("r1", &dps, &index, 5, &transport).unwrap();
        assert_eq!(assessments.len(), 2);
        assert_eq!(assessments[0].required_datapoint_id, "dp.1");
        assert_eq!(assessments[1].required_datapoint_id, "dp.2");
        assert_eq!(diagnostics.len(), 2);
    }
}

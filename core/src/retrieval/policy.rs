//! Hybrid lexical+vector retrieval (§4.6), pinned to policy version
//! `hybrid-v1`. Every weight and tie-break here is part of that pinned
//! version string -- changing them means minting a new version, not
//! editing these constants in place.

use crate::entities::{Chunk, Embedding};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const POLICY_VERSION: &str = "hybrid-v1";
pub const LEXICAL_WEIGHT: f64 = 0.6;
pub const VECTOR_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalParams {
    pub policy_version: String,
    pub lexical_weight: f64,
    pub vector_weight: f64,
    pub top_k: usize,
    pub model_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub document_id: i64,
    pub combined_score: f64,
    pub lexical_score: f64,
    pub vector_score: f64,
}

fn round8(value: f64) -> f64 {
    (value * 1e8).round() / 1e8
}

fn lexical_score(query_terms: &[String], chunk_text_lower: &str) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let found = query_terms
        .iter()
        .filter(|term| chunk_text_lower.contains(term.as_str()))
        .count();
    found as f64 / query_terms.len() as f64
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Ranks `chunks` against `query` under the pinned hybrid policy, truncating
/// to `top_k`. `embeddings` and `query_embedding` are both keyed by
/// `model_name`; a chunk with no embedding for that model scores 0 on the
/// vector term.
pub fn retrieve(
    chunks: &[Chunk],
    embeddings: &HashMap<String, Embedding>,
    query: &str,
    query_embedding: Option<&[f64]>,
    top_k: usize,
) -> Vec<ScoredChunk> {
    let query_terms: Vec<String> = query
        .to_ascii_lowercase()
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();

    let mut scored: Vec<ScoredChunk> = chunks
        .iter()
        .map(|chunk| {
            let lexical = round8(lexical_score(&query_terms, &chunk.content_tsv));
            let vector = match (query_embedding, embeddings.get(&chunk.chunk_id)) {
                (Some(q), Some(emb)) => round8(cosine_similarity(q, &emb.vector)),
                _ => 0.0,
            };
            let combined = round8(LEXICAL_WEIGHT * lexical + VECTOR_WEIGHT * vector);
            ScoredChunk {
                chunk_id: chunk.chunk_id.clone(),
                document_id: chunk.document_id,
                combined_score: combined,
                lexical_score: lexical,
                vector_score: vector,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap()
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    scored.truncate(top_k);
    scored
}

pub fn retrieval_params(top_k: usize, model_name: Option<String>) -> RetrievalParams {
    RetrievalParams {
        policy_version: POLICY_VERSION.to_string(),
        lexical_weight: LEXICAL_WEIGHT,
        vector_weight: VECTOR_WEIGHT,
        top_k,
        model_name,
    }
}

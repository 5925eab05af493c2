//! Run hash computation and the result cache keyed by `(tenant_id,
//! run_hash)` (§4.9). `bypass_cache=true` skips this module entirely: the
//! worker must not call `get_or_compute` at all in that case, not just
//! force a miss, so a bypassed run neither reads nor writes a cache row.

use crate::determinism::json_canonical::to_canonical_bytes;
use crate::determinism::run_id::sha256_hex;
use crate::error::CoreResult;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
pub struct RunHashInput {
    pub tenant_id: String,
    pub document_hashes: Vec<String>,
    pub company_profile: serde_json::Value,
    pub materiality_inputs: serde_json::Value,
    pub bundle_version: String,
    pub retrieval_params: serde_json::Value,
    pub prompt_hash: String,
    pub compiler_mode: String,
    pub registry_checksums: Vec<String>,
}

/// Computes the run hash. Inputs are sorted where order is not semantically
/// meaningful (document hashes, registry checksums) before canonicalizing,
/// so the hash is invariant to the order the caller happened to collect
/// them in.
pub fn compute_run_hash(input: &RunHashInput) -> CoreResult<String> {
    let mut sorted = input.clone();
    sorted.document_hashes.sort();
    sorted.registry_checksums.sort();
    Ok(sha256_hex(&to_canonical_bytes(&serde_json::to_value(
        &sorted,
    )?)?))
}

struct CacheEntry {
    run_id: String,
    output_json: serde_json::Value,
}

/// In-memory store for `(tenant_id, run_hash) -> output_json`. `store` is a
/// no-op on a key that already exists, matching the unique-by-key upsert
/// semantics the durable table would enforce.
#[derive(Default)]
pub struct RunCache {
    entries: Mutex<HashMap<(String, String), CacheEntry>>,
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, tenant_id: &str, run_hash: &str) -> Option<serde_json::Value> {
        let guard = self.entries.lock().expect("run cache lock poisoned");
        guard
            .get(&(tenant_id.to_string(), run_hash.to_string()))
            .map(|entry| entry.output_json.clone())
    }

    pub fn store(&self, tenant_id: &str, run_hash: &str, run_id: &str, output_json: serde_json::Value) {
        let mut guard = self.entries.lock().expect("run cache lock poisoned");
        guard
            .entry((tenant_id.to_string(), run_hash.to_string()))
            .or_insert(CacheEntry {
                run_id: run_id.to_string(),
                output_json,
            });
    }

    /// Returns `(output_json, cache_hit)`, computing and storing via
    /// `compute` only on a miss. Callers with `bypass_cache=true` must not
    /// call this at all.
    pub fn get_or_compute<F>(
        &self,
        tenant_id: &str,
        run_hash: &str,
        run_id: &str,
        compute: F,
    ) -> CoreResult<(serde_json::Value, bool)>
    where
        F: FnOnce() -> CoreResult<serde_json::Value>,
    {
        if let Some(cached) = self.lookup(tenant_id, run_hash) {
            return Ok((cached, true));
        }
        let output = compute()?;
        self.store(tenant_id, run_hash, run_id, output.clone());
        Ok((output, false))
    }

    pub fn cached_run_id(&self, tenant_id: &str, run_hash: &str) -> Option<String> {
        let guard = self.entries.lock().expect("run cache lock poisoned");
        guard
            .get(&(tenant_id.to_string(), run_hash.to_string()))
            .map(|e| e.run_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input() -> RunHashInput {
        RunHashInput {
            tenant_id: "t1".to_string(),
            document_hashes: vec!["b".to_string(), "a".to_string()],
            company_profile: serde_json::json!({"employees": 500}),
            materiality_inputs: serde_json::json!({}),
            bundle_version: "2026.01".to_string(),
            retrieval_params: serde_json::json!({"top_k": 5}),
            prompt_hash: "ph1".to_string(),
            compiler_mode: "registry".to_string(),
            registry_checksums: vec!["z".to_string(), "a".to_string()],
        }
    }

    #[test]
    fn run_hash_is_order_invariant_over_document_hashes() {
        let mut a = sample_input();
        let mut b = sample_input();
        b.document_hashes.reverse();
        a.registry_checksums.reverse();
        assert_eq!(compute_run_hash(&a).unwrap(), compute_run_hash(&b).unwrap());
    }

    #[test]
    fn identical_inputs_produce_identical_hash() {
        let hash_a = compute_run_hash(&sample_input()).unwrap();
        let hash_b = compute_run_hash(&sample_input()).unwrap();
        assert_eq!(hash_a, hash_b);
    }

    #[test]
    fn get_or_compute_only_invokes_compute_once_per_key() {
        let cache = RunCache::new();
        let mut calls = 0;
        let (_, hit1) = cache
            .get_or_compute("t1", "h1", "r1", || {
                calls += 1;
                Ok(serde_json::json!({"a": 1}))
            })
            .unwrap();
        assert!(!hit1);

        let (_, hit2) = cache
            .get_or_compute("t1", "h1", "r2", || {
                calls += 1;
                Ok(serde_json::json!({"a": 2}))
            })
            .unwrap();
        assert!(hit2);
        assert_eq!(calls, 1);
    }

    #[test]
    fn store_is_a_no_op_on_repeated_write() {
        let cache = RunCache::new();
        cache.store("t1", "h1", "r1", serde_json::json!({"a": 1}));
        cache.store("t1", "h1", "r2", serde_json::json!({"a": 2}));
        assert_eq!(cache.cached_run_id("t1", "h1").as_deref(), Some("r1"));
    }
}

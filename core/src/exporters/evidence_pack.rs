//! Evidence Pack export (§4.13): a byte-deterministic ZIP of one run's
//! assessments, cited evidence, and cited source document bytes. Every entry
//! uses a fixed 1980-01-01 timestamp and `ZIP_STORED` compression, so two
//! exports of the same run produce byte-identical archives.

use crate::determinism::json_canonical::to_canonical_string;
use crate::determinism::run_id::sha256_hex;
use crate::entities::DatapointAssessment;
use crate::error::{CoreError, CoreResult};
use crate::object_store::ObjectStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Clone, Serialize)]
struct EvidenceLine {
    chunk_id: String,
    document_id: i64,
    page_number: i64,
}

#[derive(Debug, Clone, Serialize)]
struct PackFileEntry {
    path: String,
    sha256: String,
}

#[derive(Debug, Clone, Serialize)]
struct PackManifest {
    run_id: String,
    documents: Vec<String>,
    pack_files: Vec<PackFileEntry>,
}

fn fixed_zip_time() -> zip::DateTime {
    zip::DateTime::from_date_and_time(1980, 1, 1, 0, 0, 0)
        .expect("1980-01-01 00:00:00 is representable in DOS time")
}

/// Builds the Evidence Pack ZIP bytes for one run. `document_hashes` maps
/// every document ID a citation might reference to its SHA-256, so cited
/// bytes can be read back from `object_store` and re-verified by hash.
pub fn build_evidence_pack(
    run_id: &str,
    assessments: &[DatapointAssessment],
    document_hashes: &BTreeMap<i64, String>,
    object_store: &ObjectStore,
) -> CoreResult<Vec<u8>> {
    let mut sorted_assessments = assessments.to_vec();
    sorted_assessments.sort_by(|a, b| a.required_datapoint_id.cmp(&b.required_datapoint_id));

    let mut assessments_jsonl = String::new();
    for a in &sorted_assessments {
        assessments_jsonl.push_str(&to_canonical_string(a)?);
        assessments_jsonl.push('\n');
    }

    let mut evidence_lines: Vec<EvidenceLine> = Vec::new();
    let mut cited_document_ids: Vec<i64> = Vec::new();
    for a in &sorted_assessments {
        for citation in &a.citations {
            evidence_lines.push(EvidenceLine {
                chunk_id: citation.chunk_id.clone(),
                document_id: citation.document_id,
                page_number: citation.page_number,
            });
            cited_document_ids.push(citation.document_id);
        }
    }
    evidence_lines.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
    cited_document_ids.sort();
    cited_document_ids.dedup();

    let mut evidence_jsonl = String::new();
    for line in &evidence_lines {
        evidence_jsonl.push_str(&to_canonical_string(line)?);
        evidence_jsonl.push('\n');
    }

    let mut document_entries: Vec<(String, Vec<u8>)> = Vec::new();
    let mut document_hash_list: Vec<String> = Vec::new();
    for document_id in &cited_document_ids {
        let hash = document_hashes.get(document_id).ok_or_else(|| {
            CoreError::Integrity(format!("no document hash recorded for document {document_id}"))
        })?;
        let bytes = object_store.get(hash)?;
        document_entries.push((format!("documents/{hash}.bin"), bytes));
        document_hash_list.push(hash.clone());
    }
    document_hash_list.sort();
    document_hash_list.dedup();

    let mut pack_files = vec![
        PackFileEntry {
            path: "assessments.jsonl".to_string(),
            sha256: sha256_hex(assessments_jsonl.as_bytes()),
        },
        PackFileEntry {
            path: "evidence.jsonl".to_string(),
            sha256: sha256_hex(evidence_jsonl.as_bytes()),
        },
    ];
    for (path, bytes) in &document_entries {
        pack_files.push(PackFileEntry { path: path.clone(), sha256: sha256_hex(bytes) });
    }
    pack_files.sort_by(|a, b| a.path.cmp(&b.path));

    let manifest = PackManifest {
        run_id: run_id.to_string(),
        documents: document_hash_list,
        pack_files,
    };
    let manifest_json = to_canonical_string(&manifest)?;

    let mut entries: Vec<(String, Vec<u8>)> = vec![
        ("assessments.jsonl".to_string(), assessments_jsonl.into_bytes()),
        ("evidence.jsonl".to_string(), evidence_jsonl.into_bytes()),
        ("manifest.json".to_string(), manifest_json.into_bytes()),
    ];
    entries.extend(document_entries);
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let options = FileOptions::<()>::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(fixed_zip_time())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, bytes) in &entries {
        writer
            .start_file(path, options)
            .map_err(|e| CoreError::Zip(e.to_string()))?;
        writer.write_all(bytes)?;
    }
    writer.set_comment("");
    let cursor = writer.finish().map_err(|e| CoreError::Zip(e.to_string()))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Citation, DisclosureStatus};
    use tempfile::tempdir;

    fn assessment_with_citation() -> DatapointAssessment {
        DatapointAssessment {
            run_id: "r1".to_string(),
            required_datapoint_id: "dp.1".to_string(),
            status: DisclosureStatus::Present,
            extracted_value: Some(serde_json::json!("42")),
            unit: None,
            citations: vec![Citation { document_id: 1, chunk_id: "c1".to_string(), page_number: 1 }],
            verifier_notes: vec![],
            model_name: "deterministic-local-v1".to_string(),
            prompt_hash: "ph1".to_string(),
            retrieval_params: serde_json::json!({}),
        }
    }

    #[test]
    fn repeated_export_is_byte_identical() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let hash = store.put(b"document bytes").unwrap();
        let mut hashes = BTreeMap::new();
        hashes.insert(1, hash.clone());

        let assessments = vec![assessment_with_citation()];
        let first = build_evidence_pack("r1", &assessments, &hashes, &store).unwrap();
        let second = build_evidence_pack("r1", &assessments, &hashes, &store).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_document_hash_is_an_integrity_error() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let assessments = vec![assessment_with_citation()];
        let err = build_evidence_pack("r1", &assessments, &BTreeMap::new(), &store).unwrap_err();
        assert!(matches!(err, CoreError::Integrity(_)));
    }
}

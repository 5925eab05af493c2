//! End-to-end exercise of the run worker against an in-process store: a
//! registry-mode run over one company and one document, through to a
//! persisted manifest and an exported evidence pack.

use compliance_core::config::Settings;
use compliance_core::entities::{
    Chunk, Company, CompanyDocumentLink, Document, DocumentFile, Element, Obligation,
    RegulatoryBundle, RunStatus,
};
use compliance_core::object_store::ObjectStore;
use compliance_core::regulatory::registry::BundleRegistry;
use compliance_core::run_cache::RunCache;
use compliance_core::store::Store;
use compliance_core::worker::{CompilerMode, RunRequest, RunWorker};
use std::collections::BTreeMap;
use std::sync::Arc;

fn bundle() -> RegulatoryBundle {
    RegulatoryBundle {
        bundle_id: "esrs_mini".to_string(),
        regime: "CSRD_ESRS".to_string(),
        jurisdiction: "GLOBAL".to_string(),
        version: "2026.01".to_string(),
        obligations: vec![Obligation {
            obligation_id: "E1".to_string(),
            title: "Climate change".to_string(),
            elements: vec![Element {
                element_id: "E1-6".to_string(),
                title: "Scope 1 emissions".to_string(),
                disclosure_reference: "ESRS E1.6".to_string(),
                datapoint_type: "narrative".to_string(),
                applies_if: None,
                phase_in: None,
            }],
        }],
        overlays: vec![],
    }
}

fn company() -> Company {
    Company {
        id: 1,
        tenant_id: "tenant-a".to_string(),
        name: "Acme Manufacturing".to_string(),
        employees: Some(600),
        turnover: Some(50_000_000.0),
        listed_status: Some(true),
        reporting_year: Some(2026),
        reporting_year_start: None,
        reporting_year_end: None,
        jurisdictions: vec!["EU".to_string()],
        regimes: vec!["CSRD_ESRS".to_string()],
    }
}

fn relaxed_quality_gate() -> Settings {
    std::env::set_var("QUALITY_GATE_MIN_DOCS_DISCOVERED", "1");
    std::env::set_var("QUALITY_GATE_MIN_DOCS_INGESTED", "1");
    std::env::set_var("QUALITY_GATE_MIN_CHUNKS_INDEXED", "1");
    let settings = Settings::from_env().unwrap();
    std::env::remove_var("QUALITY_GATE_MIN_DOCS_DISCOVERED");
    std::env::remove_var("QUALITY_GATE_MIN_DOCS_INGESTED");
    std::env::remove_var("QUALITY_GATE_MIN_CHUNKS_INDEXED");
    settings
}

#[tokio::test]
async fn registry_run_completes_and_exports_an_evidence_pack() {
    let object_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::new());
    let object_store = Arc::new(ObjectStore::new(object_dir.path()));
    let registry = Arc::new(BundleRegistry::new());
    let run_cache = Arc::new(RunCache::new());
    let settings = Arc::new(relaxed_quality_gate());

    let document_bytes = b"Scope 1 emissions were 4200 tCO2e in the 2026 reporting year.";
    let document_hash = object_store.put(document_bytes).unwrap();
    store.put_document(Document {
        id: 1,
        tenant_id: "tenant-a".to_string(),
        company_id: 1,
        filename: "sustainability_report.pdf".to_string(),
        doc_type: None,
        reporting_year: Some(2026),
        source_url: None,
        classification_confidence: None,
    });
    store.put_document_file(DocumentFile {
        document_id: 1,
        sha256_hash: document_hash,
        storage_uri: "file://1".to_string(),
    });
    store.link_company_document(CompanyDocumentLink {
        company_id: 1,
        document_id: 1,
        tenant_id: "tenant-a".to_string(),
    });
    store.replace_chunks(
        1,
        vec![Chunk {
            document_id: 1,
            chunk_id: "c1".to_string(),
            page_number: 1,
            start_offset: 0,
            end_offset: document_bytes.len() as i64,
            text: String::from_utf8(document_bytes.to_vec()).unwrap(),
            content_tsv: "scope 1 emissions were 4200 tco2e in the 2026 reporting year".to_string(),
        }],
    );

    let worker = RunWorker::new(store.clone(), object_store.clone(), registry, run_cache, settings);
    let request = RunRequest {
        tenant_id: "tenant-a".to_string(),
        company: company(),
        llm_provider: "deterministic_fallback".to_string(),
        bypass_cache: true,
        compiler_mode: CompilerMode::Registry,
        bundle_id: "esrs_mini".to_string(),
        bundle_version: "2026.01".to_string(),
        registry_bundles: vec![bundle()],
        legacy_rules: vec![],
        legacy_catalog: vec![],
        retry_failed: false,
    };
    let run = compliance_core::entities::Run {
        id: "run-1".to_string(),
        tenant_id: "tenant-a".to_string(),
        company_id: 1,
        reporting_year: 2026,
        status: RunStatus::Queued,
        run_hash: None,
        bypass_cache: true,
        llm_provider: "deterministic_fallback".to_string(),
        created_at: "2026-01-01T00:00:00Z".to_string(),
        finished_at: None,
        failure_category: None,
        failure_message: None,
    };

    let outcome = worker.execute_run(request, run).await.unwrap();
    assert!(outcome.run.status.is_terminal());
    assert!(outcome.run.finished_at.is_some());

    let assessments = store.assessments_for_run("run-1");
    assert_eq!(assessments.len(), 1);
    assert_eq!(assessments[0].required_datapoint_id, "E1:E1-6");

    let manifest = store.get_manifest("run-1").expect("manifest persisted");
    assert_eq!(manifest.run_id, "run-1");
    assert_eq!(manifest.required_datapoint_count, 1);
    assert_eq!(manifest.regulatory_compiler_version, "company-plan-compiler-v1");
    assert!(manifest.regulatory_plan_json.is_some());

    let mut document_hashes = BTreeMap::new();
    for (id, hash) in [1].into_iter().zip(store.document_hashes(&[1])) {
        document_hashes.insert(id, hash);
    }
    let pack = compliance_core::exporters::build_evidence_pack(
        "run-1",
        &assessments,
        &document_hashes,
        &object_store,
    )
    .unwrap();
    assert!(!pack.is_empty());

    let events = store.events_for_run("run-1");
    let event_types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(event_types.first(), Some(&"run.execution.started"));
    assert!(event_types.contains(&"run.execution.quality_gated"));
}

#[tokio::test]
async fn bundle_id_mismatch_with_registry_produces_no_applicable_obligations() {
    let object_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::new());
    let object_store = Arc::new(ObjectStore::new(object_dir.path()));
    let registry = Arc::new(BundleRegistry::new());
    let run_cache = Arc::new(RunCache::new());
    let settings = Arc::new(relaxed_quality_gate());

    let worker = RunWorker::new(store.clone(), object_store, registry, run_cache, settings);
    let request = RunRequest {
        tenant_id: "tenant-a".to_string(),
        company: Company { regimes: vec!["SEC_CLIMATE".to_string()], ..company() },
        llm_provider: "deterministic_fallback".to_string(),
        bypass_cache: true,
        compiler_mode: CompilerMode::Registry,
        bundle_id: "esrs_mini".to_string(),
        bundle_version: "2026.01".to_string(),
        registry_bundles: vec![bundle()],
        legacy_rules: vec![],
        legacy_catalog: vec![],
        retry_failed: false,
    };
    let run = compliance_core::entities::Run {
        id: "run-2".to_string(),
        tenant_id: "tenant-a".to_string(),
        company_id: 1,
        reporting_year: 2026,
        status: RunStatus::Queued,
        run_hash: None,
        bypass_cache: true,
        llm_provider: "deterministic_fallback".to_string(),
        created_at: "2026-01-01T00:00:00Z".to_string(),
        finished_at: None,
        failure_category: None,
        failure_message: None,
    };

    let outcome = worker.execute_run(request, run).await.unwrap();
    assert_eq!(outcome.run.status, RunStatus::FailedPipeline);
    assert_eq!(outcome.run.failure_category.as_deref(), Some("compiled_plan_empty"));
}

//! In-memory, tenant-scoped persistence for every entity this crate owns
//! (L5). No example in this codebase's lineage reaches for a SQL crate, so
//! rather than fabricate one, state lives in lock-guarded collections keyed
//! the same way a durable table's unique index would be. Every accessor
//! takes `tenant_id` explicitly and filters by it -- there is no "global"
//! read path, matching the tenant-scoping invariant in §3.

use crate::audit::event::{validate_event_taxonomy, RunEvent};
use crate::entities::{
    Chunk, Company, CompanyDocumentLink, DatapointAssessment, Document, DocumentFile,
    DocumentPage, Embedding, ExtractionDiagnostics, Run, RunCacheEntry, RunInputSnapshot,
    RunManifest,
};
use crate::error::CoreResult;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Tables {
    companies: HashMap<i64, Company>,
    documents: HashMap<i64, Document>,
    document_files: HashMap<i64, DocumentFile>,
    document_links: Vec<CompanyDocumentLink>,
    pages: HashMap<i64, Vec<DocumentPage>>,
    chunks: HashMap<i64, Vec<Chunk>>,
    embeddings: HashMap<String, Embedding>,
    runs: HashMap<String, Run>,
    assessments: HashMap<String, Vec<DatapointAssessment>>,
    diagnostics: HashMap<String, Vec<ExtractionDiagnostics>>,
    snapshots: HashMap<String, RunInputSnapshot>,
    manifests: HashMap<String, RunManifest>,
    cache_entries: Vec<RunCacheEntry>,
    events: Vec<RunEvent>,
    next_event_id: i64,
}

/// The whole process's entity state. Cheap to construct; intended to be
/// wrapped in an `Arc` and shared across the worker pool.
#[derive(Default)]
pub struct Store {
    tables: Mutex<Tables>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_company(&self, company: Company) {
        self.tables.lock().unwrap().companies.insert(company.id, company);
    }

    pub fn get_company(&self, tenant_id: &str, company_id: i64) -> Option<Company> {
        self.tables
            .lock()
            .unwrap()
            .companies
            .get(&company_id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
    }

    pub fn put_document(&self, document: Document) {
        self.tables.lock().unwrap().documents.insert(document.id, document);
    }

    pub fn put_document_file(&self, file: DocumentFile) {
        self.tables
            .lock()
            .unwrap()
            .document_files
            .insert(file.document_id, file);
    }

    pub fn link_company_document(&self, link: CompanyDocumentLink) {
        let mut tables = self.tables.lock().unwrap();
        if !tables.document_links.iter().any(|l| {
            l.company_id == link.company_id
                && l.document_id == link.document_id
                && l.tenant_id == link.tenant_id
        }) {
            tables.document_links.push(link);
        }
    }

    /// Every document ID visible to a company within a tenant: documents
    /// uploaded directly against it, plus anything reachable through
    /// `CompanyDocumentLink`.
    pub fn company_document_ids(&self, tenant_id: &str, company_id: i64) -> Vec<i64> {
        let tables = self.tables.lock().unwrap();
        let mut ids: Vec<i64> = tables
            .documents
            .values()
            .filter(|d| d.tenant_id == tenant_id && d.company_id == company_id)
            .map(|d| d.id)
            .collect();
        ids.extend(
            tables
                .document_links
                .iter()
                .filter(|l| l.tenant_id == tenant_id && l.company_id == company_id)
                .map(|l| l.document_id),
        );
        ids.sort();
        ids.dedup();
        ids
    }

    /// Every document ID belonging to a tenant, regardless of company --
    /// used for the smoke test's relaxed (tenant-only) filter.
    pub fn tenant_document_ids(&self, tenant_id: &str) -> Vec<i64> {
        let tables = self.tables.lock().unwrap();
        let mut ids: Vec<i64> = tables
            .documents
            .values()
            .filter(|d| d.tenant_id == tenant_id)
            .map(|d| d.id)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn document_hashes(&self, document_ids: &[i64]) -> Vec<String> {
        let tables = self.tables.lock().unwrap();
        let mut hashes: Vec<String> = document_ids
            .iter()
            .filter_map(|id| tables.document_files.get(id))
            .map(|f| f.sha256_hash.clone())
            .collect();
        hashes.sort();
        hashes.dedup();
        hashes
    }

    pub fn replace_pages(&self, document_id: i64, pages: Vec<DocumentPage>) {
        self.tables.lock().unwrap().pages.insert(document_id, pages);
    }

    pub fn pages_for_document(&self, document_id: i64) -> Vec<DocumentPage> {
        self.tables
            .lock()
            .unwrap()
            .pages
            .get(&document_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Replaces all chunks for a document atomically, matching the
    /// "replace wholesale, reapplication is a no-op" persistence contract.
    pub fn replace_chunks(&self, document_id: i64, chunks: Vec<Chunk>) {
        self.tables.lock().unwrap().chunks.insert(document_id, chunks);
    }

    pub fn chunks_for_documents(&self, document_ids: &[i64]) -> Vec<Chunk> {
        let tables = self.tables.lock().unwrap();
        let mut out = Vec::new();
        for id in document_ids {
            if let Some(chunks) = tables.chunks.get(id) {
                out.extend(chunks.iter().cloned());
            }
        }
        out
    }

    pub fn put_embedding(&self, embedding: Embedding) {
        self.tables
            .lock()
            .unwrap()
            .embeddings
            .insert(embedding.chunk_id.clone(), embedding);
    }

    pub fn embeddings_by_chunk_id(&self) -> HashMap<String, Embedding> {
        self.tables.lock().unwrap().embeddings.clone()
    }

    pub fn put_run(&self, run: Run) {
        self.tables.lock().unwrap().runs.insert(run.id.clone(), run);
    }

    pub fn get_run(&self, run_id: &str) -> Option<Run> {
        self.tables.lock().unwrap().runs.get(run_id).cloned()
    }

    /// Deletes and reinserts every assessment for a run atomically, the
    /// idempotence guarantee a rerun depends on.
    pub fn replace_assessments(&self, run_id: &str, assessments: Vec<DatapointAssessment>) {
        self.tables
            .lock()
            .unwrap()
            .assessments
            .insert(run_id.to_string(), assessments);
    }

    pub fn assessments_for_run(&self, run_id: &str) -> Vec<DatapointAssessment> {
        self.tables
            .lock()
            .unwrap()
            .assessments
            .get(run_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn replace_diagnostics(&self, run_id: &str, diagnostics: Vec<ExtractionDiagnostics>) {
        self.tables
            .lock()
            .unwrap()
            .diagnostics
            .insert(run_id.to_string(), diagnostics);
    }

    pub fn diagnostics_for_run(&self, run_id: &str) -> Vec<ExtractionDiagnostics> {
        self.tables
            .lock()
            .unwrap()
            .diagnostics
            .get(run_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Idempotent by `(run_id, tenant_id)`: a second write for the same key
    /// returns the existing row unchanged.
    pub fn put_snapshot_if_absent(&self, snapshot: RunInputSnapshot) -> RunInputSnapshot {
        let mut tables = self.tables.lock().unwrap();
        tables
            .snapshots
            .entry(snapshot.run_id.clone())
            .or_insert(snapshot)
            .clone()
    }

    pub fn upsert_manifest(&self, manifest: RunManifest) {
        self.tables
            .lock()
            .unwrap()
            .manifests
            .insert(manifest.run_id.clone(), manifest);
    }

    pub fn get_manifest(&self, run_id: &str) -> Option<RunManifest> {
        self.tables.lock().unwrap().manifests.get(run_id).cloned()
    }

    /// Unique by `(tenant_id, run_hash)`; a repeated write is a no-op.
    pub fn store_cache_entry_if_absent(&self, entry: RunCacheEntry) {
        let mut tables = self.tables.lock().unwrap();
        let exists = tables
            .cache_entries
            .iter()
            .any(|e| e.tenant_id == entry.tenant_id && e.run_hash == entry.run_hash);
        if !exists {
            tables.cache_entries.push(entry);
        }
    }

    /// Appends one event to a run's journal. Rejects an unknown `event_type`
    /// or a payload missing its required keys (§3 RunEvent) before the row
    /// is ever written, so the journal can never contain a malformed entry.
    pub fn append_event(
        &self,
        run_id: &str,
        tenant_id: &str,
        created_at: &str,
        event_type: &str,
        payload: serde_json::Value,
    ) -> CoreResult<RunEvent> {
        validate_event_taxonomy(event_type, &payload)?;
        let mut tables = self.tables.lock().unwrap();
        tables.next_event_id += 1;
        let event = RunEvent {
            id: tables.next_event_id,
            run_id: run_id.to_string(),
            tenant_id: tenant_id.to_string(),
            created_at: created_at.to_string(),
            event_type: event_type.to_string(),
            payload,
        };
        tables.events.push(event.clone());
        Ok(event)
    }

    /// Every event for a run, in append order (already `(created_at, id)`
    /// ordered since events are only ever appended, never reordered).
    pub fn events_for_run(&self, run_id: &str) -> Vec<RunEvent> {
        self.tables
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_document_ids_includes_direct_and_linked_documents() {
        let store = Store::new();
        store.put_document(Document {
            id: 1,
            tenant_id: "t1".to_string(),
            company_id: 10,
            filename: "a.pdf".to_string(),
            doc_type: None,
            reporting_year: None,
            source_url: None,
            classification_confidence: None,
        });
        store.put_document(Document {
            id: 2,
            tenant_id: "t1".to_string(),
            company_id: 99,
            filename: "b.pdf".to_string(),
            doc_type: None,
            reporting_year: None,
            source_url: None,
            classification_confidence: None,
        });
        store.link_company_document(CompanyDocumentLink {
            company_id: 10,
            document_id: 2,
            tenant_id: "t1".to_string(),
        });

        let ids = store.company_document_ids("t1", 10);
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn snapshot_write_is_idempotent_per_run() {
        let store = Store::new();
        let first = store.put_snapshot_if_absent(RunInputSnapshot {
            run_id: "r1".to_string(),
            tenant_id: "t1".to_string(),
            payload: serde_json::json!({"v": 1}),
            checksum: "c1".to_string(),
        });
        let second = store.put_snapshot_if_absent(RunInputSnapshot {
            run_id: "r1".to_string(),
            tenant_id: "t1".to_string(),
            payload: serde_json::json!({"v": 2}),
            checksum: "c2".to_string(),
        });
        assert_eq!(first.checksum, second.checksum);
        assert_eq!(second.checksum, "c1");
    }

    #[test]
    fn append_event_rejects_unknown_event_type() {
        let store = Store::new();
        let err = store
            .append_event("r1", "t1", "2026-01-01T00:00:00Z", "made.up.event", serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, crate::error::CoreError::InvalidInput(_)));
    }

    #[test]
    fn events_for_run_are_returned_in_append_order() {
        let store = Store::new();
        store
            .append_event(
                "r1",
                "t1",
                "2026-01-01T00:00:00Z",
                "run.state_changed",
                serde_json::json!({"from_status": "queued", "to_status": "running"}),
            )
            .unwrap();
        store
            .append_event(
                "r1",
                "t1",
                "2026-01-01T00:00:01Z",
                "run.state_changed",
                serde_json::json!({"from_status": "running", "to_status": "succeeded"}),
            )
            .unwrap();
        let events = store.events_for_run("r1");
        assert_eq!(events.len(), 2);
        assert!(events[0].id < events[1].id);
    }

    #[test]
    fn cross_tenant_company_lookup_returns_none() {
        let store = Store::new();
        store.put_company(Company {
            id: 1,
            tenant_id: "t1".to_string(),
            name: "Acme".to_string(),
            employees: None,
            turnover: None,
            listed_status: None,
            reporting_year: None,
            reporting_year_start: None,
            reporting_year_end: None,
            jurisdictions: vec![],
            regimes: vec![],
        });
        assert!(store.get_company("t2", 1).is_none());
    }
}

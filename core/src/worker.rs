//! Run Worker + state machine (§4.12): advances one run at a time through
//! `queued -> running -> {completed, completed_with_warnings,
//! degraded_no_evidence, failed_pipeline}`, running the ordered pipeline
//! steps sequentially and appending a `RunEvent` before every status change.

use crate::assessment_pipeline::{assess_all, ChunkIndex};
use crate::audit::log::log_run_event;
use crate::config::Settings;
use crate::entities::{
    Company, CompanyProfile, RegulatoryBundle, RequiredDatapoint, Run, RunStatus,
};
use crate::error::{classify_failure, CoreError, CoreResult};
use crate::exporters::manifest::{build_manifest, RegulatoryProvenance};
use crate::exporters::snapshot::{build_snapshot_payload, snapshot_checksum, SnapshotInputs};
use crate::llm::{is_configured_provider, DeterministicAbsentTransport, LmTransport};
use crate::object_store::ObjectStore;
use crate::quality_gate::{self, QualityGateMetrics};
use crate::regulatory::applicability::{resolve_required_datapoint_ids_legacy, LegacyApplicabilityRule};
use crate::regulatory::compiler::compile_company_regulatory_plan;
use crate::regulatory::registry::BundleRegistry;
use crate::retrieval::policy::retrieval_params;
use crate::retrieval::smoke_test::{build_probe_query, run_smoke_test};
use crate::run_cache::{compute_run_hash, RunCache, RunHashInput};
use crate::store::Store;
use std::sync::Arc;

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .expect("RFC3339 formatting of the current time never fails")
}

/// A catalog entry backing the legacy (registry-free) applicability path:
/// the human-facing fields a compiled registry element would otherwise
/// supply for the same required datapoint.
#[derive(Debug, Clone)]
pub struct LegacyDatapointDefinition {
    pub required_datapoint_id: String,
    pub title: String,
    pub disclosure_reference: String,
    pub datapoint_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerMode {
    Registry,
    Legacy,
}

impl CompilerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CompilerMode::Registry => "registry",
            CompilerMode::Legacy => "legacy",
        }
    }
}

/// The inputs one `/execute` request carries. Not persisted as-is: its
/// canonical JSON becomes the Run Input Snapshot.
pub struct RunRequest {
    pub tenant_id: String,
    pub company: Company,
    pub llm_provider: String,
    pub bypass_cache: bool,
    pub compiler_mode: CompilerMode,
    pub bundle_id: String,
    pub bundle_version: String,
    pub registry_bundles: Vec<RegulatoryBundle>,
    pub legacy_rules: Vec<LegacyApplicabilityRule>,
    pub legacy_catalog: Vec<LegacyDatapointDefinition>,
    /// Required to re-execute a run whose current status is
    /// `failed_pipeline`; ignored otherwise. §4.12's concurrency guard.
    pub retry_failed: bool,
}

/// Outcome of one `execute_run` call: the final `Run` row plus whether the
/// assessments came from a fresh computation or a run-hash cache hit.
pub struct RunOutcome {
    pub run: Run,
    pub cache_hit: bool,
}

pub struct RunWorker {
    store: Arc<Store>,
    object_store: Arc<ObjectStore>,
    registry: Arc<BundleRegistry>,
    run_cache: Arc<RunCache>,
    settings: Arc<Settings>,
}

fn legacy_required_datapoints(
    ids: &[String],
    catalog: &[LegacyDatapointDefinition],
) -> Vec<RequiredDatapoint> {
    ids.iter()
        .filter_map(|id| catalog.iter().find(|d| &d.required_datapoint_id == id))
        .map(|d| RequiredDatapoint {
            required_datapoint_id: d.required_datapoint_id.clone(),
            title: d.title.clone(),
            disclosure_reference: d.disclosure_reference.clone(),
            datapoint_type: d.datapoint_type.clone(),
            obligation_id: None,
            element_id: None,
        })
        .collect()
}

fn registry_required_datapoints(plan: &crate::entities::CompiledPlan) -> Vec<RequiredDatapoint> {
    let mut out = Vec::new();
    for obligation in &plan.obligations {
        for element in &obligation.elements {
            out.push(RequiredDatapoint {
                required_datapoint_id: format!("{}:{}", obligation.obligation_id, element.element_id),
                title: element.title.clone(),
                disclosure_reference: element.disclosure_reference.clone(),
                datapoint_type: element.datapoint_type.clone(),
                obligation_id: Some(obligation.obligation_id.clone()),
                element_id: Some(element.element_id.clone()),
            });
        }
    }
    out.sort_by(|a, b| a.required_datapoint_id.cmp(&b.required_datapoint_id));
    out
}

impl RunWorker {
    pub fn new(
        store: Arc<Store>,
        object_store: Arc<ObjectStore>,
        registry: Arc<BundleRegistry>,
        run_cache: Arc<RunCache>,
        settings: Arc<Settings>,
    ) -> Self {
        Self { store, object_store, registry, run_cache, settings }
    }

    fn emit(&self, run_id: &str, tenant_id: &str, event_type: &str, payload: serde_json::Value) -> CoreResult<()> {
        let event = self.store.append_event(run_id, tenant_id, &now_rfc3339(), event_type, payload)?;
        log_run_event(&event);
        Ok(())
    }

    fn set_status(&self, run_id: &str, tenant_id: &str, run: &mut Run, new_status: RunStatus) -> CoreResult<()> {
        let from = run.status.as_str();
        run.status = new_status;
        self.emit(
            run_id,
            tenant_id,
            "run.state_changed",
            serde_json::json!({"from_status": from, "to_status": new_status.as_str()}),
        )?;
        self.store.put_run(run.clone());
        Ok(())
    }

    /// Step 1: builds the extraction transport. A real `local_lm_studio` or
    /// `openai_cloud` provider would plug in here; until one is wired up,
    /// every provider name -- configured or not -- routes to the
    /// deterministic fallback, so a run never blocks on a missing network
    /// dependency.
    fn select_transport(&self, llm_provider: &str) -> Box<dyn LmTransport> {
        let _ = is_configured_provider(llm_provider);
        Box::new(DeterministicAbsentTransport)
    }

    /// Runs the full ordered pipeline for one already-queued `Run`. Any
    /// error raised during steps 1-9 is classified and turned into a
    /// `failed_pipeline` terminal status rather than propagated.
    ///
    /// §4.12's concurrency guard: only one worker may advance a given run.
    /// `/execute` on a run already `running` or `queued` is a no-op
    /// returning the current status; on `failed_pipeline` it is rejected
    /// unless `request.retry_failed` is set.
    pub async fn execute_run(&self, request: RunRequest, mut run: Run) -> CoreResult<RunOutcome> {
        match run.status {
            RunStatus::Running | RunStatus::Queued => {
                return Ok(RunOutcome { run, cache_hit: false });
            }
            RunStatus::FailedPipeline if !request.retry_failed => {
                return Err(CoreError::InvalidInput(format!(
                    "run {} is failed_pipeline; retry_failed must be set to re-execute",
                    run.id
                )));
            }
            _ => {}
        }

        let run_id = run.id.clone();
        let tenant_id = request.tenant_id.clone();

        self.emit(
            &run_id,
            &tenant_id,
            "run.execution.started",
            serde_json::json!({
                "tenant_id": tenant_id,
                "bundle_id": request.bundle_id,
                "bundle_version": request.bundle_version,
                "llm_provider": request.llm_provider,
                "research_provider": "none",
                "bypass_cache": request.bypass_cache,
            }),
        )?;
        self.set_status(&run_id, &tenant_id, &mut run, RunStatus::Running)?;

        match self.run_pipeline(&request, &run).await {
            Ok((final_status, assessment_count)) => {
                self.set_status(&run_id, &tenant_id, &mut run, final_status)?;
                run.finished_at = Some(now_rfc3339());
                self.store.put_run(run.clone());
                self.emit(
                    &run_id,
                    &tenant_id,
                    "run.execution.completed",
                    serde_json::json!({
                        "tenant_id": tenant_id,
                        "assessment_count": assessment_count,
                        "final_status": final_status.as_str(),
                    }),
                )?;
                Ok(RunOutcome { run, cache_hit: false })
            }
            Err(err) => {
                let (category, retryable) = classify_failure(&err);
                run.failure_category = Some(category.as_str().to_string());
                run.failure_message = Some(err.to_string());
                self.set_status(&run_id, &tenant_id, &mut run, RunStatus::FailedPipeline)?;
                run.finished_at = Some(now_rfc3339());
                self.store.put_run(run.clone());
                self.emit(
                    &run_id,
                    &tenant_id,
                    "run.execution.failed",
                    serde_json::json!({
                        "tenant_id": tenant_id,
                        "failure_category": category.as_str(),
                        "retryable": retryable,
                    }),
                )?;
                Ok(RunOutcome { run, cache_hit: false })
            }
        }
    }

    async fn run_pipeline(&self, request: &RunRequest, run: &Run) -> CoreResult<(RunStatus, usize)> {
        let run_id = &run.id;
        let tenant_id = &request.tenant_id;

        // Step 1: extraction transport (deterministic fallback unless a real provider is configured).
        let transport = self.select_transport(&request.llm_provider);

        // Step 2: company, materiality, document universe.
        self.store.put_company(request.company.clone());
        let profile = CompanyProfile::from(&request.company);
        let document_ids = self.store.company_document_ids(tenant_id, request.company.id);
        let document_hashes = self.store.document_hashes(&document_ids);

        // Step 3: retrieval params + prompt hash input material.
        let registry_checksums: Vec<String> = self
            .registry
            .list_bundles()
            .iter()
            .map(|b| format!("{}:{}", b.bundle_id, b.version))
            .collect();
        let params = retrieval_params(self.settings.retrieval_smoke_top_k as usize, None);

        // Step 4: compile the regulatory plan (registry mode only).
        let generated_at = now_rfc3339();
        let (plan_hash, plan_json, registry_version, required) = match request.compiler_mode {
            CompilerMode::Registry => {
                let plan = compile_company_regulatory_plan(
                    &request.registry_bundles,
                    &profile,
                    &request.company.regimes,
                    &request.company.jurisdictions,
                    &generated_at,
                )?;
                if plan.obligations.is_empty() {
                    return Err(CoreError::Integrity(
                        "compiled_obligations_empty_for_csrd_entity".to_string(),
                    ));
                }
                let required = registry_required_datapoints(&plan);
                let plan_json = serde_json::to_value(&plan)?;
                (
                    Some(plan.plan_hash),
                    Some(plan_json),
                    Some(request.bundle_version.clone()),
                    required,
                )
            }
            CompilerMode::Legacy => {
                // Step 5 (legacy path): resolve required datapoint IDs then
                // look up each one's display fields from the catalog.
                let ids = resolve_required_datapoint_ids_legacy(&request.legacy_rules, &profile)?;
                (None, None, None, legacy_required_datapoints(&ids, &request.legacy_catalog))
            }
        };

        // Step 6: retrieval smoke test + snapshot.
        let chunks = self.store.chunks_for_documents(&document_ids);
        let tenant_document_ids = self.store.tenant_document_ids(tenant_id);
        let relaxed_chunks = self.store.chunks_for_documents(&tenant_document_ids);
        let embeddings = self.store.embeddings_by_chunk_id();
        let probe_query = build_probe_query(&required, &request.company);
        let smoke = run_smoke_test(
            &probe_query,
            &chunks,
            &relaxed_chunks,
            &embeddings,
            self.settings.retrieval_smoke_top_k as usize,
            self.settings.retrieval_smoke_auto_relax_filters,
        );
        if let Some(diagnostic) = &smoke.diagnostic {
            self.emit(
                run_id,
                tenant_id,
                "run.execution.retrieval_smoke_test",
                serde_json::json!({
                    "tenant_id": tenant_id,
                    "diagnostic": diagnostic,
                    "company_filter_relaxed": smoke.company_filter_relaxed,
                }),
            )?;
        }

        // When the smoke test found the strict (tenant+company) filter too
        // narrow and auto-relaxation is enabled, retrieval for the rest of
        // the run uses the relaxed (tenant-only) chunk set instead.
        let effective_chunks = if smoke.company_filter_relaxed { &relaxed_chunks } else { &chunks };

        let snapshot_inputs = SnapshotInputs {
            run_id: run_id.clone(),
            tenant_id: tenant_id.clone(),
            company_id: request.company.id,
            company_profile: profile.to_json(),
            materiality_inputs: serde_json::json!({
                "regimes": request.company.regimes,
                "jurisdictions": request.company.jurisdictions,
            }),
            bundle_id: request.bundle_id.clone(),
            bundle_version: request.bundle_version.clone(),
            compiler_mode: request.compiler_mode.as_str().to_string(),
            retrieval: serde_json::to_value(&params)?,
            required_datapoint_universe: serde_json::to_value(&required)?,
            discovery_candidates: tenant_document_ids.clone(),
            selected_documents: document_ids.clone(),
            retrieval_smoke_test: serde_json::json!({
                "diagnostic": smoke.diagnostic,
                "strict_result_count": smoke.strict_result_count,
                "relaxed_result_count": smoke.relaxed_result_count,
            }),
        };
        let checksum = snapshot_checksum(&snapshot_inputs)?;
        let payload = build_snapshot_payload(&snapshot_inputs)?;
        self.store.put_snapshot_if_absent(crate::entities::RunInputSnapshot {
            run_id: run_id.clone(),
            tenant_id: tenant_id.clone(),
            payload,
            checksum,
        });

        // Step 7: run hash + cache.
        let run_hash_input = RunHashInput {
            tenant_id: tenant_id.clone(),
            document_hashes: document_hashes.clone(),
            company_profile: profile.to_json(),
            materiality_inputs: serde_json::json!({
                "regimes": request.company.regimes,
                "jurisdictions": request.company.jurisdictions,
            }),
            bundle_version: request.bundle_version.clone(),
            retrieval_params: serde_json::to_value(&params)?,
            prompt_hash: crate::llm::prompt_template_hash(),
            compiler_mode: request.compiler_mode.as_str().to_string(),
            registry_checksums,
        };
        let run_hash = compute_run_hash(&run_hash_input)?;

        let index = ChunkIndex { chunks: effective_chunks, embeddings: &embeddings };
        let (assessments, diagnostics, cache_hit) = if request.bypass_cache {
            let (a, d) = assess_all(run_id, &required, &index, params.top_k, transport.as_ref())?;
            (a, d, false)
        } else if let Some(cached_id) = self.run_cache.cached_run_id(tenant_id, &run_hash) {
            let cached_assessments = self.store.assessments_for_run(&cached_id);
            let cached_diagnostics = self.store.diagnostics_for_run(&cached_id);
            (cached_assessments, cached_diagnostics, true)
        } else {
            let (a, d) = assess_all(run_id, &required, &index, params.top_k, transport.as_ref())?;
            self.run_cache.store(tenant_id, &run_hash, run_id, serde_json::json!({"assessed": true}));
            (a, d, false)
        };

        self.store.replace_assessments(run_id, assessments.clone());
        self.store.replace_diagnostics(run_id, diagnostics.clone());

        // Step 9: integrity warnings + quality gate.
        let downgraded_count = diagnostics.iter().filter(|d| d.verifier_downgraded).count();
        let chunk_not_found_count = diagnostics.iter().filter(|d| d.chunk_not_found_in_citation).count();
        let total = diagnostics.len().max(1);
        if (downgraded_count as f64 / total as f64) > self.settings.integrity_warning_failure_threshold {
            self.emit(
                run_id,
                tenant_id,
                "run.execution.integrity_warning",
                serde_json::json!({
                    "tenant_id": tenant_id,
                    "failure_count": downgraded_count,
                    "diagnostics_count": diagnostics.len(),
                }),
            )?;
        }

        let present_count = assessments
            .iter()
            .filter(|a| a.status == crate::entities::DisclosureStatus::Present)
            .count();
        let metrics = QualityGateMetrics {
            docs_discovered: tenant_document_ids.len() as i64,
            docs_ingested: document_ids.len() as i64,
            chunks_indexed: effective_chunks.len() as i64,
            chunk_not_found_count: chunk_not_found_count as i64,
            chunk_not_found_rate: chunk_not_found_count as f64 / total as f64,
            required_narrative_chunk_not_found: chunk_not_found_count > 0,
            evidence_hits_total: present_count as i64,
            min_evidence_hits_per_required_section: present_count as i64,
        };
        let decision = quality_gate::evaluate(&metrics, &self.settings.quality_gate);
        self.emit(
            run_id,
            tenant_id,
            "run.execution.quality_gated",
            serde_json::json!({
                "tenant_id": tenant_id,
                "decision": decision.status.as_str(),
                "metrics": serde_json::to_value(&metrics)?,
            }),
        )?;

        let final_status = match decision.status {
            crate::quality_gate::GateStatus::Completed => RunStatus::Completed,
            crate::quality_gate::GateStatus::CompletedWithWarnings => RunStatus::CompletedWithWarnings,
            crate::quality_gate::GateStatus::DegradedNoEvidence => RunStatus::DegradedNoEvidence,
            crate::quality_gate::GateStatus::FailedPipeline => RunStatus::FailedPipeline,
        };

        let manifest = build_manifest(
            run_id,
            tenant_id,
            request.company.id,
            request.company.reporting_year.unwrap_or_default(),
            final_status.as_str(),
            &run_hash,
            plan_hash,
            serde_json::to_value(&params)?,
            RegulatoryProvenance {
                regulatory_plan_json: plan_json,
                regulatory_registry_version: registry_version,
                regulatory_compiler_version: crate::regulatory::COMPILER_VERSION.to_string(),
                report_template_version: crate::exporters::REPORT_TEMPLATE_VERSION.to_string(),
                git_sha: self.settings.git_sha.clone(),
            },
            document_ids,
            document_hashes,
            &assessments,
            &decision,
            &now_rfc3339(),
        )?;
        self.store.upsert_manifest(manifest);

        let _ = cache_hit;
        Ok((final_status, assessments.len()))
    }
}

pub mod assessment;
pub mod bundle;
pub mod company;
pub mod document;
pub mod manifest;
pub mod run;

pub use assessment::{Citation, DatapointAssessment, DisclosureStatus, ExtractionDiagnostics};
pub use bundle::{
    CompiledElement, CompiledObligation, CompiledPlan, Element, ExcludedObligation,
    ObligationCoverage, Obligation, Overlay, PhaseInRule, RegulatoryBundle, RequiredDatapoint,
};
pub use company::{Company, CompanyProfile};
pub use document::{
    Chunk, ClassificationConfidence, CompanyDocumentLink, Document, DocumentFile, DocumentPage,
    Embedding,
};
pub use manifest::{RunCacheEntry, RunInputSnapshot, RunManifest};
pub use run::{Run, RunMateriality, RunStatus};

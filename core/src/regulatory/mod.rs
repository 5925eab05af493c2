pub mod applicability;
pub mod compiler;
pub mod registry;
pub mod safe_eval;

pub use applicability::resolve_required_datapoint_ids_legacy;
pub use compiler::{compile_bundle, compile_company_regulatory_plan, COMPILER_VERSION};
pub use registry::{BundleRegistry, SyncMode};

pub mod evidence_pack;
pub mod manifest;
pub mod snapshot;

pub use evidence_pack::build_evidence_pack;
pub use manifest::{aggregate_prompt_hash, build_manifest, RegulatoryProvenance, REPORT_TEMPLATE_VERSION};
pub use snapshot::{build_snapshot_payload, snapshot_checksum, SnapshotInputs};

pub mod policy;

pub use policy::{retrieval_params, retrieve, RetrievalParams, ScoredChunk};
pub use smoke_test::{build_probe_query, run_smoke_test, SmokeTestResult};

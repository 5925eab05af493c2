pub mod client;
pub mod deterministic;

pub use client::{
    extract, build_prompt, prompt_hash, prompt_template_hash, ExtractionResult, ExtractionStatus,
    LmTransport, PROMPT_TEMPLATE_VERSION,
};
pub use deterministic::{is_configured_provider, DeterministicAbsentTransport, DETERMINISTIC_MODEL_NAME};

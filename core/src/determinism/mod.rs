pub mod json_canonical;
pub mod run_id;

pub use json_canonical::{to_canonical_bytes, to_canonical_string};
pub use run_id::{new_run_ulid, sha256_hex};

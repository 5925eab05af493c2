use sha2::{Digest, Sha256};
use ulid::Ulid;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// Opaque, sortable run identifier for newly queued runs. Not part of any
/// determinism invariant -- the run's reproducibility comes from the run
/// hash (§4.9), not from this identifier.
pub fn new_run_ulid() -> String {
    Ulid::new().to_string()
}

//! Content-addressed byte storage keyed by SHA-256 (L2). `put` is
//! write-if-absent: a hash once written is never overwritten, even if the
//! caller supplies different bytes under the same key -- that case is a
//! fatal integrity error, not a silent merge.

use crate::determinism::run_id::sha256_hex;
use crate::error::{CoreError, CoreResult};
use std::fs;
use std::path::{Path, PathBuf};

pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        self.root.join(&hash[0..2]).join(format!("{hash}.bin"))
    }

    /// Stores `bytes` under their own SHA-256 hash, returning the hash.
    /// A second `put` of identical bytes is a no-op; a second `put` of
    /// different bytes under the same (already-computed) hash cannot
    /// happen since the hash is derived from the bytes themselves --
    /// the only way to hit the "hash present, bytes differ" case is
    /// filesystem corruption, caught here as `CoreError::Integrity`.
    pub fn put(&self, bytes: &[u8]) -> CoreResult<String> {
        let hash = sha256_hex(bytes);
        let path = self.path_for(&hash);
        if path.exists() {
            let existing = fs::read(&path)?;
            if existing != bytes {
                return Err(CoreError::Integrity(format!(
                    "object store hash collision at {hash}: stored bytes differ from new bytes"
                )));
            }
            return Ok(hash);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(hash)
    }

    /// Reads back the bytes for `hash`, re-verifying the hash matches the
    /// content actually on disk before returning it.
    pub fn get(&self, hash: &str) -> CoreResult<Vec<u8>> {
        let path = self.path_for(hash);
        let bytes = fs::read(&path).map_err(|e| {
            CoreError::Integrity(format!("object store missing object {hash}: {e}"))
        })?;
        let actual = sha256_hex(&bytes);
        if actual != hash {
            return Err(CoreError::Integrity(format!(
                "object store readback mismatch: requested {hash}, stored bytes hash to {actual}"
            )));
        }
        Ok(bytes)
    }

    pub fn storage_uri(&self, hash: &str) -> String {
        self.path_for(hash).to_string_lossy().into_owned()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_then_get_round_trips_bytes() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let hash = store.put(b"hello world").unwrap();
        assert_eq!(store.get(&hash).unwrap(), b"hello world");
    }

    #[test]
    fn put_is_idempotent_for_identical_bytes() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let hash_a = store.put(b"same bytes").unwrap();
        let hash_b = store.put(b"same bytes").unwrap();
        assert_eq!(hash_a, hash_b);
    }

    #[test]
    fn get_detects_tampered_bytes_on_disk() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let hash = store.put(b"original").unwrap();
        fs::write(store.path_for(&hash), b"tampered!!").unwrap();
        let err = store.get(&hash).unwrap_err();
        assert!(matches!(err, CoreError::Integrity(_)));
    }

    #[test]
    fn path_layout_uses_first_two_hash_chars_as_shard() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        let hash = store.put(b"x").unwrap();
        let uri = store.storage_uri(&hash);
        assert!(uri.contains(&hash[0..2]));
        assert!(uri.ends_with(&format!("{hash}.bin")));
    }
}

//! In-memory regulatory bundle registry: idempotent upsert keyed by
//! `(bundle_id, version)`, content-checksummed so a re-sync of an unchanged
//! bundle is a no-op.

use crate::determinism::json_canonical::to_canonical_bytes;
use crate::determinism::run_id::sha256_hex;
use crate::entities::RegulatoryBundle;
use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

fn bundle_checksum(bundle: &RegulatoryBundle) -> CoreResult<String> {
    Ok(sha256_hex(&to_canonical_bytes(&serde_json::to_value(
        bundle,
    )?)?))
}

/// How `sync_from_filesystem` treats bundles present in the registry but
/// absent from the scanned directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Upsert what's found; leave everything else untouched.
    Merge,
    /// Upsert what's found, then deactivate every bundle not found.
    Sync,
}

struct StoredBundle {
    bundle: RegulatoryBundle,
    checksum: String,
    active: bool,
}

/// Holds every known version of every bundle, keyed by `(bundle_id,
/// version)`. Safe to share across the tokio worker pool: all access goes
/// through a single mutex, matched to this crate's expected concurrency
/// (few bundles, infrequent writes, many concurrent reads during plan
/// compilation).
pub struct BundleRegistry {
    bundles: Mutex<BTreeMap<(String, String), StoredBundle>>,
}

impl Default for BundleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BundleRegistry {
    pub fn new() -> Self {
        Self {
            bundles: Mutex::new(BTreeMap::new()),
        }
    }

    /// Stores or updates a bundle by `(bundle_id, version)`. Returns `true`
    /// if the stored content changed (a fresh insert, a payload difference,
    /// or a previously deactivated bundle reappearing), `false` if the
    /// bundle was already present, active, and identical.
    pub fn upsert_bundle(&self, bundle: RegulatoryBundle) -> CoreResult<bool> {
        let checksum = bundle_checksum(&bundle)?;
        let key = (bundle.bundle_id.clone(), bundle.version.clone());
        let mut guard = self.bundles.lock().expect("bundle registry lock poisoned");
        if let Some(existing) = guard.get(&key) {
            if existing.checksum == checksum && existing.active {
                return Ok(false);
            }
        }
        guard.insert(
            key,
            StoredBundle { bundle, checksum, active: true },
        );
        Ok(true)
    }

    pub fn get_bundle(&self, bundle_id: &str, version: &str) -> Option<RegulatoryBundle> {
        let guard = self.bundles.lock().expect("bundle registry lock poisoned");
        guard
            .get(&(bundle_id.to_string(), version.to_string()))
            .map(|stored| stored.bundle.clone())
    }

    /// All active stored bundles, sorted by `(bundle_id, version)` for
    /// deterministic iteration order. Deactivated bundles are excluded.
    pub fn list_bundles(&self) -> Vec<RegulatoryBundle> {
        let guard = self.bundles.lock().expect("bundle registry lock poisoned");
        guard
            .values()
            .filter(|stored| stored.active)
            .map(|stored| stored.bundle.clone())
            .collect()
    }

    /// Walks `root` in sorted order for `*.json` files, each holding one
    /// serialized bundle, upserting every one found. In [`SyncMode::Sync`],
    /// any bundle already in the registry whose `(bundle_id, version)` was
    /// not found under `root` this pass is deactivated (excluded from
    /// `list_bundles`, still retrievable by `get_bundle`).
    ///
    /// Returns the number of bundles whose stored content changed (inserted,
    /// updated, or deactivated).
    pub fn sync_from_filesystem(&self, root: &Path, mode: SyncMode) -> CoreResult<usize> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
            .map(|entry| entry.path().to_path_buf())
            .collect();
        paths.sort();

        let mut changed = 0;
        let mut found_keys = std::collections::BTreeSet::new();
        for path in &paths {
            let contents = std::fs::read_to_string(path)?;
            let bundle: RegulatoryBundle = serde_json::from_str(&contents).map_err(|e| {
                CoreError::InvalidInput(format!(
                    "{}: not a valid regulatory bundle: {e}",
                    path.display()
                ))
            })?;
            found_keys.insert((bundle.bundle_id.clone(), bundle.version.clone()));
            if self.upsert_bundle(bundle)? {
                changed += 1;
            }
        }

        if mode == SyncMode::Sync {
            let mut guard = self.bundles.lock().expect("bundle registry lock poisoned");
            for (key, stored) in guard.iter_mut() {
                if stored.active && !found_keys.contains(key) {
                    stored.active = false;
                    changed += 1;
                }
            }
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(version: &str) -> RegulatoryBundle {
        RegulatoryBundle {
            bundle_id: "csrd-core".to_string(),
            regime: "CSRD_ESRS".to_string(),
            jurisdiction: "GLOBAL".to_string(),
            version: version.to_string(),
            obligations: vec![],
            overlays: vec![],
        }
    }

    #[test]
    fn upsert_of_identical_content_is_a_no_op() {
        let registry = BundleRegistry::new();
        assert!(registry.upsert_bundle(sample("1.0.0")).unwrap());
        assert!(!registry.upsert_bundle(sample("1.0.0")).unwrap());
    }

    #[test]
    fn distinct_versions_coexist() {
        let registry = BundleRegistry::new();
        registry.upsert_bundle(sample("1.0.0")).unwrap();
        registry.upsert_bundle(sample("1.1.0")).unwrap();
        assert_eq!(registry.list_bundles().len(), 2);
    }

    #[test]
    fn get_bundle_returns_none_when_absent() {
        let registry = BundleRegistry::new();
        assert!(registry.get_bundle("missing", "1.0.0").is_none());
    }

    fn write_bundle(dir: &std::path::Path, filename: &str, bundle: &RegulatoryBundle) {
        std::fs::write(
            dir.join(filename),
            serde_json::to_string_pretty(bundle).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn sync_from_filesystem_upserts_every_bundle_found() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), "a.json", &sample("1.0.0"));
        write_bundle(dir.path(), "b.json", &sample("1.1.0"));

        let registry = BundleRegistry::new();
        let changed = registry.sync_from_filesystem(dir.path(), SyncMode::Merge).unwrap();
        assert_eq!(changed, 2);
        assert_eq!(registry.list_bundles().len(), 2);
    }

    #[test]
    fn merge_mode_leaves_bundles_absent_from_the_scan_untouched() {
        let registry = BundleRegistry::new();
        registry.upsert_bundle(sample("0.9.0")).unwrap();

        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), "a.json", &sample("1.0.0"));
        registry.sync_from_filesystem(dir.path(), SyncMode::Merge).unwrap();

        assert_eq!(registry.list_bundles().len(), 2);
    }

    #[test]
    fn sync_mode_deactivates_bundles_absent_from_the_scan() {
        let registry = BundleRegistry::new();
        registry.upsert_bundle(sample("0.9.0")).unwrap();

        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), "a.json", &sample("1.0.0"));
        let changed = registry.sync_from_filesystem(dir.path(), SyncMode::Sync).unwrap();

        assert_eq!(changed, 2);
        assert_eq!(registry.list_bundles().len(), 1);
        assert!(registry.get_bundle("csrd-core", "0.9.0").is_some());
    }

    #[test]
    fn sync_mode_reactivating_a_deactivated_bundle_counts_as_a_change() {
        let registry = BundleRegistry::new();
        registry.upsert_bundle(sample("0.9.0")).unwrap();
        let dir = tempfile::tempdir().unwrap();
        registry.sync_from_filesystem(dir.path(), SyncMode::Sync).unwrap();
        assert_eq!(registry.list_bundles().len(), 0);

        write_bundle(dir.path(), "a.json", &sample("0.9.0"));
        let changed = registry.sync_from_filesystem(dir.path(), SyncMode::Sync).unwrap();
        assert_eq!(changed, 1);
        assert_eq!(registry.list_bundles().len(), 1);
    }
}

//! Content-addressed on-disk memoization of built features.
//!
//! Cache entries are named by the owning feature's content hash
//! (`<hexhash>.iscad_cache`) and carry the serialized shape together with
//! the node's auxiliary tables. Writes go to a temporary sibling and are
//! renamed into place, so a concurrent reader never observes a partial file
//! as "contained". Rebuild scoping tracks which entries were touched so that
//! stale files can be evicted afterwards.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use cad_base::{CadError, HashId};
use cad_kernel::{Pnt, Shape, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const CACHE_SUFFIX: &str = "iscad_cache";

/// Everything a feature persists besides its identity: shape plus auxiliary
/// tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub is_leaf: bool,
    pub shape: Shape,
    pub ref_values: BTreeMap<String, f64>,
    pub ref_points: BTreeMap<String, Pnt>,
    pub ref_vectors: BTreeMap<String, Vec3>,
    pub density: f64,
    pub area_weight: f64,
    pub explicit_cog: Option<Pnt>,
    pub explicit_mass: Option<f64>,
}

pub struct FeatureCache {
    dir: PathBuf,
    /// Present when the cache owns a temporary directory; dropping the cache
    /// removes it.
    _temp: Option<tempfile::TempDir>,
    used_during_rebuild: RefCell<HashSet<PathBuf>>,
    rebuild_active: Cell<bool>,
}

impl FeatureCache {
    /// Open a cache in `dir`, or create an owned temporary directory when no
    /// directory is given.
    pub fn new(dir: Option<PathBuf>) -> Result<Self, CadError> {
        match dir {
            Some(dir) => {
                fs::create_dir_all(&dir).map_err(|e| CadError::Cache {
                    path: dir.clone(),
                    source: e,
                })?;
                debug!(target: "cache", dir = %dir.display(), "cache_opened");
                Ok(Self {
                    dir,
                    _temp: None,
                    used_during_rebuild: RefCell::new(HashSet::new()),
                    rebuild_active: Cell::new(false),
                })
            }
            None => {
                let temp = tempfile::Builder::new()
                    .prefix("iscad_cache_")
                    .tempdir()
                    .map_err(|e| CadError::Cache {
                        path: std::env::temp_dir(),
                        source: e,
                    })?;
                let dir = temp.path().to_path_buf();
                debug!(target: "cache", dir = %dir.display(), "temporary_cache_created");
                Ok(Self {
                    dir,
                    _temp: Some(temp),
                    used_during_rebuild: RefCell::new(HashSet::new()),
                    rebuild_active: Cell::new(false),
                })
            }
        }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(&self, hash: HashId) -> PathBuf {
        self.dir.join(format!("{}.{}", hash.to_hex(), CACHE_SUFFIX))
    }

    pub fn contains(&self, hash: HashId) -> bool {
        self.file_name(hash).is_file()
    }

    /// Record the entry as touched by the current rebuild and hand back its
    /// path.
    pub fn mark_as_used(&self, hash: HashId) -> PathBuf {
        let path = self.file_name(hash);
        self.used_during_rebuild
            .borrow_mut()
            .insert(path.clone());
        path
    }

    /// Serialize a record under the given hash. The write lands in a
    /// temporary sibling first and is renamed into place.
    pub fn insert(&self, hash: HashId, record: &CacheRecord) -> Result<PathBuf, CadError> {
        let path = self.file_name(hash);
        let tmp = path.with_extension(format!("{}.tmp{}", CACHE_SUFFIX, std::process::id()));
        let payload = serde_json::to_vec(record).map_err(|e| CadError::CacheRecord {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        fs::write(&tmp, payload).map_err(|e| CadError::Cache {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, &path).map_err(|e| CadError::Cache {
            path: path.clone(),
            source: e,
        })?;
        // An insert counts as use: entries written during a rebuild must
        // survive the eviction pass that ends it.
        self.used_during_rebuild
            .borrow_mut()
            .insert(path.clone());
        debug!(target: "cache", hash = %hash, "record_inserted");
        Ok(path)
    }

    pub fn read(&self, path: &Path) -> Result<CacheRecord, CadError> {
        let bytes = fs::read(path).map_err(|e| CadError::Cache {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| CadError::CacheRecord {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    pub fn read_hash(&self, hash: HashId) -> Result<CacheRecord, CadError> {
        let path = self.mark_as_used(hash);
        self.read(&path)
    }

    /// Open a rebuild scope: forget which entries were used.
    pub fn init_rebuild(&self) {
        self.used_during_rebuild.borrow_mut().clear();
        self.rebuild_active.set(true);
    }

    /// Close the rebuild scope and evict every cache file that was neither
    /// read nor written during it. Returns the number of evicted files.
    pub fn finish_rebuild(&self) -> usize {
        if !self.rebuild_active.replace(false) {
            return 0;
        }
        let used = self.used_during_rebuild.borrow();
        let mut evicted = 0;
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(target: "cache", error = %e, "eviction_scan_failed");
                return 0;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_record = path
                .extension()
                .map(|e| e == CACHE_SUFFIX)
                .unwrap_or(false);
            if is_record && !used.contains(&path) {
                match fs::remove_file(&path) {
                    Ok(()) => evicted += 1,
                    Err(e) => {
                        warn!(target: "cache", file = %path.display(), error = %e, "eviction_failed")
                    }
                }
            }
        }
        debug!(target: "cache", evicted, "rebuild_finished");
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cad_kernel::primitives::box_solid;
    use nalgebra::Vector3;

    fn record() -> CacheRecord {
        let shape = Shape::Solid(
            box_solid(
                Pnt::origin(),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
                Vector3::new(0.0, 0.0, 1.0),
            )
            .unwrap(),
        );
        let mut ref_values = BTreeMap::new();
        ref_values.insert("L".to_string(), 2.5);
        let mut ref_points = BTreeMap::new();
        ref_points.insert("p_le".to_string(), Pnt::new(0.0, 0.0, 0.0));
        CacheRecord {
            is_leaf: false,
            shape,
            ref_values,
            ref_points,
            ref_vectors: BTreeMap::new(),
            density: 7.85,
            area_weight: 0.5,
            explicit_cog: None,
            explicit_mass: Some(12.0),
        }
    }

    fn hash(tag: &str) -> HashId {
        let mut h = cad_base::HashAccumulator::new();
        h.add_str(tag);
        h.finish()
    }

    #[test]
    fn insert_then_read_round_trips_tables() {
        let cache = FeatureCache::new(None).unwrap();
        let h = hash("a");
        assert!(!cache.contains(h));
        cache.insert(h, &record()).unwrap();
        assert!(cache.contains(h));
        let back = cache.read_hash(h).unwrap();
        assert_eq!(back.ref_values.get("L"), Some(&2.5));
        assert_eq!(back.explicit_mass, Some(12.0));
        assert_eq!(back.density, 7.85);
        assert!(!back.is_leaf);
    }

    #[test]
    fn partial_files_are_not_contained() {
        let cache = FeatureCache::new(None).unwrap();
        let h = hash("b");
        let stray = cache
            .file_name(h)
            .with_extension(format!("{}.tmp{}", CACHE_SUFFIX, std::process::id()));
        fs::write(&stray, b"partial").unwrap();
        assert!(!cache.contains(h));
    }

    #[test]
    fn corrupt_record_reports_decodable_error() {
        let cache = FeatureCache::new(None).unwrap();
        let h = hash("c");
        fs::write(cache.file_name(h), b"not json").unwrap();
        let err = cache.read_hash(h).unwrap_err();
        assert!(matches!(err, CadError::CacheRecord { .. }));
    }

    #[test]
    fn eviction_removes_only_untouched_entries() {
        let cache = FeatureCache::new(None).unwrap();
        let old = hash("old");
        let kept = hash("kept");
        cache.insert(old, &record()).unwrap();
        cache.insert(kept, &record()).unwrap();

        cache.init_rebuild();
        cache.mark_as_used(kept);
        let fresh = hash("fresh");
        cache.insert(fresh, &record()).unwrap();
        let evicted = cache.finish_rebuild();

        assert_eq!(evicted, 1);
        assert!(!cache.contains(old));
        assert!(cache.contains(kept));
        assert!(cache.contains(fresh), "entries inserted during the rebuild must survive");
    }

    #[test]
    fn no_eviction_without_rebuild_scope() {
        let cache = FeatureCache::new(None).unwrap();
        cache.insert(hash("x"), &record()).unwrap();
        assert_eq!(cache.finish_rebuild(), 0);
        assert!(cache.contains(hash("x")));
    }

    #[test]
    fn temporary_directory_is_removed_on_drop() {
        let dir;
        {
            let cache = FeatureCache::new(None).unwrap();
            dir = cache.directory().to_path_buf();
            assert!(dir.exists());
        }
        assert!(!dir.exists());
    }

    #[test]
    fn caller_supplied_directory_persists() {
        let keep = tempfile::tempdir().unwrap();
        let sub = keep.path().join("cache");
        {
            let cache = FeatureCache::new(Some(sub.clone())).unwrap();
            cache.insert(hash("p"), &record()).unwrap();
        }
        assert!(sub.exists());
        let cache = FeatureCache::new(Some(sub)).unwrap();
        assert!(cache.contains(hash("p")));
    }
}

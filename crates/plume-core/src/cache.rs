//! Filesystem cache for analytic and observed series.
//!
//! Each artifact is a JSON document addressed by a [`CacheKey`]:
//! `<root>/<kind>/<owner>/<slice>-<fingerprint>.json`. The fingerprint is a
//! SHA-256 digest of everything that determines the artifact's content, so
//! editing a case or subtest lands on a fresh key. Writes go through a temp
//! file in the destination directory and are renamed into place.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest as Sha2Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{Result, VerifyError};
use crate::obs;
use crate::series::{AnalyticSeries, ObservationSeries};
use crate::slice::{slugify, Slice};

/// SHA-256 digest used to fingerprint cache artifacts.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn compute(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hash);
        Self(bytes)
    }

    /// Digest of the canonical JSON encoding of `value`.
    pub fn of_json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::compute(&serde_json::to_vec(value)?))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short())
    }
}

/// Artifact families kept in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Analytic,
    Observed,
}

impl ArtifactKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtifactKind::Analytic => "analytic",
            ArtifactKind::Observed => "observed",
        }
    }
}

/// Location of one cached artifact relative to the cache root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    kind: ArtifactKind,
    owner: String,
    slice: String,
    fingerprint: Digest,
}

impl CacheKey {
    /// Key for `owner` (a case name or subtest id) on `slice`, fingerprinted
    /// by `identity` together with the slice definition.
    pub fn new<T: Serialize + ?Sized>(
        kind: ArtifactKind,
        owner: &str,
        slice: &Slice,
        identity: &T,
    ) -> Result<Self> {
        let fingerprint = Digest::of_json(&(identity, slice))?;
        Ok(Self {
            kind,
            owner: owner.to_string(),
            slice: slice.name.clone(),
            fingerprint,
        })
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn fingerprint(&self) -> Digest {
        self.fingerprint
    }

    fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.kind.dir_name())
            .join(slugify(&self.owner))
            .join(format!("{}-{}.json", slugify(&self.slice), self.fingerprint.short()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}@{}",
            self.kind.dir_name(),
            self.owner,
            self.slice,
            self.fingerprint.short()
        )
    }
}

/// Existence snapshot of a cache artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub path: PathBuf,
    pub exists: bool,
}

impl CacheEntry {
    /// An entry is only trusted when its artifact exists and recomputation
    /// was not forced.
    pub fn trusted(&self, overwrite: bool) -> bool {
        self.exists && !overwrite
    }
}

/// Whether a value came from the cache or was (re)computed this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Loaded,
    Computed,
}

/// A value together with its [`Origin`].
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub origin: Origin,
}

impl<T> Cached<T> {
    pub fn was_loaded(&self) -> bool {
        self.origin == Origin::Loaded
    }
}

/// Types that can be persisted in the cache and re-checked on load.
pub trait Artifact: Serialize + DeserializeOwned {
    fn check(&self) -> std::result::Result<(), String>;
}

impl Artifact for AnalyticSeries {
    fn check(&self) -> std::result::Result<(), String> {
        self.validate()
    }
}

impl Artifact for ObservationSeries {
    fn check(&self) -> std::result::Result<(), String> {
        self.validate()
    }
}

/// Filesystem-backed artifact cache.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    /// Open (and create if needed) a cache rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    pub fn entry(&self, key: &CacheKey) -> CacheEntry {
        let path = self.path_of(key);
        let exists = path.is_file();
        CacheEntry {
            key: key.clone(),
            path,
            exists,
        }
    }

    /// Load an artifact. `Ok(None)` when absent; `CacheCorruption` when the
    /// file cannot be read, decoded or fails its invariants.
    pub fn load<T: Artifact>(&self, key: &CacheKey) -> Result<Option<T>> {
        let path = self.path_of(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(VerifyError::CacheCorruption {
                    path,
                    reason: e.to_string(),
                })
            }
        };
        let value: T = serde_json::from_slice(&bytes).map_err(|e| VerifyError::CacheCorruption {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        value
            .check()
            .map_err(|reason| VerifyError::CacheCorruption { path, reason })?;
        Ok(Some(value))
    }

    /// Persist an artifact, replacing any previous version atomically.
    pub fn store<T: Artifact>(&self, key: &CacheKey, value: &T) -> Result<PathBuf> {
        let path = self.path_of(key);
        let bytes = serde_json::to_vec_pretty(value)?;
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    /// Like [`load`](Self::load), but a corrupt artifact is logged and
    /// reported as absent so the caller recomputes it.
    pub fn lookup<T: Artifact>(&self, key: &CacheKey) -> Result<Option<T>> {
        match self.load::<T>(key) {
            Ok(Some(value)) => {
                obs::emit_cache_hit(&key.to_string());
                Ok(Some(value))
            }
            Ok(None) => {
                obs::emit_cache_miss(&key.to_string(), "absent");
                Ok(None)
            }
            Err(VerifyError::CacheCorruption { path, reason }) => {
                obs::emit_cache_corrupt(&path, &reason);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Return the cached artifact for `key` unless `overwrite` is set or the
    /// artifact is missing or unreadable; otherwise compute, persist and
    /// return a fresh value.
    pub fn fetch_or_compute<T, F>(&self, key: &CacheKey, overwrite: bool, compute: F) -> Result<Cached<T>>
    where
        T: Artifact,
        F: FnOnce() -> Result<T>,
    {
        if overwrite {
            obs::emit_cache_miss(&key.to_string(), "overwrite");
        } else if let Some(value) = self.lookup::<T>(key)? {
            return Ok(Cached {
                value,
                origin: Origin::Loaded,
            });
        }

        let value = compute()?;
        self.store(key, &value)?;
        Ok(Cached {
            value,
            origin: Origin::Computed,
        })
    }
}

/// Write `data` to `path` via a temp file in the same directory and rename it
/// into place, so readers never observe a partial file.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn slice() -> Slice {
        Slice::along_x("centerline", 0.0, 500.0, 0.0).unwrap()
    }

    fn series(tag: f64) -> AnalyticSeries {
        AnalyticSeries::new("case", "centerline", vec![0.0, 1.0], vec![tag, tag / 2.0])
    }

    fn make_cache() -> (tempfile::TempDir, ArtifactCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path().join("cache")).unwrap();
        (dir, cache)
    }

    #[test]
    fn digest_deterministic() {
        let a = Digest::compute(b"test data");
        let b = Digest::compute(b"test data");
        assert_eq!(a, b);
        assert_ne!(a, Digest::compute(b"other data"));
        assert_eq!(a.to_hex().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn key_changes_with_identity() {
        let a = CacheKey::new(ArtifactKind::Analytic, "case", &slice(), &1.0).unwrap();
        let b = CacheKey::new(ArtifactKind::Analytic, "case", &slice(), &2.0).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn key_path_layout() {
        let (_dir, cache) = make_cache();
        let key = CacheKey::new(ArtifactKind::Observed, "mesh a", &slice(), "id").unwrap();
        let path = cache.path_of(&key);
        let rel = path.strip_prefix(cache.root()).unwrap();
        let parts: Vec<_> = rel.iter().map(|p| p.to_string_lossy().to_string()).collect();
        assert_eq!(parts[0], "observed");
        assert_eq!(parts[1], "mesh_a");
        assert!(parts[2].starts_with("centerline-"));
        assert!(parts[2].ends_with(".json"));
    }

    #[test]
    fn load_missing_returns_none() {
        let (_dir, cache) = make_cache();
        let key = CacheKey::new(ArtifactKind::Analytic, "case", &slice(), "id").unwrap();
        assert!(cache.load::<AnalyticSeries>(&key).unwrap().is_none());
        assert!(!cache.entry(&key).exists);
    }

    #[test]
    fn store_then_load_is_identical() {
        let (_dir, cache) = make_cache();
        let key = CacheKey::new(ArtifactKind::Analytic, "case", &slice(), "id").unwrap();
        let original = series(0.123_456_789_012_345_6);
        cache.store(&key, &original).unwrap();
        let loaded: AnalyticSeries = cache.load(&key).unwrap().unwrap();
        assert_eq!(loaded, original);
        assert!(cache.entry(&key).trusted(false));
        assert!(!cache.entry(&key).trusted(true));
    }

    #[test]
    fn fetch_or_compute_reuses_cache() {
        let (_dir, cache) = make_cache();
        let key = CacheKey::new(ArtifactKind::Analytic, "case", &slice(), "id").unwrap();
        let calls = Cell::new(0);

        let first = cache
            .fetch_or_compute(&key, false, || {
                calls.set(calls.get() + 1);
                Ok(series(1.0))
            })
            .unwrap();
        let second = cache
            .fetch_or_compute(&key, false, || {
                calls.set(calls.get() + 1);
                Ok(series(2.0))
            })
            .unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(first.origin, Origin::Computed);
        assert!(second.was_loaded());
        assert_eq!(first.value, second.value);
    }

    #[test]
    fn fetch_or_compute_overwrite_replaces() {
        let (_dir, cache) = make_cache();
        let key = CacheKey::new(ArtifactKind::Analytic, "case", &slice(), "id").unwrap();
        cache.fetch_or_compute(&key, false, || Ok(series(1.0))).unwrap();

        let forced = cache.fetch_or_compute(&key, true, || Ok(series(2.0))).unwrap();
        assert_eq!(forced.origin, Origin::Computed);

        let loaded: AnalyticSeries = cache.load(&key).unwrap().unwrap();
        assert_eq!(loaded, series(2.0));
    }

    #[test]
    fn corrupt_artifact_is_recomputed() {
        let (_dir, cache) = make_cache();
        let key = CacheKey::new(ArtifactKind::Analytic, "case", &slice(), "id").unwrap();
        let path = cache.path_of(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{\"case_name\": \"trunc").unwrap();

        match cache.load::<AnalyticSeries>(&key) {
            Err(VerifyError::CacheCorruption { .. }) => {}
            other => panic!("expected CacheCorruption, got {other:?}"),
        }

        let fetched = cache.fetch_or_compute(&key, false, || Ok(series(3.0))).unwrap();
        assert_eq!(fetched.origin, Origin::Computed);
        assert_eq!(cache.load::<AnalyticSeries>(&key).unwrap().unwrap(), series(3.0));
    }

    #[test]
    fn invariant_violation_is_corruption() {
        let (_dir, cache) = make_cache();
        let key = CacheKey::new(ArtifactKind::Analytic, "case", &slice(), "id").unwrap();
        let path = cache.path_of(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            br#"{"case_name":"c","slice_name":"s","coordinates":[0.0],"values":[1.0,2.0]}"#,
        )
        .unwrap();
        assert!(matches!(
            cache.load::<AnalyticSeries>(&key),
            Err(VerifyError::CacheCorruption { .. })
        ));
    }

    #[test]
    fn write_atomic_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("report.json");
        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");
        let entries: Vec<_> = fs::read_dir(target.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}

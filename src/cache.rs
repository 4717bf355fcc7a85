//! Disk cache of resized variants.
//!
//! Resizing is the expensive step of serving an image: a decode, a Lanczos
//! resample and an encode for every request. [`CacheStore`] keeps each
//! rendered variant under the cache root so repeated requests become a file
//! read.
//!
//! # Design
//!
//! There is no manifest. A variant's identity is its filename
//! (see [`naming`](crate::naming)), so the directory listing *is* the index:
//!
//! ```text
//! cache_root/
//! ├── kitten-300.jpg.jpg
//! ├── kitten-800.jpg.webp
//! └── img/
//!     └── puppy-1200.png.png
//! ```
//!
//! ## Validity
//!
//! An entry is valid while its source is not newer than it. Every hit
//! refreshes the entry's mtime, so the TTL sweep expires variants that have
//! not been *read* recently rather than ones created long ago.
//!
//! ## Writes
//!
//! Bytes are written to a hidden temp file next to the target and renamed
//! into place, so an interrupted write never leaves a file [`lookup`]
//! would serve. Hidden names are invisible to lookups, alternates and
//! sweeps. Two concurrent builds of one variant both succeed; the rename
//! makes the last writer win, and their bytes are identical anyway.
//!
//! ## Failures
//!
//! Bookkeeping failures (a file that vanished before eviction, an unreadable
//! directory, a foreign file in the cache) are logged and absorbed. Only
//! [`CacheStore::persist`] reports errors to the caller.
//!
//! [`lookup`]: CacheStore::lookup

use crate::imaging::format::is_decodable_ext;
use crate::naming::{decode_cache_name, encode_cache_name};
use crate::types::{CacheEntry, ImageRequest, SourceImage};
use filetime::FileTime;
use rand::Rng;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Prefix of in-flight temp files. Hidden so scans skip them.
const TEMP_PREFIX: &str = ".imagerez-";

/// Mode of persisted variants: owner-writable, readable by everyone.
#[cfg(unix)]
const CACHE_FILE_MODE: u32 = 0o644;

/// Filesystem operations over one cache directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// The directory is created lazily on the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the variant for `req` lives, whether or not it exists.
    pub fn entry_path(&self, req: &ImageRequest) -> PathBuf {
        self.root.join(encode_cache_name(req))
    }

    /// Exact match by encoded name. Existence only; staleness is checked
    /// separately with [`is_stale`](Self::is_stale).
    pub fn lookup(&self, req: &ImageRequest) -> Option<CacheEntry> {
        let path = self.entry_path(req);
        let modified = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta.modified().ok()?,
            Ok(_) => return None,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "cannot stat cache entry");
                }
                return None;
            }
        };
        Some(CacheEntry {
            path,
            request: req.clone(),
            modified,
        })
    }

    /// True iff the source was modified after the entry was written.
    pub fn is_stale(entry: &CacheEntry, source: &SourceImage) -> bool {
        source.modified > entry.modified
    }

    /// The narrowest cached variant at least `min_width` wide with the same
    /// base name and extensions, for use as a cheaper resize source.
    ///
    /// Narrower variants are never returned: resizing up from one would
    /// upscale. Variants in formats the codec cannot decode are ignored.
    /// When the winner is older than `source` it is evicted and `None` is
    /// returned so the caller falls back to the original.
    pub fn find_alternate(
        &self,
        base_name: &str,
        min_width: u32,
        source_ext: &str,
        dest_ext: &str,
        source: &SourceImage,
    ) -> Option<CacheEntry> {
        if !is_decodable_ext(dest_ext) {
            return None;
        }

        let (dir_part, stem) = match base_name.rsplit_once('/') {
            Some((dir, stem)) => (Some(dir), stem),
            None => (None, base_name),
        };
        let dir = match dir_part {
            Some(d) => self.root.join(d),
            None => self.root.clone(),
        };

        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(dir = %dir.display(), error = %e, "cannot scan cache directory");
                }
                return None;
            }
        };

        let mut best: Option<CacheEntry> = None;
        for dirent in read_dir.flatten() {
            let file_name = dirent.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if is_hidden_name(name) {
                continue;
            }
            let decoded = match decode_cache_name(name) {
                Ok(req) => req,
                Err(e) => {
                    debug!(file = name, error = %e, "skipping foreign cache file");
                    continue;
                }
            };
            if decoded.base_name != stem
                || decoded.source_ext != source_ext
                || decoded.dest_ext != dest_ext
                || decoded.width < min_width
            {
                continue;
            }
            if best.as_ref().is_some_and(|b| b.width() <= decoded.width) {
                continue;
            }
            let Ok(meta) = dirent.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let Ok(modified) = meta.modified() else {
                continue;
            };
            best = Some(CacheEntry {
                path: dirent.path(),
                request: ImageRequest {
                    base_name: base_name.to_string(),
                    ..decoded
                },
                modified,
            });
        }

        let candidate = best?;
        if Self::is_stale(&candidate, source) {
            debug!(path = %candidate.path.display(), "alternate is stale");
            let _ = self.evict(&candidate);
            return None;
        }
        Some(candidate)
    }

    /// Delete one entry. Failures are logged; callers may ignore them.
    pub fn evict(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        fs::remove_file(&entry.path).map_err(|e| {
            warn!(path = %entry.path.display(), error = %e, "failed to evict cache entry");
            CacheError::Io(e)
        })
    }

    /// Refresh the entry's mtime to now, marking it recently used.
    pub fn touch(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        filetime::set_file_mtime(&entry.path, FileTime::now())?;
        Ok(())
    }

    /// Atomically write `bytes` as the variant for `req`.
    pub fn persist(&self, req: &ImageRequest, bytes: &[u8]) -> Result<CacheEntry, CacheError> {
        let path = self.entry_path(req);
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir)?;
        tmp.write_all(bytes)?;
        // Temp files start out 0600; a front web server may read the cache directly.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(CACHE_FILE_MODE))?;
        }
        tmp.persist(&path).map_err(|e| e.error)?;

        let modified = fs::metadata(&path)?.modified()?;
        debug!(path = %path.display(), bytes = bytes.len(), "cached variant");
        Ok(CacheEntry {
            path,
            request: req.clone(),
            modified,
        })
    }

    /// Delete every cached file, or only those unused for longer than `ttl`.
    ///
    /// A zero `ttl` disables age expiry, so only `force_all` deletes.
    /// Returns the paths actually deleted.
    pub fn sweep(&self, force_all: bool, ttl: Duration) -> Vec<PathBuf> {
        let now = SystemTime::now();
        let expired = |path: &Path| -> bool {
            if force_all {
                return true;
            }
            if ttl.is_zero() {
                return false;
            }
            fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > ttl)
        };

        let deleted: Vec<PathBuf> = self
            .cache_files()
            .filter(|path| expired(path.as_path()))
            .filter(|path| remove_logged(path))
            .collect();
        info!(
            deleted = deleted.len(),
            force_all,
            ttl_secs = ttl.as_secs(),
            "swept cache"
        );
        deleted
    }

    /// Delete every cached file whose path under the cache root contains
    /// `pattern`, ignoring case.
    ///
    /// This is a substring match: `cat` also clears `bobcat` and `catalog`.
    /// An empty pattern deletes nothing.
    pub fn clear_for_image(&self, pattern: &str) -> Vec<PathBuf> {
        if pattern.is_empty() {
            return Vec::new();
        }
        let needle = pattern.to_lowercase();
        let deleted: Vec<PathBuf> = self
            .cache_files()
            .filter(|path| {
                path.strip_prefix(&self.root)
                    .unwrap_or(path)
                    .to_string_lossy()
                    .to_lowercase()
                    .contains(&needle)
            })
            .filter(|path| remove_logged(path))
            .collect();
        info!(pattern, deleted = deleted.len(), "cleared cache for image");
        deleted
    }

    /// With the given probability, run a TTL sweep. Returns the deleted
    /// paths when a sweep ran.
    pub fn maybe_opportunistic_sweep(
        &self,
        probability: f64,
        ttl: Duration,
    ) -> Option<Vec<PathBuf>> {
        let p = if probability.is_finite() {
            probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if rand::thread_rng().gen_bool(p) {
            Some(self.sweep(false, ttl))
        } else {
            None
        }
    }

    /// Regular, non-hidden files under the cache root. Hidden directories
    /// are not descended into.
    fn cache_files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden_name(&e.file_name().to_string_lossy()))
            .filter_map(|e| match e {
                Ok(e) => Some(e),
                Err(err) => {
                    if err.io_error().map(|io| io.kind()) != Some(io::ErrorKind::NotFound) {
                        warn!(error = %err, "cache walk error");
                    }
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
    }
}

fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

fn remove_logged(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to delete cache file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{mtime, set_mtime_ago};
    use tempfile::TempDir;

    fn req(base: &str, width: u32, src: &str, dst: &str) -> ImageRequest {
        ImageRequest {
            base_name: base.to_string(),
            width,
            source_ext: src.to_string(),
            dest_ext: dst.to_string(),
        }
    }

    fn source_at(path: &Path) -> SourceImage {
        SourceImage {
            path: path.to_path_buf(),
            modified: mtime(path),
            dimensions: None,
        }
    }

    /// Store plus a source file whose mtime is an hour in the past.
    fn setup() -> (TempDir, CacheStore, SourceImage) {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path().join("cache"));
        let source_path = tmp.path().join("kitten.jpg");
        fs::write(&source_path, b"source").unwrap();
        set_mtime_ago(&source_path, 3600);
        (tmp, store, source_at(&source_path))
    }

    // =========================================================================
    // lookup / persist
    // =========================================================================

    #[test]
    fn lookup_miss_on_empty_cache() {
        let (_tmp, store, _) = setup();
        assert!(store.lookup(&req("kitten", 300, ".jpg", ".jpg")).is_none());
    }

    #[test]
    fn persist_then_lookup() {
        let (_tmp, store, _) = setup();
        let r = req("kitten", 300, ".jpg", ".webp");

        let written = store.persist(&r, b"bytes").unwrap();
        assert_eq!(written.path, store.root().join("kitten-300.jpg.webp"));
        assert_eq!(fs::read(&written.path).unwrap(), b"bytes");

        let found = store.lookup(&r).unwrap();
        assert_eq!(found.request, r);
        assert_eq!(found.path, written.path);
    }

    #[cfg(unix)]
    #[test]
    fn persisted_variant_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;
        let (_tmp, store, _) = setup();
        let entry = store.persist(&req("kitten", 300, ".jpg", ".jpg"), b"x").unwrap();
        let mode = fs::metadata(&entry.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, CACHE_FILE_MODE);
    }

    #[test]
    fn persist_creates_subdirectories() {
        let (_tmp, store, _) = setup();
        let r = req("img/cats/kitten", 300, ".jpg", ".jpg");
        let entry = store.persist(&r, b"x").unwrap();
        assert_eq!(entry.path, store.root().join("img/cats/kitten-300.jpg.jpg"));
        assert!(entry.path.is_file());
    }

    #[test]
    fn persist_leaves_no_temp_files() {
        let (_tmp, store, _) = setup();
        store.persist(&req("kitten", 300, ".jpg", ".jpg"), b"a").unwrap();
        store.persist(&req("kitten", 300, ".jpg", ".jpg"), b"b").unwrap();

        let names: Vec<String> = fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["kitten-300.jpg.jpg"]);
        assert_eq!(
            fs::read(store.root().join("kitten-300.jpg.jpg")).unwrap(),
            b"b"
        );
    }

    #[test]
    fn lookup_ignores_directories_with_entry_name() {
        let (_tmp, store, _) = setup();
        fs::create_dir_all(store.root().join("kitten-300.jpg.jpg")).unwrap();
        assert!(store.lookup(&req("kitten", 300, ".jpg", ".jpg")).is_none());
    }

    // =========================================================================
    // Staleness
    // =========================================================================

    #[test]
    fn fresh_entry_is_not_stale() {
        let (_tmp, store, source) = setup();
        let entry = store.persist(&req("kitten", 300, ".jpg", ".jpg"), b"x").unwrap();
        assert!(!CacheStore::is_stale(&entry, &source));
    }

    #[test]
    fn entry_older_than_source_is_stale() {
        let (_tmp, store, source) = setup();
        let entry = store.persist(&req("kitten", 300, ".jpg", ".jpg"), b"x").unwrap();
        set_mtime_ago(&entry.path, 7200);
        let entry = store.lookup(&entry.request).unwrap();
        assert!(CacheStore::is_stale(&entry, &source));
    }

    // =========================================================================
    // find_alternate
    // =========================================================================

    #[test]
    fn alternate_picks_smallest_qualifying_width() {
        let (_tmp, store, source) = setup();
        for w in [400, 800, 1200] {
            store.persist(&req("kitten", w, ".jpg", ".jpg"), b"x").unwrap();
        }

        let alt = store
            .find_alternate("kitten", 500, ".jpg", ".jpg", &source)
            .unwrap();
        assert_eq!(alt.width(), 800);
        assert_eq!(alt.request.base_name, "kitten");
    }

    #[test]
    fn alternate_never_narrower_than_request() {
        let (_tmp, store, source) = setup();
        store.persist(&req("kitten", 400, ".jpg", ".jpg"), b"x").unwrap();
        assert!(
            store
                .find_alternate("kitten", 500, ".jpg", ".jpg", &source)
                .is_none()
        );
    }

    #[test]
    fn alternate_requires_matching_identity() {
        let (_tmp, store, source) = setup();
        store.persist(&req("kitten", 800, ".jpg", ".png"), b"x").unwrap();
        store.persist(&req("kitten", 900, ".png", ".jpg"), b"x").unwrap();
        store.persist(&req("kittens", 1000, ".jpg", ".jpg"), b"x").unwrap();
        store.persist(&req("big-kitten", 1100, ".jpg", ".jpg"), b"x").unwrap();
        assert!(
            store
                .find_alternate("kitten", 500, ".jpg", ".jpg", &source)
                .is_none()
        );
    }

    #[test]
    fn alternate_in_subdirectory_keeps_full_base_name() {
        let (_tmp, store, source) = setup();
        store.persist(&req("img/kitten", 800, ".jpg", ".jpg"), b"x").unwrap();
        store.persist(&req("kitten", 600, ".jpg", ".jpg"), b"x").unwrap();

        let alt = store
            .find_alternate("img/kitten", 500, ".jpg", ".jpg", &source)
            .unwrap();
        assert_eq!(alt.width(), 800);
        assert_eq!(alt.request.base_name, "img/kitten");
        assert_eq!(alt.path, store.root().join("img/kitten-800.jpg.jpg"));
    }

    #[test]
    fn alternate_skips_malformed_and_hidden_names() {
        let (_tmp, store, source) = setup();
        fs::create_dir_all(store.root()).unwrap();
        fs::write(store.root().join("kitten-notes.txt"), b"x").unwrap();
        fs::write(store.root().join(".imagerez-abc"), b"x").unwrap();
        store.persist(&req("kitten", 900, ".jpg", ".jpg"), b"x").unwrap();

        let alt = store
            .find_alternate("kitten", 500, ".jpg", ".jpg", &source)
            .unwrap();
        assert_eq!(alt.width(), 900);
    }

    #[test]
    fn alternate_ignores_undecodable_destination() {
        let (_tmp, store, source) = setup();
        store.persist(&req("kitten", 800, ".jpg", ".avif"), b"x").unwrap();
        assert!(
            store
                .find_alternate("kitten", 500, ".jpg", ".avif", &source)
                .is_none()
        );
    }

    #[test]
    fn stale_alternate_is_evicted() {
        let (_tmp, store, source) = setup();
        let entry = store.persist(&req("kitten", 800, ".jpg", ".jpg"), b"x").unwrap();
        set_mtime_ago(&entry.path, 7200);

        assert!(
            store
                .find_alternate("kitten", 500, ".jpg", ".jpg", &source)
                .is_none()
        );
        assert!(!entry.path.exists());
    }

    #[test]
    fn alternate_without_cache_dir_is_none() {
        let (_tmp, store, source) = setup();
        assert!(
            store
                .find_alternate("img/kitten", 100, ".jpg", ".jpg", &source)
                .is_none()
        );
    }

    // =========================================================================
    // evict / touch
    // =========================================================================

    #[test]
    fn evict_removes_file() {
        let (_tmp, store, _) = setup();
        let entry = store.persist(&req("kitten", 300, ".jpg", ".jpg"), b"x").unwrap();
        store.evict(&entry).unwrap();
        assert!(!entry.path.exists());
    }

    #[test]
    fn evict_missing_file_is_error_not_panic() {
        let (_tmp, store, _) = setup();
        let entry = store.persist(&req("kitten", 300, ".jpg", ".jpg"), b"x").unwrap();
        store.evict(&entry).unwrap();
        assert!(matches!(store.evict(&entry), Err(CacheError::Io(_))));
    }

    #[test]
    fn touch_refreshes_mtime() {
        let (_tmp, store, _) = setup();
        let entry = store.persist(&req("kitten", 300, ".jpg", ".jpg"), b"x").unwrap();
        set_mtime_ago(&entry.path, 7200);
        let before = mtime(&entry.path);

        store.touch(&entry).unwrap();
        let after = mtime(&entry.path);
        assert!(after > before);
        assert!(SystemTime::now().duration_since(after).unwrap() < Duration::from_secs(60));
    }

    // =========================================================================
    // sweep
    // =========================================================================

    #[test]
    fn sweep_deletes_only_expired_entries() {
        let (_tmp, store, _) = setup();
        let old = store.persist(&req("kitten", 300, ".jpg", ".jpg"), b"x").unwrap();
        let recent = store.persist(&req("kitten", 600, ".jpg", ".jpg"), b"x").unwrap();
        set_mtime_ago(&old.path, 7200);
        set_mtime_ago(&recent.path, 60);

        let deleted = store.sweep(false, Duration::from_secs(3600));
        assert_eq!(deleted, vec![old.path.clone()]);
        assert!(!old.path.exists());
        assert!(recent.path.exists());
    }

    #[test]
    fn sweep_force_deletes_everything_recursively() {
        let (_tmp, store, _) = setup();
        let a = store.persist(&req("kitten", 300, ".jpg", ".jpg"), b"x").unwrap();
        let b = store.persist(&req("img/puppy", 300, ".jpg", ".jpg"), b"x").unwrap();

        let mut deleted = store.sweep(true, Duration::from_secs(3600));
        deleted.sort();
        let mut expected = vec![a.path, b.path];
        expected.sort();
        assert_eq!(deleted, expected);
    }

    #[test]
    fn sweep_skips_hidden_entries() {
        let (_tmp, store, _) = setup();
        fs::create_dir_all(store.root().join(".git")).unwrap();
        fs::write(store.root().join(".keep"), b"").unwrap();
        fs::write(store.root().join(".git/config"), b"").unwrap();

        assert!(store.sweep(true, Duration::ZERO).is_empty());
        assert!(store.root().join(".keep").exists());
        assert!(store.root().join(".git/config").exists());
    }

    #[test]
    fn sweep_zero_ttl_never_expires() {
        let (_tmp, store, _) = setup();
        let old = store.persist(&req("kitten", 300, ".jpg", ".jpg"), b"x").unwrap();
        set_mtime_ago(&old.path, 10_000_000);

        assert!(store.sweep(false, Duration::ZERO).is_empty());
        assert!(old.path.exists());
    }

    #[test]
    fn sweep_missing_root_is_empty() {
        let (_tmp, store, _) = setup();
        assert!(store.sweep(true, Duration::from_secs(1)).is_empty());
    }

    // =========================================================================
    // clear_for_image
    // =========================================================================

    #[test]
    fn clear_for_image_is_case_insensitive_substring() {
        let (_tmp, store, _) = setup();
        let kitten = store.persist(&req("Kitten", 300, ".jpg", ".jpg"), b"x").unwrap();
        let nested = store.persist(&req("img/kitten", 600, ".jpg", ".webp"), b"x").unwrap();
        let puppy = store.persist(&req("puppy", 300, ".jpg", ".jpg"), b"x").unwrap();

        let mut deleted = store.clear_for_image("KITTEN");
        deleted.sort();
        let mut expected = vec![kitten.path, nested.path];
        expected.sort();
        assert_eq!(deleted, expected);
        assert!(puppy.path.exists());
    }

    #[test]
    fn clear_for_image_over_matches_substrings() {
        let (_tmp, store, _) = setup();
        store.persist(&req("cat", 300, ".jpg", ".jpg"), b"x").unwrap();
        store.persist(&req("bobcat", 300, ".jpg", ".jpg"), b"x").unwrap();
        assert_eq!(store.clear_for_image("cat").len(), 2);
    }

    #[test]
    fn clear_for_image_empty_pattern_deletes_nothing() {
        let (_tmp, store, _) = setup();
        let entry = store.persist(&req("kitten", 300, ".jpg", ".jpg"), b"x").unwrap();
        assert!(store.clear_for_image("").is_empty());
        assert!(entry.path.exists());
    }

    // =========================================================================
    // Opportunistic sweep
    // =========================================================================

    #[test]
    fn opportunistic_sweep_probability_bounds() {
        let (_tmp, store, _) = setup();
        let old = store.persist(&req("kitten", 300, ".jpg", ".jpg"), b"x").unwrap();
        set_mtime_ago(&old.path, 7200);

        assert!(
            store
                .maybe_opportunistic_sweep(0.0, Duration::from_secs(3600))
                .is_none()
        );
        assert!(old.path.exists());

        let deleted = store
            .maybe_opportunistic_sweep(1.0, Duration::from_secs(3600))
            .unwrap();
        assert_eq!(deleted, vec![old.path.clone()]);
    }

    #[test]
    fn opportunistic_sweep_clamps_bad_probability() {
        let (_tmp, store, _) = setup();
        assert!(
            store
                .maybe_opportunistic_sweep(f64::NAN, Duration::from_secs(1))
                .is_none()
        );
        assert!(
            store
                .maybe_opportunistic_sweep(5.0, Duration::from_secs(1))
                .is_some()
        );
    }
}

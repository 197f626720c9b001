//! Transformed-content cache.
//!
//! One entry per file, keyed by a hash of the *resolved* path and stored
//! under a configured directory. A zero-length entry is the "verified
//! unchanged" sentinel: the file was checked once and needed no rewrite,
//! which is distinct from never having been checked at all.
//!
//! Keys are path identity only. Editing a file between loads can serve
//! stale transformed content; callers that care must clear the directory
//! when sources change.
//!
//! Without a directory the cache is inert: lookups miss and writes are
//! dropped. Concurrent writers to the same key resolve last-write-wins,
//! which is safe because content for a given resolved path is
//! deterministic.

use std::fs;
use std::hash::Hasher;
use std::io::Write;
use std::path::{Path, PathBuf};

use rustc_hash::FxHasher;

use crate::error::{Error, Result};

/// Result of a cache lookup for a path that has been checked before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// The file was verified unchanged; serve the original as-is.
    Unchanged,

    /// Transformed content stored for this path.
    Content(String),
}

/// Path-keyed store for transformed file content.
#[derive(Debug, Clone)]
pub struct ContentCache {
    /// Storage directory; `None` disables the cache entirely.
    dir: Option<PathBuf>,
}

impl ContentCache {
    /// Create an inert cache that never stores anything.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// Create a cache rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the directory cannot be created.
    pub fn at_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Config(format!("cache directory {:?} is unusable: {}", dir, e)))?;
        Ok(Self { dir: Some(dir) })
    }

    /// Whether this cache has a storage directory.
    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Look up a path. `None` means the path has never been checked.
    pub fn get(&self, path: &Path) -> Option<CacheLookup> {
        let entry = self.entry_path(path)?;
        if !entry.exists() {
            return None;
        }
        match fs::read_to_string(&entry) {
            Ok(content) if content.is_empty() => Some(CacheLookup::Unchanged),
            Ok(content) => Some(CacheLookup::Content(content)),
            Err(e) => {
                // Degrade to a miss; the engine will run again.
                tracing::warn!("Unreadable cache entry for {:?}: {}", path, e);
                None
            }
        }
    }

    /// Store transformed content for a path.
    pub fn put(&self, path: &Path, content: &str) {
        self.store(path, content);
    }

    /// Record that a path was checked and needs no rewrite.
    pub fn mark_unchanged(&self, path: &Path) {
        self.store(path, "");
    }

    /// Write an entry, degrading IO failures to a warning. The computed
    /// content is still served this load; only reuse is lost.
    fn store(&self, path: &Path, content: &str) {
        let Some(entry) = self.entry_path(path) else {
            return;
        };
        match write_atomic(&entry, content) {
            Ok(()) => {
                tracing::debug!("Cached {} bytes for {:?}", content.len(), path);
            }
            Err(e) => {
                tracing::warn!("Failed to cache transform for {:?}: {}", path, e);
            }
        }
    }

    fn entry_path(&self, path: &Path) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(path_key(path)))
    }
}

/// 16-hex-digit key derived from the resolved path bytes.
fn path_key(path: &Path) -> String {
    let mut hasher = FxHasher::default();
    hasher.write(path.as_os_str().as_encoded_bytes());
    format!("{:016x}", hasher.finish())
}

/// Write to a temp file, then rename, so readers never see a torn entry.
fn write_atomic(entry: &Path, content: &str) -> std::io::Result<()> {
    let temp_path = entry.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    fs::rename(&temp_path, entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_then_get_round_trip() {
        let dir = tempdir().unwrap();
        let cache = ContentCache::at_dir(dir.path()).unwrap();
        let path = Path::new("/some/lib/widget.src");

        cache.put(path, "rewritten body");

        assert_eq!(
            cache.get(path),
            Some(CacheLookup::Content("rewritten body".to_string()))
        );
    }

    #[test]
    fn test_unknown_path_misses() {
        let dir = tempdir().unwrap();
        let cache = ContentCache::at_dir(dir.path()).unwrap();

        assert_eq!(cache.get(Path::new("/never/checked.src")), None);
    }

    #[test]
    fn test_unchanged_sentinel_is_not_a_miss() {
        let dir = tempdir().unwrap();
        let cache = ContentCache::at_dir(dir.path()).unwrap();
        let path = Path::new("/some/lib/stable.src");

        assert_eq!(cache.get(path), None);
        cache.mark_unchanged(path);
        assert_eq!(cache.get(path), Some(CacheLookup::Unchanged));
    }

    #[test]
    fn test_disabled_cache_is_inert() {
        let cache = ContentCache::disabled();
        let path = Path::new("/some/lib/widget.src");

        assert!(!cache.is_enabled());
        cache.put(path, "content");
        cache.mark_unchanged(path);
        assert_eq!(cache.get(path), None);
    }

    #[test]
    fn test_overwrite_is_last_write_wins() {
        let dir = tempdir().unwrap();
        let cache = ContentCache::at_dir(dir.path()).unwrap();
        let path = Path::new("/some/lib/widget.src");

        cache.put(path, "first");
        cache.put(path, "second");

        assert_eq!(
            cache.get(path),
            Some(CacheLookup::Content("second".to_string()))
        );
    }

    #[test]
    fn test_distinct_paths_get_distinct_keys() {
        let dir = tempdir().unwrap();
        let cache = ContentCache::at_dir(dir.path()).unwrap();

        cache.put(Path::new("/a/widget.src"), "a");
        cache.put(Path::new("/b/widget.src"), "b");

        assert_eq!(
            cache.get(Path::new("/a/widget.src")),
            Some(CacheLookup::Content("a".to_string()))
        );
        assert_eq!(
            cache.get(Path::new("/b/widget.src")),
            Some(CacheLookup::Content("b".to_string()))
        );
    }

    #[test]
    fn test_unusable_directory_is_a_config_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "a plain file").unwrap();

        // A file where the directory should be cannot be created as one.
        let result = ContentCache::at_dir(&blocker);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_corrupt_entry_degrades_to_miss() {
        let dir = tempdir().unwrap();
        let cache = ContentCache::at_dir(dir.path()).unwrap();
        let path = Path::new("/some/lib/widget.src");

        cache.put(path, "good");
        let entry = cache.entry_path(path).unwrap();
        fs::write(&entry, [0xff, 0xfe, 0x00, 0x80]).unwrap();

        assert_eq!(cache.get(path), None);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("deep").join("cache");

        let cache = ContentCache::at_dir(&nested).unwrap();
        assert!(nested.is_dir());
        assert!(cache.is_enabled());
    }
}

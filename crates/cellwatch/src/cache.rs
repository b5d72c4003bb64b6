//! Local read cache for network documents
//!
//! Reading a workbook over a network share can dominate a scan pass. When
//! enabled, each document is first copied into a local cache folder, under
//! a name derived from a hash of its full path, and the snapshot read is
//! pointed at the copy. The copy is reused while its modification time is
//! at least as new as the source's. Any failure falls back to reading the
//! original path, so caching can never make a scan fail.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Mirror of watched documents on local disk
#[derive(Debug, Clone)]
pub struct LocalCache {
    dir: PathBuf,
}

impl LocalCache {
    pub fn new(dir: &Path) -> Self {
        LocalCache {
            dir: dir.to_path_buf(),
        }
    }

    /// Return an up-to-date local copy of `path`, or `path` itself when
    /// copying is not possible
    pub fn materialize(&self, path: &Path) -> PathBuf {
        match self.refresh(path) {
            Ok(cached) => cached,
            Err(err) => {
                log::warn!(
                    "cache copy of {} failed, reading it directly: {err}",
                    path.display()
                );
                path.to_path_buf()
            }
        }
    }

    fn refresh(&self, path: &Path) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let cached = self.cached_path(path);
        let source_mtime = fs::metadata(path)?.modified()?;
        if let Ok(meta) = fs::metadata(&cached) {
            if let Ok(cached_mtime) = meta.modified() {
                if cached_mtime >= source_mtime {
                    return Ok(cached);
                }
            }
        }
        fs::copy(path, &cached)?;
        Ok(cached)
    }

    /// Cache entry for `path`: a path-hash prefix keeps same-named files
    /// from different folders apart
    fn cached_path(&self, path: &Path) -> PathBuf {
        let digest = Sha256::digest(path.to_string_lossy().as_bytes());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".into());
        self.dir.join(format!("{}_{name}", hex::encode(&digest[..8])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn test_materialize_copies_into_the_cache_folder() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Report.xlsx");
        fs::write(&source, b"v1").unwrap();

        let cache = LocalCache::new(&dir.path().join("cache"));
        let cached = cache.materialize(&source);

        assert_ne!(cached, source);
        assert!(cached.starts_with(dir.path().join("cache")));
        assert_eq!(fs::read(&cached).unwrap(), b"v1");
    }

    #[test]
    fn test_current_copy_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Report.xlsx");
        fs::write(&source, b"v1").unwrap();

        let cache = LocalCache::new(&dir.path().join("cache"));
        let cached = cache.materialize(&source);
        // Scribble a sentinel into the copy; a re-copy would erase it.
        fs::write(&cached, b"sentinel").unwrap();

        assert_eq!(cache.materialize(&source), cached);
        assert_eq!(fs::read(&cached).unwrap(), b"sentinel");
    }

    #[test]
    fn test_stale_copy_is_refreshed() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Report.xlsx");
        fs::write(&source, b"v1").unwrap();

        let cache = LocalCache::new(&dir.path().join("cache"));
        let cached = cache.materialize(&source);

        // Make the source strictly newer than the copy.
        std::thread::sleep(Duration::from_millis(50));
        fs::write(&source, b"v2").unwrap();

        assert_eq!(cache.materialize(&source), cached);
        assert_eq!(fs::read(&cached).unwrap(), b"v2");
    }

    #[test]
    fn test_unreadable_source_falls_back_to_the_original_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone.xlsx");

        let cache = LocalCache::new(&dir.path().join("cache"));
        assert_eq!(cache.materialize(&missing), missing);
    }

    #[test]
    fn test_same_name_in_different_folders_gets_distinct_entries() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a").join("Report.xlsx");
        let b = dir.path().join("b").join("Report.xlsx");
        fs::create_dir_all(a.parent().unwrap()).unwrap();
        fs::create_dir_all(b.parent().unwrap()).unwrap();
        fs::write(&a, b"from a").unwrap();
        fs::write(&b, b"from b").unwrap();

        let cache = LocalCache::new(&dir.path().join("cache"));
        let cached_a = cache.materialize(&a);
        let cached_b = cache.materialize(&b);

        assert_ne!(cached_a, cached_b);
        assert_eq!(fs::read(&cached_a).unwrap(), b"from a");
        assert_eq!(fs::read(&cached_b).unwrap(), b"from b");
    }
}

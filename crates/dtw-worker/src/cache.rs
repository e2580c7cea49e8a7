//! Doctree cache store.
//!
//! Keeps a full in-memory copy of the build tool's intermediate-state
//! directory between requests:
//! - `snapshot` walks the directory and replaces every entry (never merges)
//! - `restore` writes every entry back (never partial)
//!
//! The store remembers the directory it last captured, so a caller serving
//! several doctree directories can tell whether the entries belong to the
//! one it is about to build in.
//!
//! Only regular files are cached. Symlinks and empty directories are not
//! captured and so are never restored.
//!
//! A failed snapshot leaves the previous entries untouched.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Cache result type
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors from cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// In-memory snapshot of a directory tree, keyed by relative path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStore {
    root: Option<PathBuf>,
    entries: BTreeMap<PathBuf, Vec<u8>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write every cached entry under `root`, creating parent directories
    /// and overwriting existing files. Returns the number of files written.
    ///
    /// An empty store writes nothing.
    pub fn restore(&self, root: &Path) -> CacheResult<usize> {
        for (relative, bytes) in &self.entries {
            let path = root.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|source| CacheError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            fs::write(&path, bytes).map_err(|source| CacheError::Write {
                path: path.clone(),
                source,
            })?;
        }

        debug!(root = %root.display(), files = self.entries.len(), "restored doctree cache");
        Ok(self.entries.len())
    }

    /// Replace all entries with a fresh capture of every regular file under
    /// `root`. Returns the number of files captured.
    ///
    /// A missing `root` captures nothing.
    pub fn snapshot(&mut self, root: &Path) -> CacheResult<usize> {
        let mut captured = BTreeMap::new();

        if root.exists() {
            for entry in WalkDir::new(root)
                .follow_links(false)
                .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            {
                let entry = entry.map_err(|source| CacheError::Walk {
                    path: root.to_path_buf(),
                    source,
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }

                let path = entry.path();
                // WalkDir yields paths joined onto `root`, so this cannot fail.
                let Ok(relative) = path.strip_prefix(root) else { continue };
                let bytes = fs::read(path).map_err(|source| CacheError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                captured.insert(relative.to_path_buf(), bytes);
            }
        }

        self.entries = captured;
        self.root = Some(root.to_path_buf());
        debug!(
            root = %root.display(),
            files = self.entries.len(),
            bytes = self.total_bytes(),
            "captured doctree cache"
        );
        Ok(self.entries.len())
    }

    /// Directory of the last successful snapshot, if any.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Whether the entries were captured from `root`.
    pub fn is_captured_from(&self, root: &Path) -> bool {
        self.root.as_deref() == Some(root)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached bytes for a path relative to the snapshot root.
    pub fn get(&self, relative: impl AsRef<Path>) -> Option<&[u8]> {
        self.entries.get(relative.as_ref()).map(Vec::as_slice)
    }

    /// Relative paths of all cached entries, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    pub fn total_bytes(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_store_restore_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new();

        assert_eq!(store.restore(dir.path()).unwrap(), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_snapshot_captures_nested_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("environment.pickle"), b"env").unwrap();
        fs::create_dir_all(dir.path().join("guide")).unwrap();
        fs::write(dir.path().join("guide/intro.doctree"), b"tree").unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();

        let mut store = CacheStore::new();
        assert_eq!(store.snapshot(dir.path()).unwrap(), 2);
        assert_eq!(store.get("environment.pickle"), Some(&b"env"[..]));
        assert_eq!(store.get(Path::new("guide").join("intro.doctree")), Some(&b"tree"[..]));
        assert_eq!(store.total_bytes(), 7);
    }

    #[test]
    fn test_snapshot_replaces_instead_of_merging() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("old"), b"1").unwrap();

        let mut store = CacheStore::new();
        store.snapshot(dir.path()).unwrap();

        fs::remove_file(dir.path().join("old")).unwrap();
        fs::write(dir.path().join("new"), b"2").unwrap();
        store.snapshot(dir.path()).unwrap();

        assert_eq!(store.paths().collect::<Vec<_>>(), vec![Path::new("new")]);
    }

    #[test]
    fn test_snapshot_of_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::new();
        fs::write(dir.path().join("a"), b"1").unwrap();
        store.snapshot(dir.path()).unwrap();

        store.snapshot(&dir.path().join("missing")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_restore_overwrites_existing_files() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("a"), b"cached").unwrap();
        let mut store = CacheStore::new();
        store.snapshot(src.path()).unwrap();

        let dst = TempDir::new().unwrap();
        fs::write(dst.path().join("a"), b"stale contents").unwrap();
        store.restore(dst.path()).unwrap();

        assert_eq!(fs::read(dst.path().join("a")).unwrap(), b"cached");
    }

    #[cfg(unix)]
    #[test]
    fn test_restore_failure_reports_path() {
        let src = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("sub")).unwrap();
        fs::write(src.path().join("sub/file"), b"x").unwrap();
        let mut store = CacheStore::new();
        store.snapshot(src.path()).unwrap();

        // A regular file where a directory is needed.
        let dst = TempDir::new().unwrap();
        fs::write(dst.path().join("sub"), b"not a dir").unwrap();

        let err = store.restore(dst.path()).unwrap_err();
        assert!(matches!(err, CacheError::CreateDir { .. } | CacheError::Write { .. }));
    }

    #[test]
    fn test_snapshot_records_root() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::new();
        assert!(store.root().is_none());

        store.snapshot(dir.path()).unwrap();
        assert!(store.is_captured_from(dir.path()));
        assert!(!store.is_captured_from(&dir.path().join("other")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_captured() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("target"), b"x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("target"), dir.path().join("link")).unwrap();

        let mut store = CacheStore::new();
        assert_eq!(store.snapshot(dir.path()).unwrap(), 1);
        assert!(store.get("link").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_snapshot_keeps_previous_entries() {
        let good = TempDir::new().unwrap();
        fs::write(good.path().join("environment.pickle"), b"env").unwrap();
        let mut store = CacheStore::new();
        store.snapshot(good.path()).unwrap();

        let bad = TempDir::new().unwrap();
        nest_beyond_path_max(bad.path());

        let err = store.snapshot(bad.path()).unwrap_err();
        assert!(matches!(err, CacheError::Walk { .. } | CacheError::Read { .. }));
        assert_eq!(store.paths().collect::<Vec<_>>(), vec![Path::new("environment.pickle")]);
        assert!(store.is_captured_from(good.path()));
    }

    /// Build `root/deep/...` with a leaf file whose full path is longer than
    /// PATH_MAX, so walking it fails for any user. Levels are renamed
    /// bottom-up so no single call sees the long path.
    #[cfg(unix)]
    fn nest_beyond_path_max(root: &Path) {
        let long = "n".repeat(200);
        let mut chain = Vec::new();
        let mut dir = root.join("deep");
        for _ in 0..24 {
            dir = dir.join("s");
            chain.push(dir.clone());
        }
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("leaf"), b"x").unwrap();
        for level in chain.iter().rev() {
            fs::rename(level, level.with_file_name(&long)).unwrap();
        }
    }
}

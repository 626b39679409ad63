//! Project root and file entries
//!
//! A [`Root`] anchors every relative path of a run. [`FileEntry`] values are
//! produced by the walker. The content hash is computed on first access and
//! kept until a formatter rewrites the file and the dispatcher refreshes it.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;

/// Name of the per-project state directory (cache, local tool binaries)
pub const STATE_DIR: &str = ".fmtree";

/// The directory containing the marker file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Root(PathBuf);

impl Root {
    /// Wraps an absolute directory path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Returns the root directory
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Returns the state directory (`<root>/.fmtree`)
    pub fn state_dir(&self) -> PathBuf {
        self.0.join(STATE_DIR)
    }

    /// Resolves a `/`-separated relative path against the root
    pub fn join(&self, relative: &str) -> PathBuf {
        let mut path = self.0.clone();
        for part in relative.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    /// Returns the `/`-separated path of `path` relative to the root
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.0).ok()?;
        let parts: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }
}

impl AsRef<Path> for Root {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A candidate file under the root
#[derive(Debug)]
pub struct FileEntry {
    relative: String,
    absolute: PathBuf,
    modified: Option<SystemTime>,
    hash: Mutex<Option<String>>,
}

impl FileEntry {
    /// Creates an entry for an absolute path under `root`
    ///
    /// Returns `None` when the path is not strictly inside the root.
    pub fn new(root: &Root, absolute: PathBuf, modified: Option<SystemTime>) -> Option<Self> {
        let relative = root.relative(&absolute)?;
        Some(Self {
            relative,
            absolute,
            modified,
            hash: Mutex::new(None),
        })
    }

    /// Creates an entry from a `/`-separated relative path, reading its mtime
    pub fn from_relative(root: &Root, relative: &str) -> Self {
        let absolute = root.join(relative);
        let modified = fs::metadata(&absolute).and_then(|m| m.modified()).ok();
        Self {
            relative: relative.trim_matches('/').to_string(),
            absolute,
            modified,
            hash: Mutex::new(None),
        }
    }

    /// Returns the `/`-separated path relative to the root
    pub fn relative_path(&self) -> &str {
        &self.relative
    }

    /// Returns the absolute path
    pub fn path(&self) -> &Path {
        &self.absolute
    }

    /// Returns the last-modified time observed by the walker
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Returns the content hash, hashing the file on first access
    pub fn content_hash(&self) -> io::Result<String> {
        let mut memo = self.hash.lock();
        if let Some(hash) = memo.as_ref() {
            return Ok(hash.clone());
        }
        let hash = hash_file(&self.absolute)?;
        *memo = Some(hash.clone());
        Ok(hash)
    }

    /// Re-hashes the file as it is on disk now and keeps the new value
    ///
    /// An unreadable file clears the memoized hash.
    pub fn refresh_hash(&self) -> io::Result<String> {
        let mut memo = self.hash.lock();
        match hash_file(&self.absolute) {
            Ok(hash) => {
                *memo = Some(hash.clone());
                Ok(hash)
            }
            Err(e) => {
                *memo = None;
                Err(e)
            }
        }
    }
}

/// Hex blake3 digest of a byte slice
pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Hex blake3 digest of a file's contents
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

//! Tree walking
//!
//! Yields candidate files under the root lazily, in file-name order, without
//! following symlinks. VCS metadata directories, the fmtree state directory
//! and anything matched by the global `excludes` are pruned.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::GlobSet;
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use crate::domain::{FileEntry, Root, STATE_DIR};
use crate::storage::Config;

/// Directory names that are never descended into
pub const IGNORED_DIRS: &[&str] = &[
    ".git", ".hg", ".svn", ".jj", ".bzr", "_darcs", ".direnv", STATE_DIR,
];

/// A single entry that could not be read; the walk continues past it
#[derive(Debug, Error)]
#[error("Failed to read {}: {source}", .path.display())]
pub struct WalkError {
    pub path: PathBuf,
    pub source: walkdir::Error,
}

/// Lazy enumerator of files under a root
#[derive(Debug, Clone)]
pub struct Walker {
    root: Root,
    excludes: GlobSet,
}

impl Walker {
    pub fn new(root: Root, excludes: GlobSet) -> Self {
        Self { root, excludes }
    }

    /// Walker honoring the configuration's global excludes
    pub fn from_config(root: &Root, config: &Config) -> Self {
        Self::new(root.clone(), config.global_excludes.clone())
    }

    /// Starts a fresh walk
    ///
    /// Fails only if the root itself cannot be read; errors on individual
    /// entries are yielded and the walk continues.
    pub fn walk(&self) -> io::Result<impl Iterator<Item = Result<FileEntry, WalkError>>> {
        fs::read_dir(self.root.path())?;

        let prune_root = self.root.clone();
        let excludes = self.excludes.clone();
        let root = self.root.clone();

        let iter = WalkDir::new(self.root.path())
            .follow_links(false)
            .sort_by_file_name()
            .min_depth(1)
            .into_iter()
            .filter_entry(move |entry| !is_pruned(&prune_root, &excludes, entry))
            .filter_map(move |result| match result {
                Ok(entry) if entry.file_type().is_file() => {
                    let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
                    FileEntry::new(&root, entry.into_path(), modified).map(Ok)
                }
                Ok(_) => None,
                Err(source) => Some(Err(WalkError {
                    path: source
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.path().to_path_buf()),
                    source,
                })),
            });

        Ok(iter)
    }
}

fn is_pruned(root: &Root, excludes: &GlobSet, entry: &DirEntry) -> bool {
    let Some(relative) = root.relative(entry.path()) else {
        return false;
    };

    if entry.file_type().is_dir() {
        let name = entry.file_name().to_string_lossy();
        IGNORED_DIRS.contains(&name.as_ref())
            || excludes.is_match(&relative)
            || excludes.is_match(format!("{relative}/"))
    } else {
        excludes.is_match(&relative)
    }
}

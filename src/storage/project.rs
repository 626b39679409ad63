//! Project management
//!
//! Locates the project root from its marker file and provides access to the
//! configuration and cache.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use super::{Cache, Config};
use crate::domain::Root;

/// Marker file used when none is configured
pub const DEFAULT_MARKER: &str = "fmtree.toml";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("No {marker} found in {} or any parent directory. Run 'fmtree init' first.", .start.display())]
    RootNotFound { start: PathBuf, marker: String },

    #[error("Failed to determine the current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

/// Walks upward from `start` to the first directory containing `marker`
///
/// Only stat calls are made. A relative `start` is resolved against the
/// current directory; symlinks in the path are not resolved.
pub fn locate_root(start: &Path, marker: &str) -> Result<Root, ProjectError> {
    let absolute = if start.is_absolute() {
        start.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(ProjectError::CurrentDir)?
            .join(start)
    };
    // Drops `.` components so `-C .` yields a clean root
    let mut current: PathBuf = absolute.components().collect();
    let origin = current.clone();

    loop {
        if current.join(marker).is_file() {
            return Ok(Root::new(current));
        }

        if !current.pop() {
            return Err(ProjectError::RootNotFound {
                start: origin,
                marker: marker.to_string(),
            });
        }
    }
}

/// An fmtree project
pub struct Project {
    root: Root,
    config: Config,
}

impl Project {
    /// Opens the project rooted at `root`, reading its marker file
    pub fn open(root: Root, marker: &str) -> Result<Self> {
        let config = Config::for_root(&root, marker)?;

        Ok(Self { root, config })
    }

    /// Locates the root from `start` and opens it
    pub fn discover(start: &Path, marker: &str) -> Result<Self> {
        let root = locate_root(start, marker)?;
        Self::open(root, marker)
    }

    /// Writes a starter marker file in `dir` (never overwrites)
    ///
    /// Returns the path and whether it was created.
    pub fn init(dir: impl Into<PathBuf>, marker: &str) -> Result<(PathBuf, bool)> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let config_path = dir.join(marker);
        if config_path.exists() {
            return Ok((config_path, false));
        }

        let default_config = r#"# fmtree configuration
# Files matched by several formatters run through them in declaration order.

# Globs excluded from every formatter
excludes = []

[[formatter]]
name = "trailing-whitespace"
enable = true
includes = ["*.md", "*.toml", "*.txt"]

[[formatter]]
name = "blank-lines"
enable = true
includes = ["*.toml"]

[formatter.settings]
allowed_blank_lines = 1

[[formatter]]
name = "end-of-file"
enable = true
includes = ["*.md", "*.toml", "*.txt"]

[[formatter]]
name = "rustfmt"
enable = false

[formatter.settings]
edition = "2021"
"#;
        fs::write(&config_path, default_config)
            .with_context(|| format!("Failed to write config: {}", config_path.display()))?;

        let state_dir = dir.join(crate::domain::STATE_DIR);
        fs::create_dir_all(&state_dir).with_context(|| {
            format!("Failed to create state directory: {}", state_dir.display())
        })?;

        let gitignore_path = state_dir.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(&gitignore_path, "# Regenerated on demand\ncache/\n").with_context(|| {
                format!("Failed to write .gitignore: {}", gitignore_path.display())
            })?;
        }

        Ok((config_path, true))
    }

    /// Returns the project root
    pub fn root(&self) -> &Root {
        &self.root
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Opens the content-hash cache for this project
    pub fn cache(&self) -> Result<Cache> {
        Cache::open(&self.root)
    }

    /// Splits the project into its root and configuration
    pub fn into_parts(self) -> (Root, Config) {
        (self.root, self.config)
    }
}

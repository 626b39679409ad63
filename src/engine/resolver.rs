//! Formatter executable resolution
//!
//! The dispatcher never looks at `$PATH` itself. It asks a [`ToolResolver`]
//! to turn a formatter into something it can spawn, which keeps the engine
//! independent of how the binaries were installed.
//!
//! [`SearchPathResolver`] looks in:
//! 1. `.fmtree/bin/` - project-local tools
//! 2. `$PATH` - system-wide tools
//!
//! Built-in kinds resolve to the running `fmtree` executable.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::{FormatterSpec, Root};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("executable '{program}' for formatter '{formatter}' was not found")]
    NotFound { formatter: String, program: String },

    #[error("failed to locate the fmtree executable: {0}")]
    CurrentExe(#[source] io::Error),
}

/// Something the dispatcher can spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTool {
    pub program: PathBuf,

    /// Arguments placed before the formatter's own arguments
    pub prefix_args: Vec<String>,
}

/// Capability: formatter -> executable
pub trait ToolResolver: Send + Sync {
    fn resolve(&self, spec: &FormatterSpec) -> Result<ResolvedTool, ResolveError>;
}

/// Resolves tools from the project bin directory and `$PATH`
#[derive(Debug, Clone)]
pub struct SearchPathResolver {
    root: PathBuf,
    search_dirs: Vec<PathBuf>,
    self_exe: Option<PathBuf>,
}

impl SearchPathResolver {
    /// Searches `<root>/.fmtree/bin` and then `$PATH`
    pub fn new(root: &Root) -> Self {
        let mut search_dirs = vec![root.state_dir().join("bin")];
        if let Some(path_var) = std::env::var_os("PATH") {
            search_dirs.extend(std::env::split_paths(&path_var));
        }

        Self {
            root: root.path().to_path_buf(),
            search_dirs,
            self_exe: None,
        }
    }

    /// Replaces the search directories
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    /// Uses `exe` to serve built-in formatters instead of the current executable
    pub fn with_self_exe(mut self, exe: impl Into<PathBuf>) -> Self {
        self.self_exe = Some(exe.into());
        self
    }

    fn builtin(&self, spec: &FormatterSpec) -> Result<ResolvedTool, ResolveError> {
        let program = match &self.self_exe {
            Some(exe) => exe.clone(),
            None => std::env::current_exe().map_err(ResolveError::CurrentExe)?,
        };

        Ok(ResolvedTool {
            program,
            prefix_args: vec!["builtin".to_string(), spec.command.program.clone()],
        })
    }

    fn find(&self, program: &str) -> Option<PathBuf> {
        if program.contains('/') || program.contains(std::path::MAIN_SEPARATOR) {
            let path = Path::new(program);
            let path = if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.root.join(path)
            };
            return is_executable(&path).then_some(path);
        }

        self.search_dirs
            .iter()
            .flat_map(|dir| candidates(dir, program))
            .find(|path| is_executable(path))
    }
}

impl ToolResolver for SearchPathResolver {
    fn resolve(&self, spec: &FormatterSpec) -> Result<ResolvedTool, ResolveError> {
        if spec.command.builtin {
            return self.builtin(spec);
        }

        let program = self
            .find(&spec.command.program)
            .ok_or_else(|| ResolveError::NotFound {
                formatter: spec.name.clone(),
                program: spec.command.program.clone(),
            })?;

        log::debug!("Resolved {} to {}", spec.name, program.display());

        Ok(ResolvedTool {
            program,
            prefix_args: Vec::new(),
        })
    }
}

fn candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    #[cfg(windows)]
    {
        ["", ".exe", ".bat", ".cmd"]
            .iter()
            .map(|ext| dir.join(format!("{program}{ext}")))
            .collect()
    }

    #[cfg(not(windows))]
    {
        vec![dir.join(program)]
    }
}

/// Checks if a file is executable
fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = path.metadata() {
            return meta.is_file() && meta.permissions().mode() & 0o111 != 0;
        }
    }

    #[cfg(windows)]
    {
        if let Some(ext) = path.extension() {
            return path.is_file() && (ext == "exe" || ext == "bat" || ext == "cmd");
        }
    }

    false
}

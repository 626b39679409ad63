//! # Storage Layer
//!
//! Everything fmtree reads from or writes to disk besides the formatted files.
//!
//! ## Layout
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Project config | TOML | `<root>/fmtree.toml` (the marker file) |
//! | Global config | TOML | `~/.config/fmtree/config.toml` |
//! | Cache | SQLite (WAL) | `<root>/.fmtree/cache/fmtree.db` |
//! | Local tools | executables | `<root>/.fmtree/bin/` |
//!
//! ```text
//! project/
//! ├── fmtree.toml           # Marker and configuration
//! └── .fmtree/
//!     ├── bin/              # Project-local formatter binaries
//!     ├── cache/fmtree.db   # Content-hash cache
//!     └── .gitignore        # Ignores the cache
//! ```
//!
//! ## Key Types
//!
//! - [`Project`] - Root discovery and access to configuration and cache
//! - [`Config`] - Validated project and global configuration
//! - [`Cache`] - Content-hash cache keyed by (path, formatter)

pub mod config;
mod project;
mod cache;

pub use config::{
    build_formatters, load, Config, ConfigError, FormatterDecl, GlobalConfig, OutputFormat,
    ProjectConfig, DEFAULT_BATCH_SIZE,
};
pub use project::{locate_root, Project, ProjectError, DEFAULT_MARKER};
pub use cache::{Cache, CacheEntry, CacheError, CacheStats};

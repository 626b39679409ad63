//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `format` | Run every formatter and rewrite files |
//! | `check` | Report files that would change; exit 1 if any |
//! | `init` | Write a starter `fmtree.toml` |
//! | `formatters` | List known formatter kinds |
//! | `cache status`, `cache clear` | Inspect or reset the cache |
//!
//! ## Output Formats
//!
//! All commands support the `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON (the full report for `format`/`check`)
//!
//! ## Logging
//!
//! Diagnostics go to stderr through `env_logger`. Use `-v`, `-vv` or `-vvv`,
//! or set `RUST_LOG`:
//! ```bash
//! fmtree -vv check
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod run_cmd;
mod cache_cmd;
mod builtin_cmd;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};

//! # Formatting Engine
//!
//! Turns a project tree into formatter invocations and their results.
//!
//! ## Pipeline
//!
//! ```text
//! locate root ──> walk tree ──> match globs ──> batch by pipeline ──> run pool
//!      │              │              │                  │                 │
//!  fmtree.toml     walkdir        globset         BTreeMap order    rayon + cache
//! ```
//!
//! Files claimed by several formatters go through them in configured order,
//! each formatter seeing the previous one's output.
//!
//! ## Formatter Processes
//!
//! | Kind | Executable | Source |
//! |------|------------|--------|
//! | Built-in | `fmtree builtin <kind>` | [`builtin`] |
//! | Known tools | `taplo`, `rustfmt`, ... | `.fmtree/bin/` then `$PATH` |
//! | Custom | `command = "..."` | as configured |
//!
//! ## Key Types
//!
//! - [`Orchestrator`] - Runs one pass and produces a [`Report`](crate::domain::Report)
//! - [`Walker`] - Lazy, sorted tree enumeration
//! - [`Matcher`] - File to formatter assignment
//! - [`Dispatcher`] - Parallel batch execution
//! - [`ToolResolver`] - Formatter to executable

pub mod builtin;
pub mod catalog;
mod dispatcher;
mod invoke;
mod matcher;
mod orchestrator;
mod resolver;
mod walker;

pub use builtin::{Builtin, BuiltinOptions, BuiltinOutcome};
pub use catalog::{CatalogEntry, SettingDef, SettingError, SettingKind};
pub use dispatcher::Dispatcher;
pub use invoke::{
    files_named, CancellationToken, Invocation, InvocationError, Outcome, MODE_ENV, SETTINGS_ENV,
};
pub use matcher::{group_by_pipeline, match_file, Matcher, PipelineGroup};
pub use orchestrator::{Orchestrator, RunOptions, RunState};
pub use resolver::{ResolveError, ResolvedTool, SearchPathResolver, ToolResolver};
pub use walker::{WalkError, Walker, IGNORED_DIRS};

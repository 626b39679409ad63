//! Domain models for fmtree
//!
//! Roots, file entries, formatter specs and run reports, without any
//! process or cache concerns.

mod entry;
mod formatter;
mod report;

pub use entry::{hash_bytes, hash_file, FileEntry, Root, STATE_DIR};
pub use formatter::{
    compile_glob, compile_globs, ChangeReport, CommandTemplate, FormatterSpec,
    FormatterSpecBuilder, Mode,
};
pub use report::{Assignment, Report, RunResult, RunStats, RunStatus};

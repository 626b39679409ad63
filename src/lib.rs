//! fmtree - project-wide formatting orchestrator
//!
//! fmtree finds the project root from a marker file, walks the tree once,
//! assigns every file to the formatters whose globs claim it, and runs those
//! formatters in parallel batches, skipping files a content-hash cache already
//! knows are clean.

pub mod domain;
pub mod storage;
pub mod engine;
pub mod cli;

pub use domain::{FileEntry, FormatterSpec, Mode, Report, Root, RunResult, RunStatus};
pub use engine::{Orchestrator, RunOptions};

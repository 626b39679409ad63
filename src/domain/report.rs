//! Assignments, run results and the final report

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use super::entry::FileEntry;
use super::formatter::{FormatterSpec, Mode};

/// The ordered formatters that apply to one file
#[derive(Debug)]
pub struct Assignment {
    pub entry: FileEntry,
    pub formatters: Vec<Arc<FormatterSpec>>,
}

impl Assignment {
    pub fn new(entry: FileEntry, formatters: Vec<Arc<FormatterSpec>>) -> Self {
        Self { entry, formatters }
    }

    /// Returns true if no formatter claims the file
    pub fn is_empty(&self) -> bool {
        self.formatters.is_empty()
    }

    /// Formatter names in execution order
    pub fn pipeline(&self) -> Vec<String> {
        self.formatters.iter().map(|f| f.name.clone()).collect()
    }
}

/// Outcome of one formatter invocation over a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Process exited successfully (or reported pending changes in check mode)
    Success,
    /// Every file was clean according to the cache; nothing was spawned
    Skipped,
    /// Process exited with an unexpected status
    Failed { code: Option<i32> },
    /// Process could not be started or its output was unusable
    ProcessError { message: String },
    /// Run was cancelled before or during the invocation
    Cancelled,
}

impl RunStatus {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunStatus::Failed { .. } | RunStatus::ProcessError { .. }
        )
    }
}

/// Result of one (formatter, batch) pair
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub formatter: String,

    /// Files handed to the formatter (cache hits excluded)
    pub files: Vec<String>,

    pub status: RunStatus,

    /// Files whose content changed (format) or would change (check)
    pub changed: Vec<String>,

    /// Files skipped because the cache marked them clean
    pub cached: Vec<String>,

    /// Captured stderr and stdout of the process
    #[serde(skip_serializing_if = "String::is_empty")]
    pub diagnostics: String,

    pub duration_ms: u128,
}

impl RunResult {
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }
}

/// Counters collected over a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub walked: usize,
    pub matched: usize,
    pub cache_hits: usize,
    pub invocations: usize,
    pub changed: usize,
    pub walk_errors: usize,
}

/// Aggregate outcome of one invocation
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub mode: Mode,
    pub root: PathBuf,
    pub results: Vec<RunResult>,
    pub stats: RunStats,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub walk_errors: Vec<String>,
}

impl Report {
    /// Builds a report and derives its statistics from the results
    pub fn new(mode: Mode, root: PathBuf, results: Vec<RunResult>) -> Self {
        let mut report = Self {
            mode,
            root,
            results,
            stats: RunStats::default(),
            cancelled: false,
            walk_errors: Vec::new(),
        };
        report.stats.cache_hits = report.results.iter().map(|r| r.cached.len()).sum();
        report.stats.invocations = report
            .results
            .iter()
            .filter(|r| !matches!(r.status, RunStatus::Skipped | RunStatus::Cancelled))
            .count();
        report.stats.changed = report.changed_files().len();
        report
    }

    /// True if any unit failed, the run was cancelled, or (check mode) a file would change
    pub fn failed(&self) -> bool {
        if self.cancelled || self.results.iter().any(RunResult::is_failure) {
            return true;
        }
        self.mode == Mode::Check && self.stats.changed > 0
    }

    /// Results that failed, in report order
    pub fn failures(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    /// Distinct changed (or would-change) files, sorted
    pub fn changed_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = self
            .results
            .iter()
            .flat_map(|r| r.changed.iter().map(String::as_str))
            .collect();
        files.sort_unstable();
        files.dedup();
        files
    }
}

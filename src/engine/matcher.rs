//! File-to-formatter assignment
//!
//! Assignment is a pure function of a file's relative path and the ordered
//! formatter list, so it does not depend on the order files are walked in.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{Assignment, FileEntry, FormatterSpec};

/// Returns the formatters that claim `entry`, in execution order
pub fn match_file(entry: FileEntry, formatters: &[Arc<FormatterSpec>]) -> Assignment {
    let matched = formatters
        .iter()
        .filter(|f| f.matches(entry.relative_path()))
        .cloned()
        .collect();
    Assignment::new(entry, matched)
}

/// Matches files against a fixed formatter list
#[derive(Debug, Clone)]
pub struct Matcher {
    formatters: Vec<Arc<FormatterSpec>>,
}

impl Matcher {
    pub fn new(formatters: Vec<Arc<FormatterSpec>>) -> Self {
        Self { formatters }
    }

    pub fn match_file(&self, entry: FileEntry) -> Assignment {
        match_file(entry, &self.formatters)
    }

    /// Matches every entry and groups the claimed ones by pipeline
    pub fn assign(&self, entries: impl IntoIterator<Item = FileEntry>) -> Vec<PipelineGroup> {
        group_by_pipeline(entries.into_iter().map(|e| self.match_file(e)).collect())
    }
}

/// Files sharing one formatter pipeline
#[derive(Debug)]
pub struct PipelineGroup {
    pub formatters: Vec<Arc<FormatterSpec>>,
    pub entries: Vec<FileEntry>,
}

/// Groups non-empty assignments by pipeline
///
/// Groups are keyed by the formatter name sequence and entries within a group
/// are sorted by path, so batching is stable run to run.
pub fn group_by_pipeline(assignments: Vec<Assignment>) -> Vec<PipelineGroup> {
    let mut groups: BTreeMap<Vec<String>, PipelineGroup> = BTreeMap::new();

    for assignment in assignments.into_iter().filter(|a| !a.is_empty()) {
        let key = assignment.pipeline();
        groups
            .entry(key)
            .or_insert_with(|| PipelineGroup {
                formatters: assignment.formatters.clone(),
                entries: Vec::new(),
            })
            .entries
            .push(assignment.entry);
    }

    groups
        .into_values()
        .map(|mut group| {
            group
                .entries
                .sort_by(|a, b| a.relative_path().cmp(b.relative_path()));
            group
        })
        .collect()
}

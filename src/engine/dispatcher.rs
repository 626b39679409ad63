//! Formatter dispatch
//!
//! Assignments are grouped by pipeline (the ordered formatter list) and cut
//! into batches. A batch is the unit of parallel work: its formatters run one
//! after another, so each sees the previous one's output, and since every
//! file belongs to exactly one batch no file is ever touched by two
//! processes at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use rayon::prelude::*;

use super::invoke::{files_named, CancellationToken, Invocation, Outcome};
use super::matcher::group_by_pipeline;
use super::resolver::{ResolvedTool, ToolResolver};
use crate::domain::{Assignment, FileEntry, FormatterSpec, Mode, Root, RunResult, RunStatus};
use crate::storage::{Cache, DEFAULT_BATCH_SIZE};

/// Files that go through one pipeline together
#[derive(Debug)]
struct Batch {
    formatters: Vec<Arc<FormatterSpec>>,
    entries: Vec<FileEntry>,
}

type Tools = HashMap<String, Result<ResolvedTool, String>>;

/// Runs formatters over assignments on a bounded worker pool
pub struct Dispatcher<'a> {
    root: &'a Root,
    cache: &'a Cache,
    resolver: &'a dyn ToolResolver,
    cancel: CancellationToken,
    jobs: usize,
    batch_size: usize,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        root: &'a Root,
        cache: &'a Cache,
        resolver: &'a dyn ToolResolver,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            root,
            cache,
            resolver,
            cancel,
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets the worker count (at least 1)
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Sets the maximum files per invocation (at least 1)
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Runs every assignment in `mode`
    ///
    /// Results are ordered by pipeline, batch, then formatter step. Failures
    /// are recorded in their result and never stop other work.
    pub fn run(&self, mode: Mode, assignments: Vec<Assignment>) -> Result<Vec<RunResult>> {
        let batches = self.batches(assignments);
        if batches.is_empty() {
            return Ok(Vec::new());
        }

        let tools = self.resolve_tools(&batches);

        log::info!(
            "Dispatching {} batch(es) in {} mode on {} worker(s)",
            batches.len(),
            mode,
            self.jobs
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .thread_name(|i| format!("fmtree-worker-{i}"))
            .build()
            .context("Failed to start worker pool")?;

        let results: Vec<Vec<RunResult>> = pool.install(|| {
            batches
                .par_iter()
                .map(|batch| self.run_batch(mode, batch, &tools))
                .collect()
        });

        Ok(results.into_iter().flatten().collect())
    }

    fn batches(&self, assignments: Vec<Assignment>) -> Vec<Batch> {
        let mut batches = Vec::new();

        for group in group_by_pipeline(assignments) {
            let mut entries = group.entries;
            while !entries.is_empty() {
                let rest = entries.split_off(entries.len().min(self.batch_size));
                batches.push(Batch {
                    formatters: group.formatters.clone(),
                    entries,
                });
                entries = rest;
            }
        }

        batches
    }

    fn resolve_tools(&self, batches: &[Batch]) -> Tools {
        let mut tools = Tools::new();

        for spec in batches.iter().flat_map(|b| b.formatters.iter()) {
            if tools.contains_key(&spec.name) {
                continue;
            }
            let resolved = self.resolver.resolve(spec).map_err(|e| {
                log::warn!("{}", e);
                e.to_string()
            });
            tools.insert(spec.name.clone(), resolved);
        }

        tools
    }

    fn run_batch(&self, mode: Mode, batch: &Batch, tools: &Tools) -> Vec<RunResult> {
        let mut results = Vec::with_capacity(batch.formatters.len());
        for spec in &batch.formatters {
            if self.cancel.is_cancelled() {
                break;
            }
            results.push(self.run_step(mode, spec, &batch.entries, tools));
        }

        results
    }

    fn run_step(
        &self,
        mode: Mode,
        spec: &FormatterSpec,
        entries: &[FileEntry],
        tools: &Tools,
    ) -> RunResult {
        let started = Instant::now();

        let (pending, cached): (Vec<&FileEntry>, Vec<&FileEntry>) = entries
            .iter()
            .partition(|entry| self.cache.should_process(entry, spec));

        // Content each file had going into this step
        let before: Vec<Option<String>> = pending.iter().map(|e| e.content_hash().ok()).collect();

        let mut result = RunResult {
            formatter: spec.name.clone(),
            files: pending
                .iter()
                .map(|e| e.relative_path().to_string())
                .collect(),
            status: RunStatus::Skipped,
            changed: Vec::new(),
            cached: cached
                .iter()
                .map(|e| e.relative_path().to_string())
                .collect(),
            diagnostics: String::new(),
            duration_ms: 0,
        };

        if result.files.is_empty() {
            log::debug!(
                "{}: {} cached file(s), nothing to do",
                spec.name,
                result.cached.len()
            );
            return result;
        }

        let tool = match tools.get(&spec.name) {
            Some(Ok(tool)) => tool,
            Some(Err(message)) => {
                result.status = RunStatus::ProcessError {
                    message: message.clone(),
                };
                return result;
            }
            None => {
                result.status = RunStatus::ProcessError {
                    message: format!("formatter '{}' was not resolved", spec.name),
                };
                return result;
            }
        };

        let invocation = Invocation {
            tool,
            spec,
            mode,
            root: self.root.path(),
            files: &result.files,
        };

        match invocation.run(&self.cancel) {
            Err(e) => {
                result.status = RunStatus::ProcessError {
                    message: e.to_string(),
                };
            }
            Ok(Outcome::Cancelled) => {
                result.status = RunStatus::Cancelled;
            }
            Ok(Outcome::Exited {
                code,
                stdout,
                stderr,
            }) => {
                result.diagnostics = diagnostics(&stderr, &stdout);
                match mode {
                    Mode::Format => self.settle_format(spec, &pending, &before, code, &mut result),
                    Mode::Check => self.settle_check(
                        tool,
                        spec,
                        &pending,
                        code,
                        (stdout.as_str(), stderr.as_str()),
                        &mut result,
                    ),
                }
            }
        }

        result.duration_ms = started.elapsed().as_millis();

        if result.is_failure() {
            log::warn!(
                "{}: failed on {} file(s): {:?}",
                spec.name,
                result.files.len(),
                result.status
            );
        } else {
            log::info!(
                "{}: {} file(s), {} changed, {} cached in {}ms",
                spec.name,
                result.files.len(),
                result.changed.len(),
                result.cached.len(),
                result.duration_ms
            );
        }

        result
    }

    /// Re-hashes the batch after a format pass and updates the cache
    fn settle_format(
        &self,
        spec: &FormatterSpec,
        pending: &[&FileEntry],
        before: &[Option<String>],
        code: Option<i32>,
        result: &mut RunResult,
    ) {
        let succeeded = code == Some(0);

        for (entry, before) in pending.iter().zip(before) {
            let path = entry.relative_path();
            let after = entry.refresh_hash().ok();
            if after != *before {
                result.changed.push(path.to_string());
            }

            if succeeded && after.is_some() {
                if let Err(e) = self.cache.record(entry, spec) {
                    log::debug!("{}: not caching {}: {}", spec.name, path, e);
                }
            } else {
                self.cache.invalidate(path, &spec.name);
            }
        }

        result.status = if succeeded {
            RunStatus::Success
        } else {
            RunStatus::Failed { code }
        };
    }

    /// Interprets a check pass and records the files reported clean
    fn settle_check(
        &self,
        tool: &ResolvedTool,
        spec: &FormatterSpec,
        pending: &[&FileEntry],
        code: Option<i32>,
        output: (&str, &str),
        result: &mut RunResult,
    ) {
        match self.check_changes(tool, spec, &result.files, code, output) {
            Ok(changed) => {
                result.changed = changed;
                result.status = RunStatus::Success;
            }
            Err(status) => {
                result.status = status;
                return;
            }
        }

        for entry in pending {
            let path = entry.relative_path();
            if result.changed.iter().any(|c| c == path) {
                continue;
            }
            if let Err(e) = self.cache.record(entry, spec) {
                log::debug!("{}: not caching {}: {}", spec.name, path, e);
            }
        }
    }

    /// Files a check pass says would change
    ///
    /// After a change code both streams are searched for paths. If they name
    /// none of the batch, each file is checked on its own.
    fn check_changes(
        &self,
        tool: &ResolvedTool,
        spec: &FormatterSpec,
        files: &[String],
        code: Option<i32>,
        (stdout, stderr): (&str, &str),
    ) -> Result<Vec<String>, RunStatus> {
        let report = spec.command.report;
        match code {
            Some(0) => Ok(files_named(stdout, files, report)),
            Some(c) if spec.command.is_change_code(c) => {
                let output = format!("{}\n{}", stdout, stderr);
                let named = files_named(&output, files, report);
                if !named.is_empty() {
                    Ok(named)
                } else if files.len() == 1 {
                    Ok(files.to_vec())
                } else {
                    log::debug!(
                        "{}: output names no file, checking {} file(s) one by one",
                        spec.name,
                        files.len()
                    );
                    self.check_each(tool, spec, files)
                }
            }
            _ => Err(RunStatus::Failed { code }),
        }
    }

    fn check_each(
        &self,
        tool: &ResolvedTool,
        spec: &FormatterSpec,
        files: &[String],
    ) -> Result<Vec<String>, RunStatus> {
        let mut changed = Vec::new();

        for file in files {
            let invocation = Invocation {
                tool,
                spec,
                mode: Mode::Check,
                root: self.root.path(),
                files: std::slice::from_ref(file),
            };

            match invocation.run(&self.cancel) {
                Err(e) => {
                    return Err(RunStatus::ProcessError {
                        message: e.to_string(),
                    })
                }
                Ok(Outcome::Cancelled) => return Err(RunStatus::Cancelled),
                Ok(Outcome::Exited { code: Some(0), .. }) => {}
                Ok(Outcome::Exited { code: Some(c), .. }) if spec.command.is_change_code(c) => {
                    changed.push(file.clone());
                }
                Ok(Outcome::Exited { code, .. }) => return Err(RunStatus::Failed { code }),
            }
        }

        Ok(changed)
    }
}

fn diagnostics(stderr: &str, stdout: &str) -> String {
    [stderr.trim_end(), stdout.trim_end()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

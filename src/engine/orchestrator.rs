//! Run orchestration
//!
//! One pass through `Idle -> Locating -> Walking -> Dispatching -> Reporting
//! -> Done`. Any hard error (no root, bad configuration, unreadable root,
//! cache that cannot be opened) moves the run to `Failed` instead.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;

use super::dispatcher::Dispatcher;
use super::invoke::CancellationToken;
use super::matcher::Matcher;
use super::resolver::{SearchPathResolver, ToolResolver};
use super::walker::Walker;
use crate::domain::{Assignment, Mode, Report, Root, RunResult};
use crate::storage::{Cache, Config, Project, DEFAULT_MARKER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Locating,
    Walking,
    Dispatching,
    Reporting,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Locating => "locating",
            RunState::Walking => "walking",
            RunState::Dispatching => "dispatching",
            RunState::Reporting => "reporting",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Inputs of a run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory the root search starts from
    pub working_dir: PathBuf,
    pub marker: String,

    /// Overrides the configured worker count
    pub jobs: Option<usize>,

    pub use_cache: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            marker: DEFAULT_MARKER.to_string(),
            jobs: None,
            use_cache: true,
        }
    }
}

/// Drives locate, walk, dispatch and report for one invocation
pub struct Orchestrator {
    options: RunOptions,
    resolver: Option<Arc<dyn ToolResolver>>,
    cancel: CancellationToken,
    state: Mutex<RunState>,
    transitions: Mutex<Vec<RunState>>,
}

impl Orchestrator {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            resolver: None,
            cancel: CancellationToken::new(),
            state: Mutex::new(RunState::Idle),
            transitions: Mutex::new(vec![RunState::Idle]),
        }
    }

    /// Replaces the default [`SearchPathResolver`]
    pub fn with_resolver(mut self, resolver: Arc<dyn ToolResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Shares an existing cancellation token (e.g. one tripped by Ctrl-C)
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current state
    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Every state entered so far, starting with `Idle`
    pub fn transitions(&self) -> Vec<RunState> {
        self.transitions.lock().clone()
    }

    /// Runs one pass in `mode`
    pub fn run(&self, mode: Mode) -> Result<Report> {
        match self.execute(mode) {
            Ok(report) => {
                self.transition(RunState::Done);
                Ok(report)
            }
            Err(e) => {
                self.transition(RunState::Failed);
                Err(e)
            }
        }
    }

    fn transition(&self, next: RunState) {
        let mut state = self.state.lock();
        log::debug!("Run state: {} -> {}", *state, next);
        *state = next;
        self.transitions.lock().push(next);
    }

    fn execute(&self, mode: Mode) -> Result<Report> {
        self.transition(RunState::Locating);
        let project = Project::discover(&self.options.working_dir, &self.options.marker)?;
        log::info!(
            "Project root: {} ({} formatter(s) enabled)",
            project.root(),
            project.config().formatters.len()
        );

        let cache = if self.options.use_cache {
            project.cache()?
        } else {
            Cache::disabled()
        };
        let (root, config) = project.into_parts();
        let config = config.with_jobs(self.options.jobs);

        self.transition(RunState::Walking);
        let walker = Walker::from_config(&root, &config);
        let matcher = Matcher::new(config.formatters.clone());

        let mut walked = 0;
        let mut assignments = Vec::new();
        let mut walk_errors = Vec::new();

        let entries = walker
            .walk()
            .with_context(|| format!("Failed to read project root {}", root))?;
        for item in entries {
            if self.cancel.is_cancelled() {
                break;
            }
            match item {
                Ok(entry) => {
                    walked += 1;
                    let assignment = matcher.match_file(entry);
                    if !assignment.is_empty() {
                        assignments.push(assignment);
                    }
                }
                Err(e) => {
                    log::warn!("{}", e);
                    walk_errors.push(e.to_string());
                }
            }
        }
        let matched = assignments.len();
        log::info!("Walked {} file(s), {} matched", walked, matched);

        self.transition(RunState::Dispatching);
        let results = self.dispatch(&root, &config, &cache, mode, assignments)?;

        self.transition(RunState::Reporting);
        if let Err(e) = cache.flush() {
            log::warn!("Failed to persist cache: {:#}", e);
        }

        let mut report = Report::new(mode, root.path().to_path_buf(), results);
        report.stats.walked = walked;
        report.stats.matched = matched;
        report.stats.walk_errors = walk_errors.len();
        report.walk_errors = walk_errors;
        report.cancelled = self.cancel.is_cancelled();

        Ok(report)
    }

    fn dispatch(
        &self,
        root: &Root,
        config: &Config,
        cache: &Cache,
        mode: Mode,
        assignments: Vec<Assignment>,
    ) -> Result<Vec<RunResult>> {
        let search;
        let resolver: &dyn ToolResolver = match &self.resolver {
            Some(resolver) => resolver.as_ref(),
            None => {
                search = SearchPathResolver::new(root);
                &search
            }
        };

        Dispatcher::new(root, cache, resolver, self.cancel.clone())
            .jobs(config.jobs)
            .batch_size(config.batch_size)
            .run(mode, assignments)
    }
}

//! `format` and `check` commands

use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::Result;

use super::output::Output;
use crate::domain::{Mode, Report, RunResult, RunStatus};
use crate::engine::{CancellationToken, Orchestrator, RunOptions};

/// Exit code for a run stopped by Ctrl-C
const EXIT_CANCELLED: u8 = 130;

pub fn run(
    mode: Mode,
    options: RunOptions,
    cancel: CancellationToken,
    output: &Output,
) -> Result<ExitCode> {
    let started = Instant::now();
    let orchestrator = Orchestrator::new(options).with_cancellation(cancel);
    let report = orchestrator.run(mode)?;

    if output.is_json() {
        output.data(&report);
    } else {
        print_report(&report, started.elapsed(), output);
    }

    Ok(ExitCode::from(exit_status(&report)))
}

fn exit_status(report: &Report) -> u8 {
    if report.cancelled {
        EXIT_CANCELLED
    } else if report.failed() {
        1
    } else {
        0
    }
}

fn print_report(report: &Report, elapsed: Duration, output: &Output) {
    let verb = match report.mode {
        Mode::Check => "would reformat",
        Mode::Format => "formatted",
    };

    for path in report.changed_files() {
        output.row(&[verb, path]);
    }

    for failure in report.failures() {
        print_failure(failure);
    }

    for error in &report.walk_errors {
        eprintln!("warning: {}", error);
    }

    if report.cancelled {
        eprintln!("Cancelled; remaining batches were not run");
    }

    let stats = &report.stats;
    output.note(&format!(
        "{} file(s) {}, {} walked, {} matched, {} cached, {} invocation(s) in {}ms",
        stats.changed,
        verb,
        stats.walked,
        stats.matched,
        stats.cache_hits,
        stats.invocations,
        elapsed.as_millis()
    ));
}

fn print_failure(result: &RunResult) {
    let reason = match &result.status {
        RunStatus::Failed { code: Some(code) } => format!("exited with code {}", code),
        RunStatus::Failed { code: None } => "was terminated by a signal".to_string(),
        RunStatus::ProcessError { message } => message.clone(),
        _ => return,
    };

    eprintln!("error: formatter '{}' {}", result.formatter, reason);
    for file in &result.files {
        eprintln!("  {}", file);
    }
    for line in result.diagnostics.lines() {
        eprintln!("  | {}", line);
    }
}

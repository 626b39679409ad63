//! External formatter invocation
//!
//! Every formatter is spawned the same way:
//!
//! ```text
//! <program> [prefix args] [mode args] [options] [settings args] [--] <files...>
//! ```
//!
//! with the project root as working directory, root-relative file paths, and
//! `FMTREE_SETTINGS` (settings as JSON) and `FMTREE_MODE` (`check`/`format`)
//! in the environment.
//!
//! Formatters are expected to replace files atomically (write a temporary
//! file, then rename). fmtree does not enforce this.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use super::resolver::ResolvedTool;
use crate::domain::{ChangeReport, FormatterSpec, Mode};

/// Environment variable carrying the settings JSON
pub const SETTINGS_ENV: &str = "FMTREE_SETTINGS";

/// Environment variable carrying the mode
pub const MODE_ENV: &str = "FMTREE_MODE";

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Shared flag that stops a run between batches and kills running formatters
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed while waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// What a finished process left behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Exited {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// Killed on cancellation; output discarded
    Cancelled,
}

/// One formatter process over one batch
#[derive(Debug)]
pub struct Invocation<'a> {
    pub tool: &'a ResolvedTool,
    pub spec: &'a FormatterSpec,
    pub mode: Mode,
    pub root: &'a Path,
    pub files: &'a [String],
}

impl Invocation<'_> {
    /// Arguments passed to the process, file paths included
    pub fn args(&self) -> Vec<String> {
        let mut args = self.tool.prefix_args.clone();
        args.extend(self.spec.command.args(self.mode));
        args.extend(self.files.iter().cloned());
        args
    }

    /// Runs the process to completion or until `cancel` trips
    pub fn run(&self, cancel: &CancellationToken) -> Result<Outcome, InvocationError> {
        let program = self.tool.program.display().to_string();

        log::trace!("Running {} {:?}", program, self.args());

        let mut child = Command::new(&self.tool.program)
            .args(self.args())
            .current_dir(self.root)
            .env(SETTINGS_ENV, self.spec.settings_json())
            .env(MODE_ENV, self.mode.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| InvocationError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status: ExitStatus = loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                // Grandchildren may still hold the pipes; leave the readers detached.
                drop(stdout);
                drop(stderr);
                log::debug!("Killed {} on cancellation", program);
                return Ok(Outcome::Cancelled);
            }

            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    let _ = child.kill();
                    return Err(InvocationError::Wait { program, source });
                }
            }
        };

        Ok(Outcome::Exited {
            code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Batch files named in a tool's output
///
/// `report` extracts a path from each line. The path names a file when it
/// equals it, or ends with it after a space, colon or slash (tools often
/// print absolute paths or prefixes).
pub fn files_named(output: &str, files: &[String], report: ChangeReport) -> Vec<String> {
    let paths: Vec<&str> = output.lines().filter_map(|line| report.path_in(line)).collect();

    files
        .iter()
        .filter(|file| {
            paths.iter().any(|path| {
                *path == file.as_str()
                    || [' ', ':', '/']
                        .iter()
                        .any(|sep| path.ends_with(&format!("{sep}{file}")))
            })
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn files_named_exact_and_suffixed() {
        let batch = files(&["a.toml", "sub/b.toml", "c.toml"]);
        let stdout = "a.toml\n/abs/root/sub/b.toml\nunrelated line\n";

        assert_eq!(
            files_named(stdout, &batch, ChangeReport::Paths),
            ["a.toml", "sub/b.toml"]
        );
    }

    #[test]
    fn files_named_ignores_partial_names() {
        let batch = files(&["b.toml"]);
        assert!(files_named("sub-b.toml\n", &batch, ChangeReport::Paths).is_empty());
        assert_eq!(
            files_named("[warn] b.toml\n", &batch, ChangeReport::Paths),
            ["b.toml"]
        );
    }

    #[test]
    fn files_named_from_diff_headers() {
        let batch = files(&["src/a.rs", "src/b.rs"]);
        let output = "Diff in /abs/root/src/a.rs:1:\n-fn main(){}\n+fn main() {}\n";

        assert_eq!(
            files_named(output, &batch, ChangeReport::DiffHeaders),
            ["src/a.rs"]
        );
        assert!(files_named(output, &batch, ChangeReport::Paths).is_empty());
    }

    #[test]
    fn cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[cfg(unix)]
    mod process {
        use super::super::*;
        use crate::domain::CommandTemplate;
        use std::path::PathBuf;
        use std::time::Instant;
        use tempfile::TempDir;

        fn sh_spec(script: &str) -> FormatterSpec {
            FormatterSpec::builder("sh", "custom")
                .includes(["*"])
                .command(CommandTemplate {
                    program: "sh".into(),
                    format_args: vec!["-c".into(), script.into(), "sh".into()],
                    check_args: vec!["-c".into(), script.into(), "sh".into()],
                    ..CommandTemplate::default()
                })
                .build()
                .unwrap()
        }

        fn tool() -> ResolvedTool {
            ResolvedTool {
                program: PathBuf::from("/bin/sh"),
                prefix_args: Vec::new(),
            }
        }

        #[test]
        fn captures_exit_code_and_output() {
            let dir = TempDir::new().unwrap();
            let spec = sh_spec("echo \"$FMTREE_MODE $1\"; echo oops >&2; exit 3");
            let tool = tool();
            let files = vec!["x.txt".to_string()];
            let invocation = Invocation {
                tool: &tool,
                spec: &spec,
                mode: Mode::Check,
                root: dir.path(),
                files: &files,
            };

            let outcome = invocation.run(&CancellationToken::new()).unwrap();
            assert_eq!(
                outcome,
                Outcome::Exited {
                    code: Some(3),
                    stdout: "check x.txt\n".into(),
                    stderr: "oops\n".into(),
                }
            );
        }

        #[test]
        fn cancellation_kills_running_process() {
            let dir = TempDir::new().unwrap();
            let spec = sh_spec("sleep 30");
            let tool = tool();
            let invocation = Invocation {
                tool: &tool,
                spec: &spec,
                mode: Mode::Format,
                root: dir.path(),
                files: &[],
            };

            let token = CancellationToken::new();
            let trip = token.clone();
            let started = Instant::now();
            let canceller = thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                trip.cancel();
            });

            assert_eq!(invocation.run(&token).unwrap(), Outcome::Cancelled);
            assert!(started.elapsed() < Duration::from_secs(10));
            canceller.join().unwrap();
        }

        #[test]
        fn missing_program_is_spawn_error() {
            let dir = TempDir::new().unwrap();
            let spec = sh_spec("true");
            let tool = ResolvedTool {
                program: dir.path().join("nope"),
                prefix_args: Vec::new(),
            };
            let invocation = Invocation {
                tool: &tool,
                spec: &spec,
                mode: Mode::Format,
                root: dir.path(),
                files: &[],
            };

            assert!(matches!(
                invocation.run(&CancellationToken::new()),
                Err(InvocationError::Spawn { .. })
            ));
        }
    }
}

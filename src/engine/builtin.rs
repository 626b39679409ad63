//! Built-in formatters
//!
//! Small whitespace fixers served by `fmtree builtin <kind>`. They follow the
//! same process contract as external tools: file paths as arguments,
//! `--check` lists files that would change and exits 1.
//!
//! All of them work on bytes, keep each line's own ending (`\n` or `\r\n`),
//! and are idempotent.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::Mode;

/// Blank lines kept by `blank-lines` when not configured
pub const DEFAULT_ALLOWED_BLANK_LINES: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    BlankLines,
    TrailingWhitespace,
    EndOfFile,
}

impl Builtin {
    pub const ALL: [Builtin; 3] = [
        Builtin::BlankLines,
        Builtin::TrailingWhitespace,
        Builtin::EndOfFile,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::BlankLines => "blank-lines",
            Builtin::TrailingWhitespace => "trailing-whitespace",
            Builtin::EndOfFile => "end-of-file",
        }
    }

    /// Returns the fixed content
    pub fn apply(&self, input: &[u8], options: &BuiltinOptions) -> Vec<u8> {
        match self {
            Builtin::BlankLines => collapse_blank_lines(input, options.allowed_blank_lines),
            Builtin::TrailingWhitespace => strip_trailing_whitespace(input),
            Builtin::EndOfFile => fix_end_of_file(input),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinOptions {
    pub allowed_blank_lines: usize,
}

impl Default for BuiltinOptions {
    fn default() -> Self {
        Self {
            allowed_blank_lines: DEFAULT_ALLOWED_BLANK_LINES,
        }
    }
}

/// Files a built-in pass touched or failed on
#[derive(Debug, Default)]
pub struct BuiltinOutcome {
    /// Rewritten (format) or would be rewritten (check)
    pub changed: Vec<PathBuf>,
    pub errors: Vec<String>,
}

/// Applies `builtin` to every file
///
/// Unreadable or unwritable files are recorded in `errors` and the rest are
/// still processed.
pub fn run(builtin: Builtin, options: &BuiltinOptions, mode: Mode, files: &[PathBuf]) -> BuiltinOutcome {
    let mut outcome = BuiltinOutcome::default();

    for path in files {
        match process_file(builtin, options, mode, path) {
            Ok(true) => outcome.changed.push(path.clone()),
            Ok(false) => {}
            Err(e) => outcome.errors.push(format!("{:#}", e)),
        }
    }

    outcome
}

fn process_file(builtin: Builtin, options: &BuiltinOptions, mode: Mode, path: &Path) -> Result<bool> {
    let input = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let output = builtin.apply(&input, options);

    if output == input {
        return Ok(false);
    }

    if mode.mutates() {
        write_atomic(path, &output)?;
    }

    Ok(true)
}

/// Writes through a temporary sibling and renames it over `path`
fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{file_name}.fmtree-tmp"));

    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
        file.write_all(content)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        file.sync_all()?;
    }

    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(&temp_path, meta.permissions()).with_context(|| {
            format!("Failed to copy permissions to {}", temp_path.display())
        })?;
    }

    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}

/// A line split from its terminator
struct Line<'a> {
    content: &'a [u8],
    ending: &'a [u8],
}

fn lines(input: &[u8]) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut rest = input;

    while !rest.is_empty() {
        match rest.iter().position(|&b| b == b'\n') {
            Some(i) => {
                let (content, ending) = if i > 0 && rest[i - 1] == b'\r' {
                    (&rest[..i - 1], &rest[i - 1..=i])
                } else {
                    (&rest[..i], &rest[i..=i])
                };
                lines.push(Line { content, ending });
                rest = &rest[i + 1..];
            }
            None => {
                lines.push(Line {
                    content: rest,
                    ending: &[],
                });
                rest = &[];
            }
        }
    }

    lines
}

fn is_blank(content: &[u8]) -> bool {
    content.iter().all(|b| matches!(b, b' ' | b'\t'))
}

fn collapse_blank_lines(input: &[u8], allowed: usize) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    let mut run = 0;

    for line in lines(input) {
        if is_blank(line.content) {
            run += 1;
            if run > allowed {
                continue;
            }
        } else {
            run = 0;
        }
        output.extend_from_slice(line.content);
        output.extend_from_slice(line.ending);
    }

    output
}

fn strip_trailing_whitespace(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());

    for line in lines(input) {
        let end = line
            .content
            .iter()
            .rposition(|b| !matches!(b, b' ' | b'\t'))
            .map_or(0, |i| i + 1);
        output.extend_from_slice(&line.content[..end]);
        output.extend_from_slice(line.ending);
    }

    output
}

fn fix_end_of_file(input: &[u8]) -> Vec<u8> {
    let end = input
        .iter()
        .rposition(|b| !matches!(b, b'\n' | b'\r'))
        .map_or(0, |i| i + 1);
    if end == 0 {
        return Vec::new();
    }

    let ending: &[u8] = match input.iter().position(|&b| b == b'\n') {
        Some(i) if i > 0 && input[i - 1] == b'\r' => b"\r\n",
        _ => b"\n",
    };

    let mut output = input[..end].to_vec();
    output.extend_from_slice(ending);
    output
}

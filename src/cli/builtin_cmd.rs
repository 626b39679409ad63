//! Hidden `builtin` command: runs an in-tree formatter as a child process
//!
//! Exit codes follow the formatter contract: 0 clean (or formatted), 1 files
//! would change (check mode), 2 on errors.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Result};

use crate::domain::Mode;
use crate::engine::builtin::{self, Builtin, BuiltinOptions};

const EXIT_ERROR: u8 = 2;

pub fn run(
    kind: &str,
    check: bool,
    allowed_blank_lines: Option<usize>,
    files: &[PathBuf],
) -> Result<ExitCode> {
    let builtin = Builtin::from_name(kind)
        .ok_or_else(|| anyhow!("Unknown built-in formatter '{}'", kind))?;

    let mut options = BuiltinOptions::default();
    if let Some(allowed) = allowed_blank_lines {
        options.allowed_blank_lines = allowed;
    }

    let mode = if check { Mode::Check } else { Mode::Format };
    let outcome = builtin::run(builtin, &options, mode, files);

    for error in &outcome.errors {
        eprintln!("{}", error);
    }

    if check {
        for path in &outcome.changed {
            println!("{}", path.display());
        }
    }

    let code = if !outcome.errors.is_empty() {
        EXIT_ERROR
    } else if check && !outcome.changed.is_empty() {
        1
    } else {
        0
    };

    Ok(ExitCode::from(code))
}

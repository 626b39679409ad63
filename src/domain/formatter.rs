//! Formatter specifications
//!
//! A [`FormatterSpec`] is the validated, immutable form of one
//! `[[formatter]]` declaration. It owns its compiled glob sets so matching
//! never re-parses patterns.

use std::fmt;

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

/// Operating mode of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Non-mutating: report files that would change
    Check,
    /// Rewrite files in place
    Format,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Check => "check",
            Mode::Format => "format",
        }
    }

    /// Returns true if formatters may write files in this mode
    pub fn mutates(&self) -> bool {
        matches!(self, Mode::Format)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a formatter process is invoked
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandTemplate {
    /// Executable name or path (the kind name for built-ins)
    pub program: String,

    /// Arguments used in format mode
    pub format_args: Vec<String>,

    /// Arguments used in check mode
    pub check_args: Vec<String>,

    /// User-supplied extra arguments
    pub options: Vec<String>,

    /// Arguments rendered from the validated settings
    pub settings_args: Vec<String>,

    /// Whether to put `--` before the file list
    pub separator: bool,

    /// Exit codes meaning "would change" in check mode
    pub change_codes: Vec<i32>,

    /// Served by `fmtree builtin <program>`
    pub builtin: bool,

    /// How check output names the files that would change
    pub report: ChangeReport,
}

impl CommandTemplate {
    /// Full argument list (without file paths) for a mode
    pub fn args(&self, mode: Mode) -> Vec<String> {
        let mut args = match mode {
            Mode::Format => self.format_args.clone(),
            Mode::Check => self.check_args.clone(),
        };
        args.extend(self.options.iter().cloned());
        args.extend(self.settings_args.iter().cloned());
        if self.separator {
            args.push("--".to_string());
        }
        args
    }

    /// Returns true if `code` signals pending changes in check mode
    pub fn is_change_code(&self, code: i32) -> bool {
        self.change_codes.contains(&code)
    }
}

/// How a tool names the files it would change in check mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReport {
    /// One path per line, possibly prefixed (`[warn] a.md`) or ending in `:`
    #[default]
    Paths,

    /// Diff headers: `Diff in <path>:<line>:` or `Diff in <path> at line <line>:`
    DiffHeaders,
}

impl ChangeReport {
    /// Path a single output line refers to, if any
    pub fn path_in(self, line: &str) -> Option<&str> {
        let line = line.trim();
        let path = match self {
            ChangeReport::Paths => line.trim_end_matches(':'),
            ChangeReport::DiffHeaders => {
                let rest = line.strip_prefix("Diff in ")?.trim_end_matches(':');
                match rest.rsplit_once(" at line ") {
                    Some((path, _)) => path,
                    None => strip_line_number(rest),
                }
            }
        };
        (!path.is_empty()).then_some(path)
    }
}

/// Drops a trailing `:<digits>` from `path:12`
fn strip_line_number(text: &str) -> &str {
    match text.rsplit_once(':') {
        Some((path, line)) if !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()) => path,
        _ => text,
    }
}

/// A validated formatter declaration
#[derive(Debug, Clone)]
pub struct FormatterSpec {
    /// Unique name within the configuration
    pub name: String,

    /// Catalog entry this formatter instantiates
    pub kind: String,

    pub enabled: bool,

    /// Lower runs first; ties keep declaration order
    pub priority: i64,

    pub includes: Vec<String>,
    pub excludes: Vec<String>,

    /// Opaque per-formatter settings, already validated
    pub settings: toml::Table,

    pub command: CommandTemplate,

    include_set: GlobSet,
    exclude_set: GlobSet,
    fingerprint: String,
}

impl FormatterSpec {
    /// Starts building a spec named `name` of catalog kind `kind`
    pub fn builder(name: impl Into<String>, kind: impl Into<String>) -> FormatterSpecBuilder {
        FormatterSpecBuilder {
            name: name.into(),
            kind: kind.into(),
            enabled: true,
            priority: 0,
            includes: Vec::new(),
            excludes: Vec::new(),
            settings: toml::Table::new(),
            command: CommandTemplate::default(),
        }
    }

    /// Returns true if the relative path is included and not excluded
    pub fn matches(&self, relative: &str) -> bool {
        self.include_set.is_match(relative) && !self.exclude_set.is_match(relative)
    }

    /// Digest of everything that influences this formatter's output
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Settings serialized as a JSON object
    pub fn settings_json(&self) -> String {
        serde_json::to_string(&self.settings).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Builder for [`FormatterSpec`]
#[derive(Debug, Clone)]
pub struct FormatterSpecBuilder {
    name: String,
    kind: String,
    enabled: bool,
    priority: i64,
    includes: Vec<String>,
    excludes: Vec<String>,
    settings: toml::Table,
    command: CommandTemplate,
}

impl FormatterSpecBuilder {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn includes<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.includes = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn excludes<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn settings(mut self, settings: toml::Table) -> Self {
        self.settings = settings;
        self
    }

    pub fn command(mut self, command: CommandTemplate) -> Self {
        self.command = command;
        self
    }

    /// Compiles the globs and computes the settings fingerprint
    pub fn build(self) -> Result<FormatterSpec, globset::Error> {
        let include_set = compile_globs(&self.includes)?;
        let exclude_set = compile_globs(&self.excludes)?;
        let fingerprint = fingerprint(&self.kind, &self.command, &self.settings);

        Ok(FormatterSpec {
            name: self.name,
            kind: self.kind,
            enabled: self.enabled,
            priority: self.priority,
            includes: self.includes,
            excludes: self.excludes,
            settings: self.settings,
            command: self.command,
            include_set,
            exclude_set,
            fingerprint,
        })
    }
}

/// Compiles a single glob with `*` allowed to cross directory separators
pub fn compile_glob(pattern: &str) -> Result<Glob, globset::Error> {
    GlobBuilder::new(pattern).literal_separator(false).build()
}

/// Compiles patterns into one set
pub fn compile_globs(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(compile_glob(pattern)?);
    }
    builder.build()
}

fn fingerprint(kind: &str, command: &CommandTemplate, settings: &toml::Table) -> String {
    let canonical = serde_json::json!({
        "kind": kind,
        "program": command.program,
        "format_args": command.format_args,
        "check_args": command.check_args,
        "options": command.options,
        "settings_args": command.settings_args,
        "settings": settings,
    });
    blake3::hash(canonical.to_string().as_bytes())
        .to_hex()
        .to_string()
}

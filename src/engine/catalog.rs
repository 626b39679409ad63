//! Known formatter kinds
//!
//! Every `[[formatter]]` declaration names a catalog entry. The entry
//! supplies the default program and globs, the arguments for each mode, and
//! the schema its `settings` table is validated against.

use thiserror::Error;

use crate::domain::{ChangeReport, CommandTemplate};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingError {
    #[error("unknown setting '{key}'")]
    Unknown { key: String },

    #[error("setting '{key}' must be {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("setting '{key}' must be non-negative, got {value}")]
    Negative { key: String, value: i64 },

    #[error("setting '{key}' must be one of {allowed:?}, got '{value}'")]
    NotAllowed {
        key: String,
        value: String,
        allowed: &'static [&'static str],
    },
}

/// Type constraint on a setting value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    NonNegativeInt,
    Bool,
    String,
    StringList,
    OneOf(&'static [&'static str]),
}

impl SettingKind {
    pub fn describe(&self) -> String {
        match self {
            SettingKind::NonNegativeInt => "integer >= 0".to_string(),
            SettingKind::Bool => "boolean".to_string(),
            SettingKind::String => "string".to_string(),
            SettingKind::StringList => "list of strings".to_string(),
            SettingKind::OneOf(values) => format!("one of {}", values.join(", ")),
        }
    }
}

/// One setting accepted by a catalog entry
#[derive(Debug, Clone, Copy)]
pub struct SettingDef {
    pub key: &'static str,
    pub kind: SettingKind,
    pub description: &'static str,
}

/// A known formatter kind
pub struct CatalogEntry {
    pub name: &'static str,
    pub description: &'static str,

    /// Default executable; `None` means the declaration must set `command`
    pub program: Option<&'static str>,

    /// Served by the `fmtree builtin` subcommand
    pub builtin: bool,

    pub includes: &'static [&'static str],
    pub format_args: &'static [&'static str],
    pub check_args: &'static [&'static str],
    pub change_codes: &'static [i32],
    pub separator: bool,

    /// How check output names the files that would change
    pub report: ChangeReport,

    /// Accepted settings; `None` accepts any table unvalidated
    pub settings: Option<&'static [SettingDef]>,

    render: fn(&toml::Table) -> Vec<String>,
}

impl std::fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("name", &self.name)
            .field("program", &self.program)
            .field("builtin", &self.builtin)
            .finish_non_exhaustive()
    }
}

impl CatalogEntry {
    /// Validates a settings table against this entry's schema
    pub fn validate(&self, settings: &toml::Table) -> Result<(), SettingError> {
        let Some(defs) = self.settings else {
            return Ok(());
        };

        for (key, value) in settings {
            let def = defs
                .iter()
                .find(|d| d.key == key)
                .ok_or_else(|| SettingError::Unknown { key: key.clone() })?;
            check_value(key, def.kind, value)?;
        }

        Ok(())
    }

    /// Turns validated settings into command-line arguments
    pub fn render_settings(&self, settings: &toml::Table) -> Vec<String> {
        (self.render)(settings)
    }

    /// Command template with no user overrides applied
    pub fn command(&self) -> CommandTemplate {
        CommandTemplate {
            program: self.program.unwrap_or_default().to_string(),
            format_args: to_strings(self.format_args),
            check_args: to_strings(self.check_args),
            options: Vec::new(),
            settings_args: Vec::new(),
            separator: self.separator,
            change_codes: self.change_codes.to_vec(),
            builtin: self.builtin,
            report: self.report,
        }
    }

    pub fn default_includes(&self) -> Vec<String> {
        to_strings(self.includes)
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn check_value(key: &str, kind: SettingKind, value: &toml::Value) -> Result<(), SettingError> {
    let wrong = |expected| SettingError::WrongType {
        key: key.to_string(),
        expected,
    };

    match kind {
        SettingKind::NonNegativeInt => match value {
            toml::Value::Integer(n) if *n < 0 => Err(SettingError::Negative {
                key: key.to_string(),
                value: *n,
            }),
            toml::Value::Integer(_) => Ok(()),
            _ => Err(wrong("an integer")),
        },
        SettingKind::Bool => match value {
            toml::Value::Boolean(_) => Ok(()),
            _ => Err(wrong("a boolean")),
        },
        SettingKind::String => match value {
            toml::Value::String(_) => Ok(()),
            _ => Err(wrong("a string")),
        },
        SettingKind::StringList => match value {
            toml::Value::Array(items) if items.iter().all(toml::Value::is_str) => Ok(()),
            _ => Err(wrong("a list of strings")),
        },
        SettingKind::OneOf(allowed) => {
            let text = scalar_text(value).ok_or_else(|| wrong("a string or integer"))?;
            if allowed.contains(&text.as_str()) {
                Ok(())
            } else {
                Err(SettingError::NotAllowed {
                    key: key.to_string(),
                    value: text,
                    allowed,
                })
            }
        }
    }
}

/// Renders a scalar TOML value without quoting
fn scalar_text(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(n) => Some(n.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn flag_value(settings: &toml::Table, key: &str, flag: &str) -> Vec<String> {
    settings
        .get(key)
        .and_then(scalar_text)
        .map(|v| vec![flag.to_string(), v])
        .unwrap_or_default()
}

fn render_none(_: &toml::Table) -> Vec<String> {
    Vec::new()
}

fn render_blank_lines(settings: &toml::Table) -> Vec<String> {
    flag_value(settings, "allowed_blank_lines", "--allowed-blank-lines")
}

fn render_taplo(settings: &toml::Table) -> Vec<String> {
    settings
        .iter()
        .filter_map(|(key, value)| scalar_text(value).map(|v| format!("{key}={v}")))
        .flat_map(|pair| ["--option".to_string(), pair])
        .collect()
}

fn render_rustfmt(settings: &toml::Table) -> Vec<String> {
    flag_value(settings, "edition", "--edition")
}

fn render_nixfmt(settings: &toml::Table) -> Vec<String> {
    settings
        .get("width")
        .and_then(scalar_text)
        .map(|w| vec![format!("--width={w}")])
        .unwrap_or_default()
}

fn render_prettier(settings: &toml::Table) -> Vec<String> {
    let mut args = flag_value(settings, "print_width", "--print-width");
    args.extend(flag_value(settings, "tab_width", "--tab-width"));
    if settings.get("single_quote").and_then(toml::Value::as_bool) == Some(true) {
        args.push("--single-quote".to_string());
    }
    args
}

fn render_shfmt(settings: &toml::Table) -> Vec<String> {
    flag_value(settings, "indent", "-i")
}

const BLANK_LINES_SETTINGS: &[SettingDef] = &[SettingDef {
    key: "allowed_blank_lines",
    kind: SettingKind::NonNegativeInt,
    description: "Maximum consecutive blank lines to keep (default 1)",
}];

const TAPLO_SETTINGS: &[SettingDef] = &[
    SettingDef {
        key: "allowed_blank_lines",
        kind: SettingKind::NonNegativeInt,
        description: "Maximum consecutive blank lines",
    },
    SettingDef {
        key: "column_width",
        kind: SettingKind::NonNegativeInt,
        description: "Target line width",
    },
    SettingDef {
        key: "indent_string",
        kind: SettingKind::String,
        description: "Indentation unit",
    },
    SettingDef {
        key: "reorder_keys",
        kind: SettingKind::Bool,
        description: "Sort keys alphabetically",
    },
];

const RUSTFMT_SETTINGS: &[SettingDef] = &[SettingDef {
    key: "edition",
    kind: SettingKind::OneOf(&["2015", "2018", "2021", "2024"]),
    description: "Rust edition to parse with",
}];

const NIXFMT_SETTINGS: &[SettingDef] = &[SettingDef {
    key: "width",
    kind: SettingKind::NonNegativeInt,
    description: "Maximum line width",
}];

const PRETTIER_SETTINGS: &[SettingDef] = &[
    SettingDef {
        key: "print_width",
        kind: SettingKind::NonNegativeInt,
        description: "Line width to wrap at",
    },
    SettingDef {
        key: "tab_width",
        kind: SettingKind::NonNegativeInt,
        description: "Spaces per indentation level",
    },
    SettingDef {
        key: "single_quote",
        kind: SettingKind::Bool,
        description: "Prefer single quotes",
    },
];

const SHFMT_SETTINGS: &[SettingDef] = &[SettingDef {
    key: "indent",
    kind: SettingKind::NonNegativeInt,
    description: "Indent width, 0 for tabs",
}];

static CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        name: "blank-lines",
        description: "Collapse runs of blank lines (built in)",
        program: Some("blank-lines"),
        builtin: true,
        includes: &[],
        format_args: &[],
        check_args: &["--check"],
        change_codes: &[1],
        separator: true,
        report: ChangeReport::Paths,
        settings: Some(BLANK_LINES_SETTINGS),
        render: render_blank_lines,
    },
    CatalogEntry {
        name: "trailing-whitespace",
        description: "Strip trailing spaces and tabs (built in)",
        program: Some("trailing-whitespace"),
        builtin: true,
        includes: &[],
        format_args: &[],
        check_args: &["--check"],
        change_codes: &[1],
        separator: true,
        report: ChangeReport::Paths,
        settings: Some(&[]),
        render: render_none,
    },
    CatalogEntry {
        name: "end-of-file",
        description: "End files with exactly one newline (built in)",
        program: Some("end-of-file"),
        builtin: true,
        includes: &[],
        format_args: &[],
        check_args: &["--check"],
        change_codes: &[1],
        separator: true,
        report: ChangeReport::Paths,
        settings: Some(&[]),
        render: render_none,
    },
    CatalogEntry {
        name: "taplo",
        description: "TOML formatter",
        program: Some("taplo"),
        builtin: false,
        includes: &["*.toml"],
        format_args: &["format"],
        check_args: &["format", "--check"],
        change_codes: &[1],
        separator: true,
        report: ChangeReport::Paths,
        settings: Some(TAPLO_SETTINGS),
        render: render_taplo,
    },
    CatalogEntry {
        name: "rustfmt",
        description: "Rust formatter",
        program: Some("rustfmt"),
        builtin: false,
        includes: &["*.rs"],
        format_args: &[],
        check_args: &["--check"],
        change_codes: &[1],
        separator: true,
        report: ChangeReport::DiffHeaders,
        settings: Some(RUSTFMT_SETTINGS),
        render: render_rustfmt,
    },
    CatalogEntry {
        name: "nixfmt",
        description: "Nix formatter",
        program: Some("nixfmt"),
        builtin: false,
        includes: &["*.nix"],
        format_args: &[],
        check_args: &["--check"],
        change_codes: &[1],
        separator: true,
        report: ChangeReport::Paths,
        settings: Some(NIXFMT_SETTINGS),
        render: render_nixfmt,
    },
    CatalogEntry {
        name: "prettier",
        description: "Web languages formatter",
        program: Some("prettier"),
        builtin: false,
        includes: &[
            "*.js", "*.jsx", "*.ts", "*.tsx", "*.css", "*.scss", "*.json", "*.md", "*.yaml",
            "*.yml", "*.html",
        ],
        format_args: &["--write"],
        check_args: &["--check"],
        change_codes: &[1],
        separator: true,
        report: ChangeReport::Paths,
        settings: Some(PRETTIER_SETTINGS),
        render: render_prettier,
    },
    CatalogEntry {
        name: "shfmt",
        description: "Shell script formatter",
        program: Some("shfmt"),
        builtin: false,
        includes: &["*.sh", "*.bash"],
        format_args: &["-w"],
        check_args: &["-l"],
        change_codes: &[1],
        separator: true,
        report: ChangeReport::Paths,
        settings: Some(SHFMT_SETTINGS),
        render: render_shfmt,
    },
    CatalogEntry {
        name: "custom",
        description: "Any executable following the fmtree process contract",
        program: None,
        builtin: false,
        includes: &[],
        format_args: &[],
        check_args: &[],
        change_codes: &[1],
        separator: false,
        report: ChangeReport::Paths,
        settings: None,
        render: render_none,
    },
];

/// Looks up a catalog entry by name
pub fn lookup(name: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.name == name)
}

/// All catalog entries in display order
pub fn entries() -> &'static [CatalogEntry] {
    CATALOG
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(src: &str) -> toml::Table {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn lookup_known_and_unknown() {
        assert!(lookup("blank-lines").is_some());
        assert!(lookup("taplo").is_some());
        assert!(lookup("does-not-exist").is_none());
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = entries().iter().map(|e| e.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), entries().len());
    }

    #[test]
    fn negative_integer_is_rejected() {
        let entry = lookup("blank-lines").unwrap();
        let err = entry
            .validate(&table("allowed_blank_lines = -1"))
            .unwrap_err();
        assert_eq!(
            err,
            SettingError::Negative {
                key: "allowed_blank_lines".into(),
                value: -1
            }
        );
        assert!(entry.validate(&table("allowed_blank_lines = 0")).is_ok());
    }

    #[test]
    fn unknown_and_mistyped_settings_are_rejected() {
        let entry = lookup("taplo").unwrap();
        assert!(matches!(
            entry.validate(&table("bogus = 1")),
            Err(SettingError::Unknown { .. })
        ));
        assert!(matches!(
            entry.validate(&table("reorder_keys = \"yes\"")),
            Err(SettingError::WrongType { .. })
        ));
    }

    #[test]
    fn one_of_accepts_integers_and_strings() {
        let entry = lookup("rustfmt").unwrap();
        assert!(entry.validate(&table("edition = 2021")).is_ok());
        assert!(entry.validate(&table("edition = \"2024\"")).is_ok());
        assert!(matches!(
            entry.validate(&table("edition = 2019")),
            Err(SettingError::NotAllowed { .. })
        ));
    }

    #[test]
    fn custom_accepts_anything() {
        let entry = lookup("custom").unwrap();
        assert!(entry.validate(&table("anything = { nested = true }")).is_ok());
    }

    #[test]
    fn renders_settings_as_arguments() {
        let taplo = lookup("taplo").unwrap();
        let args = taplo.render_settings(&table("allowed_blank_lines = 1\nreorder_keys = true"));
        assert_eq!(
            args,
            [
                "--option",
                "allowed_blank_lines=1",
                "--option",
                "reorder_keys=true"
            ]
        );

        let blank = lookup("blank-lines").unwrap();
        assert_eq!(
            blank.render_settings(&table("allowed_blank_lines = 2")),
            ["--allowed-blank-lines", "2"]
        );

        let prettier = lookup("prettier").unwrap();
        assert_eq!(
            prettier.render_settings(&table("single_quote = true\nprint_width = 100")),
            ["--print-width", "100", "--single-quote"]
        );
    }
}

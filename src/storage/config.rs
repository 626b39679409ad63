//! Configuration handling for fmtree
//!
//! Project configuration lives in the marker file at the project root
//! (`fmtree.toml` by default). User defaults live in
//! `~/.config/fmtree/config.toml` (global).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use globset::GlobSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{compile_glob, compile_globs, FormatterSpec, Root};
use crate::engine::catalog::{self, SettingError};

/// Files per formatter invocation when the project does not say otherwise
pub const DEFAULT_BATCH_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Unknown formatter '{name}'")]
    UnknownFormatter { name: String },

    #[error("Formatter '{0}' is declared more than once")]
    DuplicateFormatter(String),

    #[error("Invalid glob '{pattern}' in {context}: {message}")]
    InvalidGlob {
        context: String,
        pattern: String,
        message: String,
    },

    #[error("Invalid settings for formatter '{formatter}': {source}")]
    InvalidSetting {
        formatter: String,
        #[source]
        source: SettingError,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// One `[[formatter]]` declaration as written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatterDecl {
    /// Unique name; also the catalog kind unless `kind` is set
    pub name: String,

    /// Catalog entry to instantiate (defaults to `name`)
    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub enable: bool,

    /// Include globs (defaults to the catalog's)
    #[serde(default)]
    pub includes: Option<Vec<String>>,

    #[serde(default)]
    pub excludes: Vec<String>,

    /// Lower runs first on files claimed by several formatters
    #[serde(default)]
    pub priority: i64,

    /// Executable override
    #[serde(default)]
    pub command: Option<String>,

    /// Extra arguments placed before the file list
    #[serde(default)]
    pub options: Vec<String>,

    /// Replaces the catalog's check-mode arguments
    #[serde(default)]
    pub check_options: Option<Vec<String>>,

    #[serde(default)]
    pub settings: toml::Table,
}

/// Project-level configuration (the marker file)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    /// Globs excluded from walking and from every formatter
    pub excludes: Vec<String>,

    /// Worker pool size
    pub jobs: Option<usize>,

    /// Files per formatter invocation
    pub batch_size: Option<usize>,

    /// Formatter declarations in execution order
    #[serde(rename = "formatter")]
    pub formatters: Vec<FormatterDecl>,
}

impl ProjectConfig {
    /// Parses the raw TOML text of a marker file
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,

    /// Default worker pool size
    pub jobs: Option<usize>,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Validated configuration for one run
#[derive(Debug, Clone)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,

    /// Enabled formatters in execution order
    pub formatters: Vec<Arc<FormatterSpec>>,

    pub global_excludes: GlobSet,
    pub jobs: usize,
    pub batch_size: usize,
}

/// Parses raw configuration into the ordered list of enabled formatters
pub fn load(raw: &str) -> Result<Vec<FormatterSpec>, ConfigError> {
    build_formatters(&ProjectConfig::parse(raw)?)
}

/// Validates every declaration and returns the enabled ones in execution order
///
/// Disabled formatters are validated too. Order is `(priority, declaration index)`.
pub fn build_formatters(project: &ProjectConfig) -> Result<Vec<FormatterSpec>, ConfigError> {
    let mut seen = HashSet::new();
    let mut enabled = Vec::new();

    for decl in &project.formatters {
        if !seen.insert(decl.name.as_str()) {
            return Err(ConfigError::DuplicateFormatter(decl.name.clone()));
        }

        let spec = build_formatter(decl)?;
        if spec.enabled {
            enabled.push(spec);
        }
    }

    enabled.sort_by_key(|spec| spec.priority);
    Ok(enabled)
}

fn build_formatter(decl: &FormatterDecl) -> Result<FormatterSpec, ConfigError> {
    let kind = decl.kind.clone().unwrap_or_else(|| decl.name.clone());
    let entry = catalog::lookup(&kind)
        .ok_or_else(|| ConfigError::UnknownFormatter { name: kind.clone() })?;

    entry
        .validate(&decl.settings)
        .map_err(|source| ConfigError::InvalidSetting {
            formatter: decl.name.clone(),
            source,
        })?;

    let includes = decl
        .includes
        .clone()
        .unwrap_or_else(|| entry.default_includes());
    let context = format!("formatter '{}'", decl.name);
    check_globs(&context, &includes)?;
    check_globs(&context, &decl.excludes)?;

    if decl.enable && includes.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "formatter '{}' has no include globs",
            decl.name
        )));
    }

    let mut command = entry.command();
    match (&decl.command, entry.program) {
        (Some(program), _) => {
            command.program = program.clone();
            command.builtin = false;
        }
        (None, None) => {
            return Err(ConfigError::Invalid(format!(
                "formatter '{}' of kind '{}' requires a 'command'",
                decl.name, kind
            )));
        }
        (None, Some(_)) => {}
    }
    if let Some(check_options) = &decl.check_options {
        command.check_args = check_options.clone();
    }
    command.options = decl.options.clone();
    command.settings_args = entry.render_settings(&decl.settings);

    FormatterSpec::builder(decl.name.clone(), kind)
        .enabled(decl.enable)
        .priority(decl.priority)
        .includes(includes)
        .excludes(decl.excludes.clone())
        .settings(decl.settings.clone())
        .command(command)
        .build()
        .map_err(|e| ConfigError::Invalid(e.to_string()))
}

fn check_globs(context: &str, patterns: &[String]) -> Result<(), ConfigError> {
    for pattern in patterns {
        compile_glob(pattern).map_err(|e| ConfigError::InvalidGlob {
            context: context.to_string(),
            pattern: pattern.clone(),
            message: e.kind().to_string(),
        })?;
    }
    Ok(())
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Config {
    /// Builds a validated configuration from parsed parts
    pub fn from_parts(project: ProjectConfig, global: GlobalConfig) -> Result<Self, ConfigError> {
        let formatters = build_formatters(&project)?
            .into_iter()
            .map(Arc::new)
            .collect();

        check_globs("global excludes", &project.excludes)?;
        let global_excludes =
            compile_globs(&project.excludes).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let jobs = project.jobs.or(global.jobs).unwrap_or_else(default_jobs);
        if jobs == 0 {
            return Err(ConfigError::Invalid("'jobs' must be at least 1".to_string()));
        }

        let batch_size = project.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(ConfigError::Invalid(
                "'batch_size' must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            project,
            global,
            formatters,
            global_excludes,
            jobs,
            batch_size,
        })
    }

    /// Parses project configuration text with default global settings
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Self::from_parts(ProjectConfig::parse(raw)?, GlobalConfig::default())
    }

    /// Loads configuration for a project root from its marker file
    pub fn for_root(root: &Root, marker: &str) -> Result<Self> {
        let global = Self::load_global()?;
        let config_path = root.path().join(marker);

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read project config: {}", config_path.display()))?;

        let project = ProjectConfig::parse(&content)
            .with_context(|| format!("Failed to load {}", config_path.display()))?;

        Self::from_parts(project, global)
            .with_context(|| format!("Invalid configuration in {}", config_path.display()))
    }

    /// Overrides the worker pool size
    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        if let Some(jobs) = jobs.filter(|j| *j > 0) {
            self.jobs = jobs;
        }
        self
    }

    /// Returns true if a relative path is globally excluded
    pub fn is_excluded(&self, relative: &str) -> bool {
        self.global_excludes.is_match(relative)
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "fmtree", "fmtree").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads global configuration
    pub fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        Self::load_global_from(&config_dir.join("config.toml"))
    }

    fn load_global_from(config_path: &Path) -> Result<GlobalConfig> {
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }
}

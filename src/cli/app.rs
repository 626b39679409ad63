//! Main CLI application structure

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use super::output::{Output, OutputFormat};
use super::{builtin_cmd, cache_cmd, run_cmd};
use crate::domain::Mode;
use crate::engine::{catalog, CancellationToken, RunOptions};
use crate::storage::{Config, Project, DEFAULT_MARKER};

#[derive(Parser)]
#[command(name = "fmtree")]
#[command(author, version, about = "Run every formatter a project needs, in one pass")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Directory to start the project root search from
    #[arg(long = "working-dir", short = 'C', global = true, value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// File that marks the project root
    #[arg(long, global = true, env = "FMTREE_MARKER", default_value = DEFAULT_MARKER)]
    pub marker: String,

    /// Number of parallel formatter batches
    #[arg(long, short = 'j', global = true)]
    pub jobs: Option<usize>,

    /// Ignore and do not update the cache
    #[arg(long, global = true)]
    pub no_cache: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Format every matched file in place
    Format,

    /// Report files that would change, without modifying them
    Check,

    /// Write a starter fmtree.toml
    Init {
        /// Directory to initialize (defaults to the working directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// List known formatter kinds and their settings
    Formatters,

    /// Inspect or reset the cache
    #[command(subcommand)]
    Cache(cache_cmd::CacheCommands),

    /// Built-in formatter process (internal use)
    #[command(hide = true)]
    Builtin {
        /// Built-in kind (blank-lines, trailing-whitespace, end-of-file)
        kind: String,

        /// Report files that would change instead of rewriting them
        #[arg(long)]
        check: bool,

        #[arg(long, value_name = "N")]
        allowed_blank_lines: Option<usize>,

        /// Files to process
        files: Vec<PathBuf>,
    },
}

/// Main entry point for the CLI
pub fn run() -> Result<ExitCode> {
    let Cli {
        format,
        verbose,
        working_dir,
        marker,
        jobs,
        no_cache,
        command,
    } = Cli::parse();
    init_logging(verbose);

    let working_dir = working_dir.unwrap_or_else(|| PathBuf::from("."));
    let output = Output::new(output_format(format));

    log::debug!("fmtree {} starting", env!("CARGO_PKG_VERSION"));

    let options = RunOptions {
        working_dir,
        marker,
        jobs,
        use_cache: !no_cache,
    };

    match command {
        Commands::Format => run_pass(Mode::Format, options, &output),
        Commands::Check => run_pass(Mode::Check, options, &output),

        Commands::Init { path } => {
            let dir = options.working_dir.join(path);
            let (config_path, created) = Project::init(&dir, &options.marker)?;
            if created {
                output.success(&format!("Created {}", config_path.display()));
            } else {
                output.success(&format!(
                    "{} already exists; left unchanged",
                    config_path.display()
                ));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Formatters => {
            list_formatters(&output);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Cache(cmd) => {
            cache_cmd::run(cmd, &options.working_dir, &options.marker, &output)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Builtin {
            kind,
            check,
            allowed_blank_lines,
            files,
        } => builtin_cmd::run(&kind, check, allowed_blank_lines, &files),
    }
}

fn run_pass(mode: Mode, options: RunOptions, output: &Output) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        log::warn!("Failed to install Ctrl-C handler: {}", e);
    }

    run_cmd::run(mode, options, cancel, output)
}

/// Log level from `-v` count; `RUST_LOG` takes precedence
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .try_init();
}

fn output_format(flag: Option<OutputFormat>) -> OutputFormat {
    if let Some(format) = flag {
        return format;
    }

    match Config::load_global() {
        Ok(global) => global.default_format.into(),
        Err(e) => {
            log::warn!("Ignoring global config: {:#}", e);
            OutputFormat::default()
        }
    }
}

fn list_formatters(output: &Output) {
    let entries = catalog::entries();

    if output.is_json() {
        let items: Vec<_> = entries
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "name": entry.name,
                    "description": entry.description,
                    "program": entry.program,
                    "builtin": entry.builtin,
                    "includes": entry.includes,
                    "settings": entry.settings.map(|defs| {
                        defs.iter()
                            .map(|d| serde_json::json!({
                                "key": d.key,
                                "type": d.kind.describe(),
                                "description": d.description,
                            }))
                            .collect::<Vec<_>>()
                    }),
                })
            })
            .collect();
        output.data(&items);
        return;
    }

    for entry in entries {
        let program = match (entry.builtin, entry.program) {
            (true, _) => "built in".to_string(),
            (false, Some(program)) => program.to_string(),
            (false, None) => "set 'command'".to_string(),
        };
        output.row(&[entry.name, program.as_str(), entry.description]);

        if !entry.includes.is_empty() {
            output.detail(&format!("includes: {}", entry.includes.join(", ")));
        }
        match entry.settings {
            Some(defs) => {
                for def in defs {
                    output.detail(&format!(
                        "{} ({}): {}",
                        def.key,
                        def.kind.describe(),
                        def.description
                    ));
                }
            }
            None => output.detail("settings: any (passed through FMTREE_SETTINGS)"),
        }
    }
}

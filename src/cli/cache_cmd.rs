//! Cache CLI commands

use std::path::Path;

use anyhow::Result;
use clap::Subcommand;

use super::output::Output;
use crate::storage::{locate_root, Cache};

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show cache status
    Status,

    /// Forget every cached result
    Clear,
}

pub fn run(cmd: CacheCommands, start: &Path, marker: &str, output: &Output) -> Result<()> {
    let root = locate_root(start, marker)?;
    let cache = Cache::open(&root)?;

    match cmd {
        CacheCommands::Status => status(&cache, output),
        CacheCommands::Clear => clear(&cache, output),
    }
}

fn status(cache: &Cache, output: &Output) -> Result<()> {
    let stats = cache.stats();

    if output.is_json() {
        output.data(&stats);
        return Ok(());
    }

    output.line("Cache Status");
    output.line(&"=".repeat(40));
    if let Some(path) = &stats.path {
        output.line(&format!("Path: {}", path.display()));
    }
    output.line(&format!("Entries: {}", stats.entries));
    output.line(&format!("Formatters: {}", stats.formatters));
    match stats.last_confirmed {
        Some(at) => output.line(&format!(
            "Last confirmed: {}",
            at.format("%Y-%m-%d %H:%M:%S UTC")
        )),
        None => output.line("Last confirmed: never"),
    }

    Ok(())
}

fn clear(cache: &Cache, output: &Output) -> Result<()> {
    let removed = cache.len();
    cache.clear()?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "cleared": true,
            "entries": removed,
        }));
    } else {
        output.success(&format!("Cleared {} cache entries", removed));
    }

    Ok(())
}

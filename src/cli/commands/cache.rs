//! Cache command - inspect the artifact cache

use crate::cache::{format_bytes, ArtifactCache, CacheEntry, CacheState};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::error::RbwasmResult;
use crate::workspace::Workspace;
use console::style;
use std::path::Path;

/// Execute the cache command
pub async fn execute(args: CacheArgs, workspace_root: &Path) -> RbwasmResult<()> {
    let cache = ArtifactCache::new(Workspace::create(workspace_root, false)?);

    match args.action {
        CacheAction::List { format } => list_entries(&cache, format),
    }
}

fn list_entries(cache: &ArtifactCache, format: OutputFormat) -> RbwasmResult<()> {
    let entries = cache.entries()?;

    match format {
        OutputFormat::Json => print_entries_json(&entries)?,
        _ if entries.is_empty() => {
            println!("No cache entries in {}", cache.workspace().root().display());
        }
        OutputFormat::Table => print_entries_table(&entries),
        OutputFormat::Plain => print_entries_plain(&entries),
    }
    Ok(())
}

fn print_entries_table(entries: &[CacheEntry]) {
    println!(
        "{:<44} {:<10} {:<10} {:>10} {:<17}",
        "SLOT", "KIND", "STATE", "SIZE", "INSTALLED"
    );
    println!("{}", "-".repeat(95));

    for entry in entries {
        let state_display = match entry.state {
            CacheState::Installed => style("installed").green().to_string(),
            CacheState::Corrupt => style("corrupt").red().to_string(),
            CacheState::Absent => style("absent").dim().to_string(),
        };
        let installed = entry
            .installed_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<44} {:<10} {:<10} {:>10} {:<17}",
            entry.slot,
            entry.kind,
            state_display,
            format_bytes(entry.size_bytes),
            installed
        );
    }

    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    println!();
    let noun = if entries.len() == 1 { "entry" } else { "entries" };
    println!("Total: {} {} ({})", entries.len(), noun, format_bytes(total));
}

fn print_entries_json(entries: &[CacheEntry]) -> RbwasmResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson<'a> {
        slot: &'a str,
        kind: String,
        path: String,
        state: CacheState,
        size_bytes: u64,
        installed_at: Option<String>,
    }

    let json: Vec<EntryJson<'_>> = entries
        .iter()
        .map(|e| EntryJson {
            slot: &e.slot,
            kind: e.kind.to_string(),
            path: e.path.display().to_string(),
            state: e.state,
            size_bytes: e.size_bytes,
            installed_at: e.installed_at.map(|t| t.to_rfc3339()),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn print_entries_plain(entries: &[CacheEntry]) {
    for entry in entries {
        println!("{}/{}", entry.kind, entry.slot);
    }
}

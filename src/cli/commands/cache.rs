//! Cache command - inspect and maintain the snapshot cache

use super::{blocking, open_store};
use crate::cache::ManifestEntry;
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::error::RepoCacheResult;
use console::style;
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> RepoCacheResult<()> {
    let root = config.cache_root();

    match args.action {
        CacheAction::Path => {
            println!("{}", root.display());
            Ok(())
        }
        CacheAction::Info { format } => show_info(&root, format).await,
        CacheAction::Prune { keep } => prune(&root, keep.unwrap_or(config.cache.keep_weeks)).await,
        CacheAction::Clear { yes } => clear_all(&root, yes).await,
        CacheAction::ClearRepo { owner, repo } => clear_repo(&root, owner, repo).await,
    }
}

#[derive(Serialize)]
struct EntryJson {
    key: String,
    latest_week: Option<String>,
    weeks: Vec<String>,
    updated_at: String,
}

async fn show_info(root: &Path, format: OutputFormat) -> RepoCacheResult<()> {
    let mut store = open_store(root.to_path_buf()).await?;
    let entries = blocking(move || store.list_entries()).await?;

    match format {
        OutputFormat::Table => print_entry_table(root, &entries),
        OutputFormat::Json => {
            let json: Vec<EntryJson> = entries
                .into_iter()
                .map(|(key, entry)| EntryJson {
                    key,
                    latest_week: entry.latest_week,
                    weeks: entry.weeks,
                    updated_at: entry.updated_at.to_rfc3339(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

fn print_entry_table(root: &Path, entries: &[(String, ManifestEntry)]) {
    println!("Cache root: {}", root.display());
    println!();

    if entries.is_empty() {
        println!("No cached snapshots.");
        return;
    }

    println!("{:<50} {:>6} {:<28} {:<17}", "KEY", "WEEKS", "LATEST", "UPDATED");
    println!("{}", "-".repeat(104));
    for (key, entry) in entries {
        println!(
            "{:<50} {:>6} {:<28} {:<17}",
            key,
            entry.weeks.len(),
            entry.latest_week.as_deref().unwrap_or("-"),
            entry.updated_at.format("%Y-%m-%d %H:%M")
        );
    }

    let snapshots: usize = entries.iter().map(|(_, e)| e.weeks.len()).sum();
    println!();
    println!("Total: {} key(s), {} snapshot(s)", entries.len(), snapshots);
}

async fn prune(root: &Path, keep_weeks: usize) -> RepoCacheResult<()> {
    let mut store = open_store(root.to_path_buf()).await?;
    let removed = blocking(move || store.prune(keep_weeks)).await?;

    println!(
        "{} removed {} snapshot(s), keeping the newest {} per key",
        style("✓").green(),
        removed,
        keep_weeks
    );
    Ok(())
}

async fn clear_all(root: &Path, skip_confirm: bool) -> RepoCacheResult<()> {
    let mut store = open_store(root.to_path_buf()).await?;

    if !skip_confirm {
        print!("Remove every snapshot under {}? [y/N] ", root.display());
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    blocking(move || store.clear()).await?;
    println!("{} cache cleared", style("✓").green());
    Ok(())
}

async fn clear_repo(root: &Path, owner: String, repo: String) -> RepoCacheResult<()> {
    let mut store = open_store(root.to_path_buf()).await?;
    let label = format!("{}/{}", owner, repo);
    let removed = blocking(move || store.clear_repository_cache(&owner, &repo)).await?;

    if removed == 0 {
        println!("No snapshots cached for {}.", label);
    } else {
        println!("{} removed {} snapshot(s) for {}", style("✓").green(), removed, label);
    }
    Ok(())
}

//! Status command - report cache freshness

use super::{blocking, open_store};
use crate::cache::SnapshotStore;
use crate::cli::args::{OutputFormat, StatusArgs};
use crate::config::Config;
use crate::error::{RepoCacheError, RepoCacheResult};
use crate::refresh::REPOSITORIES;
use crate::status::{get_cache_statistics, CacheStatistics, CacheStatus, CacheStatusTracker};
use crate::upstream::RepoRef;
use console::{pad_str, style, Alignment};
use serde::Serialize;

/// Execute the status command
pub async fn execute(args: StatusArgs, config: &Config) -> RepoCacheResult<()> {
    let mut store = open_store(config.cache_root()).await?;
    let StatusArgs {
        owner,
        repo,
        pushed_at,
        format,
    } = args;

    match repo {
        Some(repo) => {
            let status = blocking(move || {
                CacheStatusTracker::new(&mut store).get_repository_cache_status(
                    &owner,
                    &repo,
                    pushed_at.as_deref(),
                )
            })
            .await?;
            match format {
                OutputFormat::Table => print_status(&status),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
            }
        }
        None => {
            let report = blocking(move || owner_report(&mut store, &owner)).await?;
            match format {
                OutputFormat::Table => print_owner_report(&report),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct OwnerReport {
    owner: String,
    statistics: CacheStatistics,
    repositories: Vec<RepoLine>,
}

#[derive(Serialize)]
struct RepoLine {
    name: String,
    /// `None` when the listed `pushed_at` could not be parsed
    status: Option<CacheStatus>,
}

fn owner_report(store: &mut SnapshotStore, owner: &str) -> RepoCacheResult<OwnerReport> {
    let repos: Vec<RepoRef> = store
        .get_as(REPOSITORIES, owner, None, None)?
        .ok_or_else(|| {
            RepoCacheError::User(format!(
                "No cached repository listing for {owner}. Run: repocache refresh {owner}"
            ))
        })?;

    let statuses = CacheStatusTracker::new(store).statuses(owner, &repos)?;
    let statistics = get_cache_statistics(statuses.iter().filter_map(|(_, s)| s.as_ref()));
    Ok(OwnerReport {
        owner: owner.to_string(),
        statistics,
        repositories: statuses
            .into_iter()
            .map(|(name, status)| RepoLine { name, status })
            .collect(),
    })
}

fn print_status(status: &CacheStatus) {
    let verdict = if status.refresh_needed {
        style("refresh needed").yellow().bold()
    } else {
        style("up to date").green().bold()
    };
    println!("Status:        {}", verdict);
    for reason in &status.refresh_reasons {
        println!("  {} {}", style("•").yellow(), reason.as_str());
    }
    if let Some(week) = &status.push_week {
        println!("Push key:      {}", week);
    }
    println!("Current week:  {}", status.current_week);
    match (status.cache_date, status.cache_age_hours) {
        (Some(date), Some(age)) => println!(
            "Cached:        {} ({:.1}h ago)",
            date.format("%Y-%m-%d %H:%M"),
            age
        ),
        _ => println!("Cached:        {}", style("never").dim()),
    }
    println!();

    println!("{:<18} {:<8} {:<18} {:>8}", "CATEGORY", "CACHED", "WRITTEN", "AGE");
    println!("{}", "-".repeat(56));
    for (category, file) in &status.cache_files {
        let cached = if file.exists {
            style("yes").green().to_string()
        } else {
            style("no").dim().to_string()
        };
        let written = file
            .timestamp
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let age = file
            .age_hours
            .map(|h| format!("{:.1}h", h))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<18} {} {:<18} {:>8}",
            category.as_str(),
            pad(&cached, 8),
            written,
            age
        );
    }
}

fn print_owner_report(report: &OwnerReport) {
    if report.repositories.is_empty() {
        println!("No repositories listed for {}.", report.owner);
        return;
    }

    println!("{:<40} {:<16} {}", "REPOSITORY", "STATE", "REASONS");
    println!("{}", "-".repeat(80));
    for line in &report.repositories {
        let (state, reasons) = match &line.status {
            Some(status) if status.refresh_needed => (
                style("refresh needed").yellow().to_string(),
                status
                    .refresh_reasons
                    .iter()
                    .map(|r| r.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            Some(_) => (style("up to date").green().to_string(), String::new()),
            None => (style("unknown").dim().to_string(), "invalid pushed_at".to_string()),
        };
        println!("{:<40} {} {}", line.name, pad(&state, 16), reasons);
    }

    let stats = &report.statistics;
    println!();
    println!(
        "Total: {}  cached: {} ({:.1}%)  needs refresh: {} ({:.1}%)  up to date: {}",
        stats.total_repositories,
        stats.cached_repositories,
        stats.cache_hit_rate,
        stats.needs_refresh,
        stats.refresh_rate,
        stats.up_to_date
    );
}

/// Left-align by visible width; `{:<N}` would count escape codes
fn pad(styled: &str, width: usize) -> String {
    pad_str(styled, width, Alignment::Left, None).into_owned()
}

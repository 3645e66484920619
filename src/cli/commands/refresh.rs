//! Refresh command - bring an owner's cached data up to date

use super::{blocking, open_store};
use crate::cli::args::{OutputFormat, RefreshArgs, RepoSpec};
use crate::config::Config;
use crate::error::{RepoCacheError, RepoCacheResult};
use crate::refresh::{CacheManager, Category, RefreshSummary};
use crate::upstream::{AnthropicSummarizer, GithubClient, GithubCredentials, RepoRef, Summarizer};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{debug, warn};

/// Execute the refresh command
pub async fn execute(args: RefreshArgs, config: &Config) -> RepoCacheResult<()> {
    let token = GithubCredentials::resolve(&config.github).await?;
    let upstream = GithubClient::new(&config.github, token);

    let categories = if args.categories.is_empty() {
        config.refresh.categories.clone()
    } else {
        args.categories.clone()
    };
    let include_ai = wants_summaries(args.summaries, config, &categories);
    let summarizer = if include_ai {
        Some(AnthropicSummarizer::from_config(&config.summarizer)?)
    } else {
        None
    };
    let recent_commits = config.github.recent_commits;
    let mut store = open_store(config.cache_root()).await?;

    let bar = create_progress_bar(args.format);
    let progress = bar.clone();
    let RefreshArgs {
        owner,
        repos: specs,
        force,
        format,
        ..
    } = args;

    let summary = blocking(move || {
        let mut manager = CacheManager::new(&mut store, &upstream)
            .with_categories(categories)
            .with_recent_commit_limit(recent_commits);
        if let Some(summarizer) = &summarizer {
            manager = manager.with_summarizer(summarizer as &dyn Summarizer);
        }

        progress.set_message(format!("Listing {}", owner));
        let repos = resolve_repositories(&mut manager, &owner, specs)?;
        progress.set_length(repos.len() as u64);

        manager.refresh_user_data_with_progress(&owner, &repos, force, include_ai, |i, _, name| {
            progress.set_position(i as u64);
            progress.set_message(name.to_string());
        })
    })
    .await;
    bar.finish_and_clear();
    let summary = summary?;

    match format {
        OutputFormat::Table => print_summary(&summary),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    if summary.repos_failed > 0 {
        return Err(RepoCacheError::User(format!(
            "{} of {} repositories failed to refresh",
            summary.repos_failed, summary.total_repos
        )));
    }
    Ok(())
}

/// Repositories to refresh: the full listing, or the `--repo` selection.
///
/// Whether the run needs a summarizer. Tracking `ai_summary` counts as asking.
fn wants_summaries(flag: bool, config: &Config, categories: &[Category]) -> bool {
    flag
        || config.refresh.include_ai_summaries
        || config.summarizer.enabled
        || categories.contains(&Category::AiSummary)
}

/// Selected repositories without an explicit push timestamp take it from
/// the listing, which is fetched at most once.
fn resolve_repositories(
    manager: &mut CacheManager<'_>,
    owner: &str,
    specs: Vec<RepoSpec>,
) -> RepoCacheResult<Vec<RepoRef>> {
    if specs.is_empty() {
        return manager.list_repositories(owner);
    }

    let listing = if specs.iter().any(|s| s.pushed_at.is_none()) {
        manager.list_repositories(owner)?
    } else {
        Vec::new()
    };

    Ok(specs
        .into_iter()
        .map(|spec| match spec.pushed_at {
            Some(pushed_at) => RepoRef::new(spec.name, Some(&pushed_at)),
            None => match listing.iter().find(|r| r.name == spec.name) {
                Some(found) => found.clone(),
                None => {
                    warn!("{} is not in {}'s repository listing", spec.name, owner);
                    RepoRef::new(spec.name, None)
                }
            },
        })
        .collect())
}

fn create_progress_bar(format: OutputFormat) -> ProgressBar {
    // JSON output stays machine-readable
    if format == OutputFormat::Json {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    match ProgressStyle::default_bar().template("{spinner:.cyan} [{pos}/{len}] {bar:30.cyan/dim} {msg}") {
        Ok(bar_style) => pb.set_style(bar_style.progress_chars("━╸─")),
        Err(e) => debug!("Falling back to the default progress style: {}", e),
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_summary(summary: &RefreshSummary) {
    for result in summary.results.iter().filter(|r| r.is_error()) {
        println!(
            "  {} {} {}: {}",
            style("✗").red(),
            result.repo_name,
            result.category,
            result.error.as_deref().unwrap_or_default()
        );
    }
    let summaries = summary
        .results
        .iter()
        .filter(|r| r.category == Category::AiSummary && r.refreshed)
        .count();

    println!(
        "{} {} repositories: {} refreshed, {} unchanged, {} failed, {} skipped",
        if summary.repos_failed == 0 {
            style("✓").green()
        } else {
            style("!").yellow()
        },
        summary.total_repos,
        summary.repos_refreshed,
        summary.repos_unchanged,
        summary.repos_failed,
        summary.repos_skipped
    );
    if summaries > 0 {
        println!("  {} summaries generated", summaries);
    }
    println!("  {} API calls", summary.api_calls_made);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_category_enables_summarizer() {
        let mut config = Config::default();
        assert!(!wants_summaries(false, &config, &Category::ESSENTIAL));
        assert!(wants_summaries(false, &config, &[Category::AiSummary]));
        assert!(wants_summaries(true, &config, &[]));

        config.refresh.categories = vec![Category::Languages, Category::AiSummary];
        let categories = config.refresh.categories.clone();
        assert!(wants_summaries(false, &config, &categories));
    }
}

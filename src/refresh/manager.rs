//! Per-category refreshers and the batch driver

use crate::cache::{current_week, parse_pushed_at, sanitize_timestamp, SnapshotStore};
use crate::error::{RepoCacheError, RepoCacheResult};
use crate::refresh::{AiSummaryRecord, Category, RefreshResult, RefreshSummary};
use crate::upstream::{
    CommitCounts, CommitRecord, RepoRef, SummaryRequest, Summarizer, TechnologyStack,
    UpstreamClient,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Owner-wide category holding the last repository listing
pub const REPOSITORIES: &str = "repositories";

const DEFAULT_RECENT_COMMITS: usize = 200;

/// Refreshes cached repository data from the upstream collaborators
pub struct CacheManager<'a> {
    store: &'a mut SnapshotStore,
    upstream: &'a dyn UpstreamClient,
    summarizer: Option<&'a dyn Summarizer>,
    categories: BTreeSet<Category>,
    recent_commit_limit: usize,
    api_calls: u64,
}

impl<'a> CacheManager<'a> {
    pub fn new(store: &'a mut SnapshotStore, upstream: &'a dyn UpstreamClient) -> Self {
        Self {
            store,
            upstream,
            summarizer: None,
            categories: Category::DEFAULT_REFRESH.into_iter().collect(),
            recent_commit_limit: DEFAULT_RECENT_COMMITS,
            api_calls: 0,
        }
    }

    /// Enable AI summaries
    pub fn with_summarizer(mut self, summarizer: &'a dyn Summarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Categories tracked by batch refresh
    pub fn with_categories(mut self, categories: impl IntoIterator<Item = Category>) -> Self {
        self.categories = categories.into_iter().collect();
        self
    }

    /// Length of the cached recent commit list
    pub fn with_recent_commit_limit(mut self, limit: usize) -> Self {
        self.recent_commit_limit = limit;
        self
    }

    /// Collaborator calls made since the last batch started
    pub fn api_calls(&self) -> u64 {
        self.api_calls
    }

    /// Whether `category` has no snapshot for this exact push
    pub fn needs_refresh(
        &mut self,
        owner: &str,
        repo: &str,
        category: Category,
        current_pushed_at: DateTime<Utc>,
    ) -> RepoCacheResult<bool> {
        let key = sanitize_timestamp(current_pushed_at);
        Ok(self
            .store
            .get(category.as_str(), owner, Some(repo), Some(&key))?
            .is_none())
    }

    /// Refresh one category
    pub fn refresh(
        &mut self,
        owner: &str,
        repo: &str,
        pushed_at: DateTime<Utc>,
        category: Category,
    ) -> RepoCacheResult<RefreshResult> {
        match category {
            Category::CommitsStats => self.refresh_commits_stats(owner, repo, pushed_at),
            Category::CommitCounts => self.refresh_commit_counts(owner, repo, pushed_at),
            Category::Languages => self.refresh_languages(owner, repo, pushed_at),
            Category::Readme => self.refresh_readme(owner, repo, pushed_at),
            Category::DependencyFiles => self.refresh_dependency_files(owner, repo, pushed_at),
            Category::AiSummary => self.refresh_ai_summary(owner, repo, pushed_at),
        }
    }

    pub fn refresh_commit_counts(
        &mut self,
        owner: &str,
        repo: &str,
        pushed_at: DateTime<Utc>,
    ) -> RepoCacheResult<RefreshResult> {
        self.refresh_with(owner, repo, pushed_at, Category::CommitCounts, |upstream| {
            upstream.commit_counts(owner, repo)
        })
    }

    pub fn refresh_commits_stats(
        &mut self,
        owner: &str,
        repo: &str,
        pushed_at: DateTime<Utc>,
    ) -> RepoCacheResult<RefreshResult> {
        let limit = self.recent_commit_limit;
        self.refresh_with(owner, repo, pushed_at, Category::CommitsStats, |upstream| {
            upstream.recent_commits(owner, repo, limit)
        })
    }

    pub fn refresh_languages(
        &mut self,
        owner: &str,
        repo: &str,
        pushed_at: DateTime<Utc>,
    ) -> RepoCacheResult<RefreshResult> {
        self.refresh_with(owner, repo, pushed_at, Category::Languages, |upstream| {
            upstream.languages(owner, repo)
        })
    }

    pub fn refresh_readme(
        &mut self,
        owner: &str,
        repo: &str,
        pushed_at: DateTime<Utc>,
    ) -> RepoCacheResult<RefreshResult> {
        self.refresh_with(owner, repo, pushed_at, Category::Readme, |upstream| {
            upstream.readme(owner, repo)
        })
    }

    pub fn refresh_dependency_files(
        &mut self,
        owner: &str,
        repo: &str,
        pushed_at: DateTime<Utc>,
    ) -> RepoCacheResult<RefreshResult> {
        self.refresh_with(owner, repo, pushed_at, Category::DependencyFiles, |upstream| {
            upstream.dependency_files(owner, repo)
        })
    }

    /// Summarize a repository from its cached inputs.
    ///
    /// Stale inputs are refreshed first. The summary is cached only when the
    /// summarizer returns non-empty text.
    pub fn refresh_ai_summary(
        &mut self,
        owner: &str,
        repo: &str,
        pushed_at: DateTime<Utc>,
    ) -> RepoCacheResult<RefreshResult> {
        let category = Category::AiSummary;
        let key = sanitize_timestamp(pushed_at);

        match self.store.get(category.as_str(), owner, Some(repo), Some(&key)) {
            Ok(Some(_)) => return Ok(RefreshResult::cached(repo, category)),
            Ok(None) => {}
            Err(e) => return self.record(repo, category, Err(e)),
        }

        let Some(summarizer) = self.summarizer else {
            return Ok(RefreshResult::failed(repo, category, "no summarizer configured"));
        };

        for input in Category::SUMMARY_INPUTS {
            match self.needs_refresh(owner, repo, input, pushed_at) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => return self.record(repo, category, Err(e)),
            }
            let result = self.refresh(owner, repo, pushed_at, input)?;
            if let Some(error) = result.error {
                return Ok(input_failed(repo, input, &error));
            }
        }

        let request = match self.summary_request(owner, repo, &key) {
            Ok(request) => request,
            Err(e) => return self.record(repo, category, Err(e)),
        };
        self.api_calls += 1;
        let output = match summarizer.summarize(&request) {
            Ok(output) => output,
            Err(e) => return self.record(repo, category, Err(e)),
        };

        if output.text.trim().is_empty() {
            warn!("Summarizer returned an empty summary for {}", repo);
            return Ok(RefreshResult::failed(repo, category, "empty summary"));
        }

        let record = AiSummaryRecord {
            summary: output.text,
            model: output.model,
            tokens_used: output.tokens_used,
            confidence_score: output.confidence_score,
            tech_stack: request.tech_stack,
            generated_at: Utc::now(),
        };
        let outcome = self.store.set_as(
            category.as_str(),
            owner,
            &record,
            Some(repo),
            Some(&key),
            Some(snapshot_metadata(owner, repo, category, pushed_at)),
        );
        self.record(repo, category, outcome)
    }

    /// Refresh a set of categories, defaulting to commit counts and languages.
    ///
    /// Requesting `AiSummary` refreshes every category, summary last.
    pub fn refresh_repository(
        &mut self,
        owner: &str,
        repo: &str,
        pushed_at: DateTime<Utc>,
        categories: Option<&[Category]>,
    ) -> RepoCacheResult<Vec<RefreshResult>> {
        let mut selected: BTreeSet<Category> = match categories {
            Some(categories) => categories.iter().copied().collect(),
            None => Category::DEFAULT_REFRESH.into_iter().collect(),
        };
        if selected.contains(&Category::AiSummary) {
            selected.extend(Category::ALL);
        }
        self.refresh_set(owner, repo, pushed_at, &selected)
    }

    /// Refresh in category order. The summary is skipped once one of its
    /// inputs has failed, so that input isn't fetched a second time.
    fn refresh_set(
        &mut self,
        owner: &str,
        repo: &str,
        pushed_at: DateTime<Utc>,
        categories: &BTreeSet<Category>,
    ) -> RepoCacheResult<Vec<RefreshResult>> {
        let mut results: Vec<RefreshResult> = Vec::with_capacity(categories.len());
        for &category in categories {
            let failed_input = (category == Category::AiSummary)
                .then(|| {
                    results.iter().find_map(|r| {
                        let error = r.error.as_deref()?;
                        Category::SUMMARY_INPUTS
                            .contains(&r.category)
                            .then_some((r.category, error))
                    })
                })
                .flatten();
            let result = match failed_input {
                Some((input, error)) => input_failed(repo, input, error),
                None => self.refresh(owner, repo, pushed_at, category)?,
            };
            results.push(result);
        }
        Ok(results)
    }

    /// Refresh every repository whose tracked categories are stale.
    pub fn refresh_user_data(
        &mut self,
        owner: &str,
        repos: &[RepoRef],
        force_refresh: bool,
        include_ai_summaries: bool,
    ) -> RepoCacheResult<RefreshSummary> {
        self.refresh_user_data_with_progress(
            owner,
            repos,
            force_refresh,
            include_ai_summaries,
            |_, _, _| {},
        )
    }

    /// `refresh_user_data`, reporting `(index, total, repo)` before each repository
    pub fn refresh_user_data_with_progress<F>(
        &mut self,
        owner: &str,
        repos: &[RepoRef],
        force_refresh: bool,
        include_ai_summaries: bool,
        mut progress: F,
    ) -> RepoCacheResult<RefreshSummary>
    where
        F: FnMut(usize, usize, &str),
    {
        info!("Starting cache refresh for {} repositories", repos.len());
        self.api_calls = 0;

        let mut tracked = self.categories.clone();
        if include_ai_summaries || tracked.contains(&Category::AiSummary) {
            tracked.extend(Category::ALL);
        }

        let total = repos.len();
        let mut summary = RefreshSummary {
            total_repos: total,
            ..RefreshSummary::default()
        };

        for (i, repo) in repos.iter().enumerate() {
            progress(i, total, &repo.name);
            let position = i + 1;

            let Some(raw) = repo.pushed_at.as_deref() else {
                debug!("[{}/{}] Skipping {} - no pushed_at", position, total, repo.name);
                summary.repos_skipped += 1;
                continue;
            };
            let pushed_at = match parse_pushed_at(raw) {
                Ok(ts) => ts,
                Err(e) => {
                    warn!("Failed to parse pushed_at for {}: {}", repo.name, e);
                    summary.repos_skipped += 1;
                    continue;
                }
            };

            // Categories whose cache check failed are reported, not refreshed
            let mut results = Vec::new();
            let selected: BTreeSet<Category> = if force_refresh {
                tracked.clone()
            } else {
                let mut stale = BTreeSet::new();
                for &category in &tracked {
                    match self.needs_refresh(owner, &repo.name, category, pushed_at) {
                        Ok(true) => {
                            stale.insert(category);
                        }
                        Ok(false) => {}
                        Err(e) => results.push(self.record(&repo.name, category, Err(e))?),
                    }
                }
                stale
            };

            if selected.is_empty() && results.is_empty() {
                debug!("[{}/{}] OK {} - cache valid", position, total, repo.name);
                summary.repos_unchanged += 1;
                continue;
            }

            info!("[{}/{}] Refreshing {}", position, total, repo.name);
            results.extend(self.refresh_set(owner, &repo.name, pushed_at, &selected)?);
            if results.iter().any(RefreshResult::is_error) {
                summary.repos_failed += 1;
            } else {
                summary.repos_refreshed += 1;
            }
            summary.results.extend(results);
        }

        summary.api_calls_made = self.api_calls;
        info!(
            refreshed = summary.repos_refreshed,
            unchanged = summary.repos_unchanged,
            failed = summary.repos_failed,
            skipped = summary.repos_skipped,
            api_calls = summary.api_calls_made,
            "Cache refresh complete"
        );
        Ok(summary)
    }

    /// List an owner's repositories and remember the listing.
    ///
    /// When the upstream call fails, the most recent cached listing is
    /// returned instead, if there is one.
    pub fn list_repositories(&mut self, owner: &str) -> RepoCacheResult<Vec<RepoRef>> {
        self.api_calls += 1;
        match self.upstream.repositories(owner) {
            Ok(repos) => {
                let stored = self.store.set_as(
                    REPOSITORIES,
                    owner,
                    &repos,
                    None,
                    Some(&current_week()),
                    Some(json!({"owner": owner, "count": repos.len()})),
                );
                match stored {
                    Err(e @ RepoCacheError::LockAcquire { .. }) => return Err(e),
                    Err(e) => warn!("Failed to cache repository listing for {}: {}", owner, e),
                    Ok(()) => {}
                }
                Ok(repos)
            }
            Err(e) => match self.store.get_as::<Vec<RepoRef>>(REPOSITORIES, owner, None, None)? {
                Some(cached) => {
                    warn!(
                        "Listing repositories for {} failed ({}); using cached listing",
                        owner, e
                    );
                    Ok(cached)
                }
                None => Err(e),
            },
        }
    }

    /// Cache-check, fetch, store
    fn refresh_with<T, F>(
        &mut self,
        owner: &str,
        repo: &str,
        pushed_at: DateTime<Utc>,
        category: Category,
        fetch: F,
    ) -> RepoCacheResult<RefreshResult>
    where
        T: Serialize,
        F: FnOnce(&dyn UpstreamClient) -> RepoCacheResult<T>,
    {
        let key = sanitize_timestamp(pushed_at);
        match self.store.get(category.as_str(), owner, Some(repo), Some(&key)) {
            Ok(Some(_)) => {
                debug!("{} for {}/{} is cached at {}", category, owner, repo, key);
                return Ok(RefreshResult::cached(repo, category));
            }
            Ok(None) => {}
            Err(e) => return self.record(repo, category, Err(e)),
        }

        self.api_calls += 1;
        let metadata = snapshot_metadata(owner, repo, category, pushed_at);
        let outcome = fetch(self.upstream).and_then(|value| {
            self.store.set_as(
                category.as_str(),
                owner,
                &value,
                Some(repo),
                Some(&key),
                Some(metadata),
            )
        });
        self.record(repo, category, outcome)
    }

    /// Turn an outcome into a result. Only a lock failure escapes.
    fn record(
        &self,
        repo: &str,
        category: Category,
        outcome: RepoCacheResult<()>,
    ) -> RepoCacheResult<RefreshResult> {
        match outcome {
            Ok(()) => Ok(RefreshResult::refreshed(repo, category)),
            Err(e @ RepoCacheError::LockAcquire { .. }) => Err(e),
            Err(e) => {
                warn!("Failed to refresh {} for {}: {}", category, repo, e);
                Ok(RefreshResult::failed(repo, category, e.to_string()))
            }
        }
    }

    fn summary_request(
        &mut self,
        owner: &str,
        repo: &str,
        key: &str,
    ) -> RepoCacheResult<SummaryRequest> {
        let commit_counts: Option<CommitCounts> =
            self.cached(owner, repo, Category::CommitCounts, key)?;
        let languages: BTreeMap<String, u64> = self
            .cached(owner, repo, Category::Languages, key)?
            .unwrap_or_default();
        let readme: Option<String> = self
            .cached::<Option<String>>(owner, repo, Category::Readme, key)?
            .flatten();
        let files: BTreeMap<String, String> = self
            .cached(owner, repo, Category::DependencyFiles, key)?
            .unwrap_or_default();
        let recent_commits: Vec<CommitRecord> = self
            .cached(owner, repo, Category::CommitsStats, key)?
            .unwrap_or_default();

        let tech_stack = TechnologyStack::from_files(&languages, &files);
        Ok(SummaryRequest {
            owner: owner.to_string(),
            repo: repo.to_string(),
            readme,
            commit_counts,
            recent_commits,
            languages,
            tech_stack,
        })
    }

    fn cached<T: serde::de::DeserializeOwned>(
        &mut self,
        owner: &str,
        repo: &str,
        category: Category,
        key: &str,
    ) -> RepoCacheResult<Option<T>> {
        self.store.get_as(category.as_str(), owner, Some(repo), Some(key))
    }
}

/// Summary result when one of its inputs could not be refreshed
fn input_failed(repo: &str, input: Category, error: &str) -> RefreshResult {
    warn!("Skipping summary for {}: {} failed", repo, input);
    RefreshResult::failed(
        repo,
        Category::AiSummary,
        format!("{} refresh failed: {}", input, error),
    )
}

fn snapshot_metadata(owner: &str, repo: &str, category: Category, pushed_at: DateTime<Utc>) -> Value {
    json!({
        "repository": {"owner": owner, "name": repo},
        "category": category.as_str(),
        "pushed_at": pushed_at.to_rfc3339(),
        "ttl_enforced": false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::SummaryOutput;
    use chrono::TimeZone;
    use std::cell::{Cell, RefCell};
    use tempfile::TempDir;

    const OWNER: &str = "alice";

    #[derive(Default)]
    struct FakeUpstream {
        calls: RefCell<Vec<String>>,
        failing: Vec<(&'static str, &'static str)>,
        readme: Option<String>,
        files: BTreeMap<String, String>,
        repos: Option<Vec<RepoRef>>,
    }

    impl FakeUpstream {
        fn call(&self, method: &str, repo: &str) -> RepoCacheResult<()> {
            self.calls.borrow_mut().push(format!("{}:{}", method, repo));
            if self.failing.iter().any(|&(m, r)| m == method && r == repo) {
                return Err(RepoCacheError::UpstreamStatus {
                    status: 502,
                    url: format!("https://api.github.com/repos/{}/{}", OWNER, repo),
                });
            }
            Ok(())
        }

        fn count(&self, method: &str) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|c| c.starts_with(&format!("{}:", method)))
                .count()
        }
    }

    impl UpstreamClient for FakeUpstream {
        fn repositories(&self, owner: &str) -> RepoCacheResult<Vec<RepoRef>> {
            self.call("repositories", owner)?;
            self.repos
                .clone()
                .ok_or_else(|| RepoCacheError::Upstream("listing unavailable".to_string()))
        }

        fn commit_counts(&self, _owner: &str, repo: &str) -> RepoCacheResult<CommitCounts> {
            self.call("commit_counts", repo)?;
            Ok(CommitCounts {
                total: 12,
                recent_90d: 4,
                ..CommitCounts::default()
            })
        }

        fn recent_commits(
            &self,
            _owner: &str,
            repo: &str,
            limit: usize,
        ) -> RepoCacheResult<Vec<CommitRecord>> {
            self.call("recent_commits", repo)?;
            Ok((0..limit.min(2))
                .map(|i| CommitRecord {
                    sha: format!("sha{}", i),
                    date: None,
                    message: format!("commit {}", i),
                })
                .collect())
        }

        fn languages(&self, _owner: &str, repo: &str) -> RepoCacheResult<BTreeMap<String, u64>> {
            self.call("languages", repo)?;
            let mut langs = BTreeMap::new();
            langs.insert("Rust".to_string(), 2048);
            Ok(langs)
        }

        fn readme(&self, _owner: &str, repo: &str) -> RepoCacheResult<Option<String>> {
            self.call("readme", repo)?;
            Ok(self.readme.clone())
        }

        fn dependency_files(
            &self,
            _owner: &str,
            repo: &str,
        ) -> RepoCacheResult<BTreeMap<String, String>> {
            self.call("dependency_files", repo)?;
            Ok(self.files.clone())
        }
    }

    struct FakeSummarizer {
        text: String,
        calls: Cell<usize>,
        last_readme: RefCell<Option<String>>,
        last_frameworks: RefCell<Vec<String>>,
    }

    impl FakeSummarizer {
        fn new(text: &str) -> Self {
            Self {
                text: text.to_string(),
                calls: Cell::new(0),
                last_readme: RefCell::new(None),
                last_frameworks: RefCell::new(Vec::new()),
            }
        }
    }

    impl Summarizer for FakeSummarizer {
        fn summarize(&self, request: &SummaryRequest) -> RepoCacheResult<SummaryOutput> {
            self.calls.set(self.calls.get() + 1);
            *self.last_readme.borrow_mut() = request.readme.clone();
            *self.last_frameworks.borrow_mut() = request.tech_stack.frameworks.clone();
            Ok(SummaryOutput {
                text: self.text.clone(),
                model: "test-model".to_string(),
                tokens_used: 321,
                confidence_score: 90,
            })
        }
    }

    fn pushed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 3, 22, 48).unwrap()
    }

    fn test_store() -> (SnapshotStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::open(temp.path()).unwrap();
        (store, temp)
    }

    #[test]
    fn refresh_then_cached_for_same_push() {
        let (mut store, _temp) = test_store();
        let upstream = FakeUpstream::default();
        let mut manager = CacheManager::new(&mut store, &upstream);

        assert!(manager
            .needs_refresh(OWNER, "x", Category::CommitCounts, pushed())
            .unwrap());

        let first = manager.refresh_commit_counts(OWNER, "x", pushed()).unwrap();
        assert!(first.refreshed && !first.was_cached);
        assert_eq!(manager.api_calls(), 1);

        let second = manager.refresh_commit_counts(OWNER, "x", pushed()).unwrap();
        assert!(second.was_cached && !second.refreshed);
        assert_eq!(manager.api_calls(), 1);
        assert!(!manager
            .needs_refresh(OWNER, "x", Category::CommitCounts, pushed())
            .unwrap());

        let later = Utc.with_ymd_and_hms(2026, 1, 6, 0, 0, 0).unwrap();
        assert!(manager
            .needs_refresh(OWNER, "x", Category::CommitCounts, later)
            .unwrap());
        assert_eq!(upstream.count("commit_counts"), 1);
    }

    #[test]
    fn snapshot_is_keyed_by_push_and_carries_metadata() {
        let (mut store, temp) = test_store();
        let upstream = FakeUpstream::default();
        CacheManager::new(&mut store, &upstream)
            .refresh_languages(OWNER, "x", pushed())
            .unwrap();

        let path = temp
            .path()
            .join("alice/x/languages/2026-01-05T03-22-48+00-00.json");
        let raw: Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(raw["value"]["Rust"], 2048);
        assert_eq!(raw["metadata"]["repository"]["name"], "x");
        assert_eq!(raw["metadata"]["ttl_enforced"], false);
        assert_eq!(raw["metadata"]["category"], "languages");
    }

    #[test]
    fn missing_readme_is_cached_as_null() {
        let (mut store, _temp) = test_store();
        let upstream = FakeUpstream::default();
        let mut manager = CacheManager::new(&mut store, &upstream);

        assert!(manager.refresh_readme(OWNER, "x", pushed()).unwrap().refreshed);
        assert!(manager.refresh_readme(OWNER, "x", pushed()).unwrap().was_cached);
        assert_eq!(upstream.count("readme"), 1);
    }

    #[test]
    fn upstream_error_is_recorded_not_cached() {
        let (mut store, _temp) = test_store();
        let upstream = FakeUpstream {
            failing: vec![("languages", "x")],
            ..FakeUpstream::default()
        };
        let mut manager = CacheManager::new(&mut store, &upstream);

        let result = manager.refresh_languages(OWNER, "x", pushed()).unwrap();
        assert!(!result.refreshed && !result.was_cached);
        assert!(result.error.as_deref().unwrap().contains("502"));
        assert!(manager
            .needs_refresh(OWNER, "x", Category::Languages, pushed())
            .unwrap());
    }

    #[test]
    fn repository_defaults_to_counts_and_languages() {
        let (mut store, _temp) = test_store();
        let upstream = FakeUpstream::default();
        let mut manager = CacheManager::new(&mut store, &upstream);

        let results = manager.refresh_repository(OWNER, "x", pushed(), None).unwrap();
        let categories: Vec<Category> = results.iter().map(|r| r.category).collect();
        assert_eq!(categories, vec![Category::CommitCounts, Category::Languages]);
        assert!(results.iter().all(|r| r.refreshed));
    }

    #[test]
    fn summary_request_widens_to_every_category() {
        let (mut store, _temp) = test_store();
        let upstream = FakeUpstream {
            readme: Some("# x\nA parser.".to_string()),
            ..FakeUpstream::default()
        };
        let summarizer = FakeSummarizer::new("A parser library.");
        let mut manager = CacheManager::new(&mut store, &upstream).with_summarizer(&summarizer);

        let results = manager
            .refresh_repository(OWNER, "x", pushed(), Some(&[Category::AiSummary]))
            .unwrap();
        let categories: Vec<Category> = results.iter().map(|r| r.category).collect();
        assert_eq!(categories, Category::ALL.to_vec());
        assert!(results.iter().all(|r| r.refreshed), "{:?}", results);

        // Inputs were fresh when the summary ran, so each was fetched once
        assert_eq!(upstream.count("readme"), 1);
        assert_eq!(summarizer.calls.get(), 1);
        assert_eq!(summarizer.last_readme.borrow().as_deref(), Some("# x\nA parser."));

        drop(manager);
        let key = sanitize_timestamp(pushed());
        let record: AiSummaryRecord = store
            .get_as("ai_summary", OWNER, Some("x"), Some(&key))
            .unwrap()
            .unwrap();
        assert_eq!(record.summary, "A parser library.");
        assert_eq!(record.tokens_used, 321);
        assert_eq!(record.tech_stack.primary_language.as_deref(), Some("Rust"));
    }

    #[test]
    fn summary_refreshes_stale_inputs() {
        let (mut store, _temp) = test_store();
        let mut files = BTreeMap::new();
        files.insert(
            "Cargo.toml".to_string(),
            "[dependencies]\naxum = \"0.7\"\n".to_string(),
        );
        let upstream = FakeUpstream {
            files,
            ..FakeUpstream::default()
        };
        let summarizer = FakeSummarizer::new("Web service.");
        let mut manager = CacheManager::new(&mut store, &upstream).with_summarizer(&summarizer);

        let result = manager.refresh_ai_summary(OWNER, "x", pushed()).unwrap();
        assert!(result.refreshed, "{:?}", result);

        for input in ["commit_counts", "languages", "readme", "dependency_files"] {
            assert_eq!(upstream.count(input), 1, "{}", input);
        }
        assert_eq!(upstream.count("recent_commits"), 0);
        assert_eq!(*summarizer.last_frameworks.borrow(), vec!["Axum".to_string()]);
        // Four inputs plus the summarizer
        assert_eq!(manager.api_calls(), 5);

        let again = manager.refresh_ai_summary(OWNER, "x", pushed()).unwrap();
        assert!(again.was_cached);
        assert_eq!(summarizer.calls.get(), 1);
    }

    #[test]
    fn summary_without_summarizer_fails() {
        let (mut store, _temp) = test_store();
        let upstream = FakeUpstream::default();
        let mut manager = CacheManager::new(&mut store, &upstream);

        let result = manager.refresh_ai_summary(OWNER, "x", pushed()).unwrap();
        assert!(result.is_error());
        assert!(manager
            .needs_refresh(OWNER, "x", Category::AiSummary, pushed())
            .unwrap());
        assert!(upstream.calls.borrow().is_empty());
    }

    #[test]
    fn empty_summary_is_not_cached() {
        let (mut store, _temp) = test_store();
        let upstream = FakeUpstream::default();
        let summarizer = FakeSummarizer::new("   ");
        let mut manager = CacheManager::new(&mut store, &upstream).with_summarizer(&summarizer);

        let result = manager.refresh_ai_summary(OWNER, "x", pushed()).unwrap();
        assert_eq!(result.error.as_deref(), Some("empty summary"));
        assert!(manager
            .needs_refresh(OWNER, "x", Category::AiSummary, pushed())
            .unwrap());
    }

    #[test]
    fn summary_stops_when_an_input_fails() {
        let (mut store, _temp) = test_store();
        let upstream = FakeUpstream {
            failing: vec![("readme", "x")],
            ..FakeUpstream::default()
        };
        let summarizer = FakeSummarizer::new("never");
        let mut manager = CacheManager::new(&mut store, &upstream).with_summarizer(&summarizer);

        let result = manager.refresh_ai_summary(OWNER, "x", pushed()).unwrap();
        assert!(result.error.as_deref().unwrap().starts_with("readme refresh failed"));
        assert_eq!(summarizer.calls.get(), 0);
    }

    fn repo_list() -> Vec<RepoRef> {
        vec![
            RepoRef::new("a", Some("2026-01-05T03:22:48Z")),
            RepoRef::new("b", None),
            RepoRef::new("c", Some("last tuesday")),
            RepoRef::new("d", Some("2026-01-04T10:00:00+02:00")),
        ]
    }

    #[test]
    fn batch_refresh_counts() {
        let (mut store, _temp) = test_store();
        let upstream = FakeUpstream::default();
        let mut manager = CacheManager::new(&mut store, &upstream);

        let first = manager.refresh_user_data(OWNER, &repo_list(), false, false).unwrap();
        assert_eq!(first.total_repos, 4);
        assert_eq!(first.repos_refreshed, 2);
        assert_eq!(first.repos_unchanged, 0);
        assert_eq!(first.repos_failed, 0);
        assert_eq!(first.repos_skipped, 2);
        assert_eq!(first.api_calls_made, 4);
        assert_eq!(first.results.len(), 4);

        let second = manager.refresh_user_data(OWNER, &repo_list(), false, false).unwrap();
        assert_eq!(second.repos_unchanged, 2);
        assert_eq!(second.repos_refreshed, 0);
        assert_eq!(second.api_calls_made, 0);
        assert!(second.results.is_empty());
    }

    #[test]
    fn forced_batch_still_honors_version_keys() {
        let (mut store, _temp) = test_store();
        let upstream = FakeUpstream::default();
        let mut manager = CacheManager::new(&mut store, &upstream);
        manager.refresh_user_data(OWNER, &repo_list(), false, false).unwrap();

        let forced = manager.refresh_user_data(OWNER, &repo_list(), true, false).unwrap();
        assert_eq!(forced.repos_refreshed, 2);
        assert_eq!(forced.repos_unchanged, 0);
        assert_eq!(forced.api_calls_made, 0);
        assert!(forced.results.iter().all(|r| r.was_cached));
    }

    #[test]
    fn batch_refreshes_only_stale_categories() {
        let (mut store, _temp) = test_store();
        let upstream = FakeUpstream::default();
        let mut manager = CacheManager::new(&mut store, &upstream);
        manager.refresh_languages(OWNER, "a", pushed()).unwrap();

        let summary = manager
            .refresh_user_data(OWNER, &repo_list()[..1], false, false)
            .unwrap();
        assert_eq!(summary.repos_refreshed, 1);
        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.results[0].category, Category::CommitCounts);
        assert_eq!(upstream.count("languages"), 1);
    }

    #[test]
    fn batch_counts_failed_repositories() {
        let (mut store, _temp) = test_store();
        let upstream = FakeUpstream {
            failing: vec![("languages", "d")],
            ..FakeUpstream::default()
        };
        let mut manager = CacheManager::new(&mut store, &upstream);

        let summary = manager.refresh_user_data(OWNER, &repo_list(), false, false).unwrap();
        assert_eq!(summary.repos_refreshed, 1);
        assert_eq!(summary.repos_failed, 1);
        assert_eq!(summary.results.iter().filter(|r| r.is_error()).count(), 1);
    }

    #[test]
    fn batch_with_summaries_tracks_every_category() {
        let (mut store, _temp) = test_store();
        let upstream = FakeUpstream::default();
        let summarizer = FakeSummarizer::new("Summary.");
        let mut manager = CacheManager::new(&mut store, &upstream)
            .with_summarizer(&summarizer)
            .with_recent_commit_limit(1);

        let summary = manager
            .refresh_user_data(OWNER, &repo_list()[..1], false, true)
            .unwrap();
        assert_eq!(summary.results.len(), Category::ALL.len());
        assert_eq!(summary.results.last().map(|r| r.category), Some(Category::AiSummary));
        assert_eq!(summary.repos_refreshed, 1);
    }

    #[test]
    fn batch_widens_when_summary_category_is_tracked() {
        let (mut store, _temp) = test_store();
        let upstream = FakeUpstream::default();
        let summarizer = FakeSummarizer::new("Summary.");
        let mut manager = CacheManager::new(&mut store, &upstream)
            .with_summarizer(&summarizer)
            .with_categories([Category::AiSummary]);

        let summary = manager
            .refresh_user_data(OWNER, &repo_list()[..1], false, false)
            .unwrap();
        let categories: Vec<Category> = summary.results.iter().map(|r| r.category).collect();
        assert_eq!(categories, Category::ALL.to_vec());
        assert_eq!(summary.repos_refreshed, 1);
        assert_eq!(summarizer.calls.get(), 1);
    }

    #[test]
    fn batch_survives_unreadable_manifest() {
        let (mut store, temp) = test_store();
        std::fs::create_dir(temp.path().join("index.json")).unwrap();
        let upstream = FakeUpstream::default();
        let mut manager = CacheManager::new(&mut store, &upstream);

        let summary = manager.refresh_user_data(OWNER, &repo_list(), false, false).unwrap();
        assert_eq!(summary.repos_failed, 2);
        assert_eq!(summary.repos_skipped, 2);
        assert_eq!(summary.repos_refreshed, 0);
        assert_eq!(summary.results.len(), 4);
        assert!(summary.results.iter().all(RefreshResult::is_error));
        assert!(upstream.calls.borrow().is_empty());
    }

    #[test]
    fn forced_batch_survives_unreadable_manifest() {
        let (mut store, temp) = test_store();
        std::fs::create_dir(temp.path().join("index.json")).unwrap();
        let upstream = FakeUpstream::default();
        let mut manager = CacheManager::new(&mut store, &upstream);

        let summary = manager
            .refresh_user_data(OWNER, &repo_list()[..1], true, false)
            .unwrap();
        assert_eq!(summary.repos_failed, 1);
        assert!(summary.results.iter().all(RefreshResult::is_error));
    }

    #[test]
    fn failed_input_is_not_fetched_again_for_summary() {
        let (mut store, _temp) = test_store();
        let upstream = FakeUpstream {
            failing: vec![("languages", "a")],
            ..FakeUpstream::default()
        };
        let summarizer = FakeSummarizer::new("never");
        let mut manager = CacheManager::new(&mut store, &upstream).with_summarizer(&summarizer);

        let summary = manager
            .refresh_user_data(OWNER, &repo_list()[..1], false, true)
            .unwrap();
        assert_eq!(summary.repos_failed, 1);
        assert_eq!(upstream.count("languages"), 1);
        assert_eq!(summary.api_calls_made, 5);
        assert_eq!(summarizer.calls.get(), 0);

        let last = summary.results.last().unwrap();
        assert_eq!(last.category, Category::AiSummary);
        assert!(last.error.as_deref().unwrap().starts_with("languages refresh failed"));
    }

    #[test]
    fn progress_sees_every_repository() {
        let (mut store, _temp) = test_store();
        let upstream = FakeUpstream::default();
        let mut manager = CacheManager::new(&mut store, &upstream);

        let mut seen = Vec::new();
        manager
            .refresh_user_data_with_progress(OWNER, &repo_list(), false, false, |i, total, name| {
                seen.push(format!("{}/{} {}", i, total, name));
            })
            .unwrap();
        assert_eq!(seen, vec!["0/4 a", "1/4 b", "2/4 c", "3/4 d"]);
    }

    #[test]
    fn repository_listing_falls_back_to_cache() {
        let (mut store, _temp) = test_store();
        let listing = vec![RepoRef::new("a", Some("2026-01-05T03:22:48Z"))];

        let online = FakeUpstream {
            repos: Some(listing.clone()),
            ..FakeUpstream::default()
        };
        let fetched = CacheManager::new(&mut store, &online)
            .list_repositories(OWNER)
            .unwrap();
        assert_eq!(fetched, listing);

        let offline = FakeUpstream::default();
        let fallback = CacheManager::new(&mut store, &offline)
            .list_repositories(OWNER)
            .unwrap();
        assert_eq!(fallback, listing);
    }

    #[test]
    fn repository_listing_error_without_cache() {
        let (mut store, _temp) = test_store();
        let offline = FakeUpstream::default();
        let err = CacheManager::new(&mut store, &offline)
            .list_repositories(OWNER)
            .unwrap_err();
        assert!(matches!(err, RepoCacheError::Upstream(_)));
    }
}

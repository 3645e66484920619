//! Blocking GitHub REST client

use crate::config::schema::GithubConfig;
use crate::error::{RepoCacheError, RepoCacheResult};
use crate::upstream::{
    CommitCounts, CommitRecord, RepoRef, UpstreamClient, DEPENDENCY_FILE_NAMES,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

const PER_PAGE: usize = 100;
const JSON_ACCEPT: &str = "application/vnd.github+json";
const RAW_ACCEPT: &str = "application/vnd.github.raw";
const USER_AGENT: &str = concat!("repocache/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct RepoListing {
    name: String,
    pushed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitListing {
    sha: String,
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    author: Option<CommitAuthor>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

/// GitHub API client
pub struct GithubClient {
    agent: ureq::Agent,
    api_url: String,
    token: Option<String>,
    commit_limit: usize,
}

impl GithubClient {
    pub fn new(config: &GithubConfig, token: Option<String>) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        if token.is_none() {
            warn!("No GitHub token available; unauthenticated requests are heavily rate limited");
        }

        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
            commit_limit: config.commit_limit,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    /// GET a path. A 404 is `None`.
    fn get(
        &self,
        path: &str,
        accept: &str,
        query: &[(&str, String)],
    ) -> RepoCacheResult<Option<ureq::http::Response<ureq::Body>>> {
        let url = self.url(path);
        let mut request = self
            .agent
            .get(&url)
            .header("Accept", accept)
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        for (key, value) in query {
            request = request.query(*key, value);
        }

        debug!("GET {}", url);
        match request.call() {
            Ok(response) => Ok(Some(response)),
            Err(ureq::Error::StatusCode(404)) => Ok(None),
            Err(e) => Err(map_error(&url, e)),
        }
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> RepoCacheResult<Option<T>> {
        let Some(mut response) = self.get(path, JSON_ACCEPT, query)? else {
            return Ok(None);
        };
        response
            .body_mut()
            .read_json::<T>()
            .map(Some)
            .map_err(|e| map_error(&self.url(path), e))
    }

    fn get_raw(&self, path: &str) -> RepoCacheResult<Option<String>> {
        let Some(mut response) = self.get(path, RAW_ACCEPT, &[])? else {
            return Ok(None);
        };
        response
            .body_mut()
            .read_to_string()
            .map(Some)
            .map_err(|e| map_error(&self.url(path), e))
    }

    /// Walk commits newest first, stopping at `limit`
    fn walk_commits(&self, owner: &str, repo: &str, limit: usize) -> RepoCacheResult<Vec<CommitListing>> {
        let path = format!("repos/{}/{}/commits", owner, repo);
        let mut commits = Vec::new();
        let mut page = 1;

        while commits.len() < limit {
            let query = [("per_page", PER_PAGE.to_string()), ("page", page.to_string())];
            let batch: Vec<CommitListing> = match self.get_json(&path, &query) {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                // An empty repository answers 409
                Err(RepoCacheError::UpstreamStatus { status: 409, .. }) => break,
                Err(e) => return Err(e),
            };
            let last_page = batch.len() < PER_PAGE;
            commits.extend(batch);
            if last_page {
                break;
            }
            page += 1;
        }

        commits.truncate(limit);
        Ok(commits)
    }
}

fn map_error(url: &str, err: ureq::Error) -> RepoCacheError {
    match err {
        ureq::Error::StatusCode(status) => RepoCacheError::UpstreamStatus {
            status,
            url: url.to_string(),
        },
        other => RepoCacheError::Upstream(format!("{}: {}", url, other)),
    }
}

impl UpstreamClient for GithubClient {
    fn repositories(&self, owner: &str) -> RepoCacheResult<Vec<RepoRef>> {
        let path = format!("users/{}/repos", owner);
        let mut repos = Vec::new();
        let mut page = 1;

        loop {
            let query = [
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
                ("sort", "pushed".to_string()),
            ];
            let batch: Vec<RepoListing> = self.get_json(&path, &query)?.ok_or_else(|| {
                RepoCacheError::User(format!("GitHub user '{}' not found", owner))
            })?;
            let last_page = batch.len() < PER_PAGE;
            repos.extend(
                batch
                    .into_iter()
                    .map(|r| RepoRef::new(r.name, r.pushed_at.as_deref())),
            );
            if last_page {
                break;
            }
            page += 1;
        }

        debug!("Listed {} repositories for {}", repos.len(), owner);
        Ok(repos)
    }

    fn commit_counts(&self, owner: &str, repo: &str) -> RepoCacheResult<CommitCounts> {
        let commits = self.walk_commits(owner, repo, self.commit_limit)?;
        let dates = commits
            .iter()
            .map(|c| c.commit.author.as_ref().and_then(|a| a.date));
        Ok(CommitCounts::from_dates(dates, Utc::now()))
    }

    fn recent_commits(
        &self,
        owner: &str,
        repo: &str,
        limit: usize,
    ) -> RepoCacheResult<Vec<CommitRecord>> {
        let commits = self.walk_commits(owner, repo, limit)?;
        Ok(commits
            .into_iter()
            .map(|c| CommitRecord {
                sha: c.sha,
                date: c.commit.author.and_then(|a| a.date),
                message: c.commit.message,
            })
            .collect())
    }

    fn languages(&self, owner: &str, repo: &str) -> RepoCacheResult<BTreeMap<String, u64>> {
        Ok(self
            .get_json(&format!("repos/{}/{}/languages", owner, repo), &[])?
            .unwrap_or_default())
    }

    fn readme(&self, owner: &str, repo: &str) -> RepoCacheResult<Option<String>> {
        self.get_raw(&format!("repos/{}/{}/readme", owner, repo))
    }

    fn dependency_files(
        &self,
        owner: &str,
        repo: &str,
    ) -> RepoCacheResult<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();

        for name in DEPENDENCY_FILE_NAMES {
            if let Some(contents) = self.get_raw(&format!("repos/{}/{}/contents/{}", owner, repo, name))? {
                files.insert(name.to_string(), contents);
            }
        }

        let listing: Vec<ContentEntry> = self
            .get_json(&format!("repos/{}/{}/contents", owner, repo), &[])?
            .unwrap_or_default();
        for entry in listing
            .iter()
            .filter(|e| e.kind == "file" && e.name.ends_with(".csproj"))
        {
            let path = format!("repos/{}/{}/contents/{}", owner, repo, entry.name);
            if let Some(contents) = self.get_raw(&path)? {
                files.insert(entry.name.clone(), contents);
            }
        }

        debug!("Found {} dependency file(s) in {}/{}", files.len(), owner, repo);
        Ok(files)
    }
}

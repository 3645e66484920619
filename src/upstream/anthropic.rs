//! Repository summarizer backed by the Anthropic Messages API

use crate::config::schema::SummarizerConfig;
use crate::error::{RepoCacheError, RepoCacheResult};
use crate::upstream::{SummaryOutput, SummaryRequest, Summarizer};
use serde::Deserialize;
use serde_json::json;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::debug;

const API_VERSION: &str = "2023-06-01";

/// README characters sent with a prompt
const MAX_README_CHARS: usize = 8000;

/// Confidence reported for model-written summaries
const MODEL_CONFIDENCE: u8 = 90;

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

pub struct AnthropicSummarizer {
    agent: ureq::Agent,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicSummarizer {
    /// Build from config, reading the key from the configured env var.
    pub fn from_config(config: &SummarizerConfig) -> RepoCacheResult<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                RepoCacheError::Summarizer(format!(
                    "API key not found; set {}",
                    config.api_key_env
                ))
            })?;
        Ok(Self::new(config, api_key))
    }

    pub fn new(config: &SummarizerConfig, api_key: String) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        }
    }
}

impl Summarizer for AnthropicSummarizer {
    fn summarize(&self, request: &SummaryRequest) -> RepoCacheResult<SummaryOutput> {
        let url = format!("{}/v1/messages", self.api_url);
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{"role": "user", "content": build_prompt(request)}],
        });

        debug!("Requesting summary for {}/{}", request.owner, request.repo);
        let mut response = self
            .agent
            .post(&url)
            .header("x-api-key", self.api_key.as_str())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .send_json(&body)
            .map_err(|e| RepoCacheError::Summarizer(format!("{}: {}", url, e)))?;

        let parsed: MessagesResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| RepoCacheError::Summarizer(format!("invalid response: {}", e)))?;

        let text = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
        let tokens_used = parsed
            .usage
            .map(|u| u.input_tokens + u.output_tokens)
            .unwrap_or(0);

        Ok(SummaryOutput {
            text,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            tokens_used,
            confidence_score: MODEL_CONFIDENCE,
        })
    }
}

/// Render the prompt for one repository
pub fn build_prompt(request: &SummaryRequest) -> String {
    let mut prompt = String::new();
    let stack = &request.tech_stack;

    let _ = writeln!(
        prompt,
        "Analyze this GitHub repository and provide a detailed technical summary.\n"
    );
    let _ = writeln!(prompt, "Repository: {}/{}", request.owner, request.repo);
    let _ = writeln!(
        prompt,
        "Primary Language: {}",
        stack.primary_language.as_deref().unwrap_or("Unknown")
    );

    let total_bytes: u64 = request.languages.values().sum();
    if total_bytes > 0 {
        let mut langs: Vec<(&String, &u64)> = request.languages.iter().collect();
        langs.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let breakdown = langs
            .iter()
            .take(5)
            .map(|(name, bytes)| format!("{} ({:.1}%)", name, **bytes as f64 / total_bytes as f64 * 100.0))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(prompt, "Languages: {}", breakdown);
    }

    if let Some(counts) = &request.commit_counts {
        let _ = writeln!(
            prompt,
            "Recent Activity: {} commits (90d), {} commits (365d), {} total",
            counts.recent_90d, counts.recent_365d, counts.total
        );
    }

    if !request.recent_commits.is_empty() {
        let subjects = request
            .recent_commits
            .iter()
            .take(10)
            .filter_map(|c| c.message.lines().next())
            .collect::<Vec<_>>()
            .join("; ");
        let _ = writeln!(prompt, "Recent Commits: {}", subjects);
    }

    if !stack.frameworks.is_empty() {
        let _ = writeln!(prompt, "Frameworks: {}", stack.frameworks.join(", "));
    }
    if stack.total_dependencies > 0 {
        let names = stack
            .dependencies
            .iter()
            .take(5)
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(
            prompt,
            "Key Dependencies ({} total): {}",
            stack.total_dependencies, names
        );
    }

    let readme = request.readme.as_deref().unwrap_or("(no README)");
    let _ = write!(prompt, "\nREADME:\n{}\n\n", truncate_readme(readme));
    prompt.push_str(
        "Provide a technical summary (4-6 sentences) that explains what the repository does, \
         its key features, the technologies it uses, notable design approaches, and its \
         intended users.",
    );
    prompt
}

/// Cut a README to the prompt budget, preferring a paragraph or heading break
fn truncate_readme(readme: &str) -> &str {
    if readme.chars().count() <= MAX_README_CHARS {
        return readme;
    }
    let cut = readme
        .char_indices()
        .nth(MAX_README_CHARS)
        .map_or(readme.len(), |(i, _)| i);
    let truncated = &readme[..cut];

    let last_break = truncated
        .rfind("\n\n")
        .into_iter()
        .chain(truncated.rfind("\n#"))
        .max();
    match last_break {
        Some(pos) if pos * 10 > cut * 7 => &truncated[..pos],
        _ => truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{CommitCounts, CommitRecord, TechnologyStack};
    use std::collections::BTreeMap;

    fn request() -> SummaryRequest {
        let mut languages = BTreeMap::new();
        languages.insert("Rust".to_string(), 750);
        languages.insert("Shell".to_string(), 250);
        SummaryRequest {
            owner: "alice".to_string(),
            repo: "x".to_string(),
            readme: Some("# x\n\nA tool.".to_string()),
            commit_counts: Some(CommitCounts {
                total: 42,
                recent_90d: 3,
                ..CommitCounts::default()
            }),
            recent_commits: vec![CommitRecord {
                sha: "a1".to_string(),
                date: None,
                message: "Fix parser\n\nlong body".to_string(),
            }],
            tech_stack: TechnologyStack::from_files(&languages, &BTreeMap::new()),
            languages,
        }
    }

    #[test]
    fn prompt_includes_repository_facts() {
        let prompt = build_prompt(&request());
        assert!(prompt.contains("Repository: alice/x"));
        assert!(prompt.contains("Primary Language: Rust"));
        assert!(prompt.contains("Rust (75.0%), Shell (25.0%)"));
        assert!(prompt.contains("3 commits (90d)"));
        assert!(prompt.contains("Recent Commits: Fix parser"));
        assert!(!prompt.contains("long body"));
        assert!(prompt.contains("README:\n# x\n\nA tool."));
    }

    #[test]
    fn prompt_without_readme() {
        let mut req = request();
        req.readme = None;
        assert!(build_prompt(&req).contains("(no README)"));
    }

    #[test]
    fn short_readme_untouched() {
        assert_eq!(truncate_readme("hello"), "hello");
    }

    #[test]
    fn long_readme_cut_at_paragraph() {
        let readme = format!("{}\n\n{}", "a".repeat(7000), "b".repeat(3000));
        let cut = truncate_readme(&readme);
        assert_eq!(cut.len(), 7000);
        assert!(cut.chars().all(|c| c == 'a'));
    }

    #[test]
    fn long_readme_without_break_is_hard_cut() {
        let readme = "z".repeat(9000);
        assert_eq!(truncate_readme(&readme).len(), MAX_README_CHARS);
    }

    #[test]
    fn missing_key_is_an_error() {
        let config = SummarizerConfig {
            api_key_env: "REPOCACHE_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..SummarizerConfig::default()
        };
        assert!(matches!(
            AnthropicSummarizer::from_config(&config),
            Err(RepoCacheError::Summarizer(_))
        ));
    }
}

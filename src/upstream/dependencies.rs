//! Dependency manifest parsing and technology stack detection
//!
//! Supported manifests:
//! - `package.json` (npm)
//! - `requirements.txt` and `pyproject.toml` (Poetry and PEP 621)
//! - `Gemfile` (RubyGems)
//! - `go.mod` (Go modules)
//! - `Cargo.toml` (crates.io)
//!
//! Parsing is best effort. A manifest that fails to parse yields no
//! dependencies and a warning, never an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Package ecosystem a dependency belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Npm,
    Pypi,
    Rubygems,
    Go,
    Cargo,
}

impl Ecosystem {
    /// Ecosystem of a manifest file name, if it is one we parse
    pub fn for_file(file_name: &str) -> Option<Self> {
        match file_name {
            "package.json" => Some(Self::Npm),
            "requirements.txt" | "pyproject.toml" => Some(Self::Pypi),
            "Gemfile" => Some(Self::Rubygems),
            "go.mod" => Some(Self::Go),
            "Cargo.toml" => Some(Self::Cargo),
            _ => None,
        }
    }
}

/// A declared dependency with its version constraint stripped of operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version: String,
    pub ecosystem: Ecosystem,
}

impl Dependency {
    fn new(name: impl Into<String>, version: impl Into<String>, ecosystem: Ecosystem) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ecosystem,
        }
    }
}

/// Parse one manifest. Unsupported or malformed files yield an empty list.
pub fn parse_dependency_file(file_name: &str, contents: &str) -> Vec<Dependency> {
    let Some(ecosystem) = Ecosystem::for_file(file_name) else {
        debug!("No parser for dependency file {}", file_name);
        return Vec::new();
    };

    let parsed = match file_name {
        "package.json" => parse_package_json(contents),
        "requirements.txt" => Ok(parse_requirements_txt(contents)),
        "pyproject.toml" => parse_pyproject_toml(contents),
        "Gemfile" => Ok(parse_gemfile(contents)),
        "go.mod" => Ok(parse_go_mod(contents)),
        _ => parse_cargo_toml(contents),
    };

    match parsed {
        Ok(deps) => {
            debug!(
                file = file_name,
                ecosystem = ?ecosystem,
                dependencies_count = deps.len(),
                "Parsed dependency file"
            );
            deps
        }
        Err(reason) => {
            warn!("Failed to parse {}: {}", file_name, reason);
            Vec::new()
        }
    }
}

fn parse_package_json(contents: &str) -> Result<Vec<Dependency>, String> {
    let json: Value = serde_json::from_str(contents).map_err(|e| e.to_string())?;
    let obj = json
        .as_object()
        .ok_or_else(|| "package.json root must be an object".to_string())?;

    let mut deps = Vec::new();
    for section in ["dependencies", "devDependencies"] {
        if let Some(map) = obj.get(section).and_then(Value::as_object) {
            for (name, version) in map {
                let version = version.as_str().unwrap_or("latest");
                deps.push(Dependency::new(name, clean_npm_version(version), Ecosystem::Npm));
            }
        }
    }
    Ok(deps)
}

fn parse_requirements_txt(contents: &str) -> Vec<Dependency> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| !line.starts_with('-') && !line.contains("://"))
        .filter_map(parse_requirement)
        .map(|(name, version)| Dependency::new(name, version, Ecosystem::Pypi))
        .collect()
}

/// `name[extras] op version ; marker` -> `(name, version)`
fn parse_requirement(spec: &str) -> Option<(String, String)> {
    let spec = spec.split(';').next().unwrap_or(spec).trim();
    let spec = match (spec.find('['), spec.find(']')) {
        (Some(start), Some(end)) if end > start => format!("{}{}", &spec[..start], &spec[end + 1..]),
        _ => spec.to_string(),
    };

    let name_end = spec
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(spec.len());
    let name = spec[..name_end].trim();
    if name.is_empty() {
        return None;
    }

    let rest = spec[name_end..].trim();
    let version = rest
        .trim_start_matches(|c: char| matches!(c, '=' | '>' | '<' | '~' | '!' | ' '))
        .split(',')
        .next()
        .unwrap_or("")
        .trim();
    let version = if version.is_empty() { "latest" } else { version };
    Some((name.to_string(), version.to_string()))
}

#[derive(Debug, Default, Deserialize)]
struct PyProjectToml {
    project: Option<ProjectMetadata>,
    tool: Option<ToolConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectMetadata {
    dependencies: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolConfig {
    poetry: Option<PoetryConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct PoetryConfig {
    dependencies: Option<BTreeMap<String, DependencySpec>>,
}

/// `name = "1.0"` or `name = { version = "1.0", ... }`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum DependencySpec {
    Simple(String),
    Detailed(DetailedDependency),
}

#[derive(Debug, Clone, Deserialize)]
struct DetailedDependency {
    version: Option<String>,
}

impl DependencySpec {
    fn version(&self) -> String {
        match self {
            Self::Simple(version) => clean_version(version),
            Self::Detailed(details) => details
                .version
                .as_deref()
                .map(clean_version)
                .unwrap_or_else(|| "latest".to_string()),
        }
    }
}

fn parse_pyproject_toml(contents: &str) -> Result<Vec<Dependency>, String> {
    let doc: PyProjectToml = toml::from_str(contents).map_err(|e| e.to_string())?;
    let mut deps = Vec::new();

    if let Some(poetry_deps) = doc.tool.and_then(|t| t.poetry).and_then(|p| p.dependencies) {
        for (name, spec) in poetry_deps {
            if name == "python" {
                continue;
            }
            deps.push(Dependency::new(name, spec.version(), Ecosystem::Pypi));
        }
    }

    if let Some(project_deps) = doc.project.and_then(|p| p.dependencies) {
        for (name, version) in project_deps.iter().filter_map(|d| parse_requirement(d)) {
            deps.push(Dependency::new(name, version, Ecosystem::Pypi));
        }
    }
    Ok(deps)
}

fn parse_gemfile(contents: &str) -> Vec<Dependency> {
    contents
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("gem "))
        .filter_map(|rest| {
            let mut quoted = quoted_strings(rest).into_iter();
            let name = quoted.next()?;
            let version = quoted
                .next()
                .map(|v| clean_version(&v))
                .unwrap_or_else(|| "latest".to_string());
            Some(Dependency::new(name, version, Ecosystem::Rubygems))
        })
        .collect()
}

/// Contents of each `'...'` or `"..."` literal, in order
fn quoted_strings(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\'' || c == '"' {
            let literal: String = chars.by_ref().take_while(|&ch| ch != c).collect();
            out.push(literal);
        }
    }
    out
}

fn parse_go_mod(contents: &str) -> Vec<Dependency> {
    let mut deps = Vec::new();
    let mut in_require_block = false;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        let spec = if in_require_block {
            if line == ")" {
                in_require_block = false;
                continue;
            }
            line
        } else if let Some(rest) = line.strip_prefix("require ") {
            let rest = rest.trim();
            if rest.starts_with('(') {
                in_require_block = true;
                continue;
            }
            rest
        } else {
            continue;
        };

        let mut parts = spec.split_whitespace();
        if let (Some(path), Some(version)) = (parts.next(), parts.next()) {
            let version = version.strip_prefix('v').unwrap_or(version);
            deps.push(Dependency::new(path, version, Ecosystem::Go));
        }
    }
    deps
}

#[derive(Debug, Default, Deserialize)]
struct CargoManifest {
    #[serde(default)]
    dependencies: BTreeMap<String, DependencySpec>,
    #[serde(default, rename = "dev-dependencies")]
    dev_dependencies: BTreeMap<String, DependencySpec>,
}

fn parse_cargo_toml(contents: &str) -> Result<Vec<Dependency>, String> {
    let manifest: CargoManifest = toml::from_str(contents).map_err(|e| e.to_string())?;
    Ok(manifest
        .dependencies
        .iter()
        .chain(manifest.dev_dependencies.iter())
        .map(|(name, spec)| Dependency::new(name, spec.version(), Ecosystem::Cargo))
        .collect())
}

/// Strip leading range operators (`^1.2`, `>=3`, `~> 2.0`)
fn clean_version(version: &str) -> String {
    version
        .trim_start_matches(|c: char| matches!(c, '^' | '~' | '>' | '<' | '=' | ' '))
        .trim()
        .to_string()
}

fn clean_npm_version(version: &str) -> String {
    let cleaned = clean_version(version);
    let cleaned = cleaned.split(" - ").next().unwrap_or(&cleaned);
    let cleaned = cleaned.split(" || ").next().unwrap_or(cleaned);
    cleaned.trim().to_string()
}

/// Dependency names that identify a framework, and its display name
const KNOWN_FRAMEWORKS: &[(&str, &str)] = &[
    ("react", "React"),
    ("vue", "Vue"),
    ("@angular/core", "Angular"),
    ("svelte", "Svelte"),
    ("next", "Next.js"),
    ("express", "Express"),
    ("django", "Django"),
    ("flask", "Flask"),
    ("fastapi", "FastAPI"),
    ("rails", "Rails"),
    ("sinatra", "Sinatra"),
    ("github.com/gin-gonic/gin", "Gin"),
    ("github.com/labstack/echo/v4", "Echo"),
    ("actix-web", "Actix Web"),
    ("axum", "Axum"),
    ("rocket", "Rocket"),
    ("tokio", "Tokio"),
];

/// What a repository is built with, derived from languages and manifests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnologyStack {
    pub languages: BTreeMap<String, u64>,
    pub primary_language: Option<String>,
    pub frameworks: Vec<String>,
    pub dependencies: Vec<Dependency>,
    pub dependency_file_types: Vec<String>,
    pub total_dependencies: usize,
}

impl TechnologyStack {
    pub fn from_files(
        languages: &BTreeMap<String, u64>,
        files: &BTreeMap<String, String>,
    ) -> Self {
        let mut dependencies = Vec::new();
        let mut dependency_file_types = Vec::new();
        for (name, contents) in files {
            let parsed = parse_dependency_file(name, contents);
            if Ecosystem::for_file(name).is_some() {
                dependency_file_types.push(name.clone());
            }
            dependencies.extend(parsed);
        }

        let known: HashMap<&str, &str> = KNOWN_FRAMEWORKS.iter().copied().collect();
        let mut frameworks: Vec<String> = Vec::new();
        for dep in &dependencies {
            if let Some(display) = known.get(dep.name.to_ascii_lowercase().as_str()) {
                if !frameworks.iter().any(|f| f == display) {
                    frameworks.push(display.to_string());
                }
            }
        }

        let primary_language = languages
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(name, _)| name.clone());

        Self {
            languages: languages.clone(),
            primary_language,
            frameworks,
            total_dependencies: dependencies.len(),
            dependencies,
            dependency_file_types,
        }
    }
}

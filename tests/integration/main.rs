//! Integration tests for repocache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Command isolated from the user's config and cache
    fn repocache(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("repocache");
        cmd.env_remove("REPOCACHE_CONFIG")
            .env_remove("REPOCACHE_CACHE_DIR")
            .arg("--config")
            .arg(temp.path().join("config.toml"))
            .arg("--cache-dir")
            .arg(temp.path().join("cache"));
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        repocache(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("version-keyed snapshot cache"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        repocache(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("repocache"));
    }

    #[test]
    fn cache_path_uses_flag() {
        let temp = TempDir::new().unwrap();
        repocache(&temp)
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                temp.path().join("cache").display().to_string(),
            ));
    }

    #[test]
    fn cache_info_empty() {
        let temp = TempDir::new().unwrap();
        repocache(&temp)
            .args(["cache", "info"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached snapshots"));
    }

    #[test]
    fn cache_info_json_empty() {
        let temp = TempDir::new().unwrap();
        repocache(&temp)
            .args(["cache", "info", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn cache_clear_with_yes() {
        let temp = TempDir::new().unwrap();
        repocache(&temp)
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cache cleared"));
    }

    #[test]
    fn cache_clear_repo_nothing_cached() {
        let temp = TempDir::new().unwrap();
        repocache(&temp)
            .args(["cache", "clear-repo", "alice", "x"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No snapshots cached for alice/x"));
    }

    #[test]
    fn cache_prune_empty() {
        let temp = TempDir::new().unwrap();
        repocache(&temp)
            .args(["cache", "prune", "--keep", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("removed 0 snapshot(s)"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        repocache(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let temp = TempDir::new().unwrap();
        repocache(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("keep_weeks = 8"));
    }

    #[test]
    fn config_init_writes_file() {
        let temp = TempDir::new().unwrap();
        repocache(&temp)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(temp.path().join("config.toml").exists());
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "[cache\n").unwrap();
        repocache(&temp)
            .args(["cache", "path"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn status_on_empty_cache() {
        let temp = TempDir::new().unwrap();
        repocache(&temp)
            .args(["status", "alice", "x", "--pushed-at", "2026-01-05T03:22:48Z"])
            .assert()
            .success()
            .stdout(predicate::str::contains("refresh needed"))
            .stdout(predicate::str::contains("missing_cache_files"))
            .stdout(predicate::str::contains("2026-01-05T03-22-48+00-00"));
    }

    #[test]
    fn status_json() {
        let temp = TempDir::new().unwrap();
        repocache(&temp)
            .args(["status", "alice", "x", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"refresh_needed\": true"))
            .stdout(predicate::str::contains("\"commit_counts\""));
    }

    #[test]
    fn status_rejects_bad_timestamp() {
        let temp = TempDir::new().unwrap();
        repocache(&temp)
            .args(["status", "alice", "x", "--pushed-at", "yesterday"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid timestamp"));
    }

    #[test]
    fn owner_status_needs_listing() {
        let temp = TempDir::new().unwrap();
        repocache(&temp)
            .args(["status", "alice"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No cached repository listing"));
    }

    #[test]
    fn refresh_rejects_unknown_category() {
        let temp = TempDir::new().unwrap();
        repocache(&temp)
            .args(["refresh", "alice", "--categories", "stars"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("stars"));
    }
}

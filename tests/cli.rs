//! Integration tests: run the revchain binary against scratch repositories and check exit
//! codes and output.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

struct Workspace {
    project: tempfile::TempDir,
    cache: tempfile::TempDir,
}

impl Workspace {
    /// Two repositories, `first` then `second`, configured through .revchainrc.
    fn new() -> Self {
        let ws = Self {
            project: tempfile::tempdir().unwrap(),
            cache: tempfile::tempdir().unwrap(),
        };
        fs::write(
            ws.project.path().join(".revchainrc"),
            r#"{
                "repositories": [
                    {"name": "first", "path": "repos/first"},
                    {"name": "second", "path": "repos/second"}
                ]
            }"#,
        )
        .unwrap();
        ws
    }

    fn publish(&self, repo: &str, version: &str) {
        let dir = self
            .project
            .path()
            .join("repos")
            .join(repo)
            .join("org.acme")
            .join("core")
            .join(version);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("module.json"), "{}").unwrap();
        fs::write(dir.join(format!("core-{}.jar", version)), format!("{}:{}", repo, version)).unwrap();
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_revchain"))
            .args(args)
            .current_dir(self.project.path())
            .env("REVCHAIN_CACHE_DIR", self.cache.path())
            .env("HOME", self.project.path())
            .env("NO_COLOR", "1")
            .env_remove("REVCHAIN_LOG")
            .env_remove("REVCHAIN_DYNAMIC_TTL_SECS")
            .output()
            .unwrap()
    }

    fn dest(&self) -> std::path::PathBuf {
        self.project.path().join("lib")
    }
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).to_string()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).to_string()
}

#[test]
fn test_help() {
    let ws = Workspace::new();
    let out = ws.run(&["--help"]);
    assert!(out.status.success(), "revchain --help should succeed");
    let text = stdout(&out);
    assert!(text.contains("resolve"));
    assert!(text.contains("download"));
    assert!(text.contains("memo"));
}

#[test]
fn test_repos_lists_in_order() {
    let ws = Workspace::new();
    let out = ws.run(&["repos"]);
    assert!(out.status.success());
    let text = stdout(&out);
    let first = text.find("1. first").unwrap();
    let second = text.find("2. second").unwrap();
    assert!(first < second);
}

#[test]
fn test_resolve_prefers_first_repository_for_static_versions() {
    let ws = Workspace::new();
    ws.publish("first", "1.0");
    ws.publish("second", "1.0");
    let out = ws.run(&["resolve", "org.acme:core:1.0"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("org.acme:core:1.0 -> org.acme:core:1.0 (first)"));
}

#[test]
fn test_resolve_dynamic_takes_latest_across_repositories() {
    let ws = Workspace::new();
    ws.publish("first", "1.2");
    ws.publish("second", "1.9");
    ws.publish("second", "2.0");
    let out = ws.run(&["resolve", "org.acme:core:1.+", "--json"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let parsed: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(parsed[0]["outcome"], "resolved");
    assert_eq!(parsed[0]["module"]["version"], "1.9");
    assert_eq!(parsed[0]["module"]["resolver"], "second");
}

#[test]
fn test_resolve_missing_fails() {
    let ws = Workspace::new();
    ws.publish("first", "1.0");
    let out = ws.run(&["resolve", "org.acme:core:1.0", "org.acme:core:7.0"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("org.acme:core:7.0: not found"));
    assert!(stderr(&out).contains("1 of 2"));
}

#[test]
fn test_resolve_rejects_bad_coordinate() {
    let ws = Workspace::new();
    let out = ws.run(&["resolve", "just-a-name"]);
    assert!(!out.status.success());
}

#[test]
fn test_download_uses_the_supplying_repository() {
    let ws = Workspace::new();
    ws.publish("second", "1.0");
    let dest = ws.dest();
    let out = ws.run(&["download", "org.acme:core:1.0", "--dest", dest.to_str().unwrap()]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(fs::read_to_string(dest.join("core-1.0.jar")).unwrap(), "second:1.0");

    let again = ws.run(&["download", "org.acme:core:1.0", "--dest", dest.to_str().unwrap()]);
    assert!(again.status.success());
    assert!(stdout(&again).contains("up to date"));
}

#[test]
fn test_download_missing_artifact_fails() {
    let ws = Workspace::new();
    ws.publish("first", "1.0");
    let dest = ws.dest();
    let out = ws.run(&[
        "download",
        "org.acme:core:1.0",
        "--artifact",
        "core.pom",
        "--dest",
        dest.to_str().unwrap(),
    ]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("core-1.0.pom"));
}

#[test]
fn test_memo_records_dynamic_resolution_and_clears() {
    let ws = Workspace::new();
    ws.publish("first", "1.4");
    let out = ws.run(&["resolve", "org.acme:core:1.+"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));

    let listed = ws.run(&["memo", "list"]);
    assert!(listed.status.success());
    assert!(stdout(&listed).contains("first  org.acme:core:1.+ -> 1.4"));
    assert!(ws.cache.path().join("dynamic-versions.json").exists());

    // A newer revision stays hidden while the memo is trusted.
    ws.publish("first", "1.5");
    let out = ws.run(&["resolve", "org.acme:core:1.+"]);
    assert!(stdout(&out).contains("-> org.acme:core:1.4 (first)"));

    let cleared = ws.run(&["memo", "clear"]);
    assert!(cleared.status.success());
    assert!(stdout(&cleared).contains("Cleared 1"));
    let out = ws.run(&["resolve", "org.acme:core:1.+"]);
    assert!(stdout(&out).contains("-> org.acme:core:1.5 (first)"));
}

#[test]
fn test_memo_list_empty() {
    let ws = Workspace::new();
    let out = ws.run(&["memo", "list"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("No memoized"));
    assert!(!Path::new(&ws.cache.path().join("dynamic-versions.json")).exists());
}

#[test]
fn test_debug_log_lands_in_configured_cache_dir() {
    let ws = Workspace::new();
    ws.publish("first", "1.0");
    fs::write(
        ws.project.path().join(".revchainrc"),
        r#"{"cacheDir": "cc", "repositories": [{"name": "first", "path": "repos/first"}]}"#,
    )
    .unwrap();

    let out = Command::new(env!("CARGO_BIN_EXE_revchain"))
        .args(["resolve", "org.acme:core:1.0"])
        .current_dir(ws.project.path())
        .env_remove("REVCHAIN_CACHE_DIR")
        .env("HOME", ws.project.path())
        .env("XDG_CACHE_HOME", ws.cache.path())
        .env("NO_COLOR", "1")
        .env("REVCHAIN_LOG", "debug")
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("DEBUG"));

    let logged = fs::read_to_string(ws.project.path().join("cc").join("logs.txt")).unwrap();
    assert!(logged.contains("Resolving 1 coordinate(s) through 'main'"));
}

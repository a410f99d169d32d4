//! Optional config from .revchainrc or ~/.revchainrc (JSON). Merged with env and CLI.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chain::ResolverChain;
use crate::dynamic_versions::{FileDynamicVersionStore, TtlRecheckPolicy};
use crate::latest::latest_strategy_by_name;
use crate::repository::DirectoryResolver;
use crate::resolver::ResolveContext;
use crate::utils;
use crate::version::DefaultVersionMatcher;

pub const CONFIG_FILE: &str = ".revchainrc";
pub const DEFAULT_DYNAMIC_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    name: Option<String>,
    #[serde(default)]
    repositories: Vec<RepositoryConfig>,
    cache_dir: Option<PathBuf>,
    dynamic_version_ttl_secs: Option<u64>,
    latest_strategy: Option<String>,
    check_modified: Option<bool>,
    changing_pattern: Option<String>,
}

/// Everything needed to assemble a resolver chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainConfig {
    pub name: String,
    /// Consulted in this order.
    pub repositories: Vec<RepositoryConfig>,
    pub cache_dir: PathBuf,
    pub dynamic_version_ttl: Duration,
    pub latest_strategy: String,
    pub check_modified: bool,
    pub changing_pattern: Option<String>,
    /// File the settings came from, if any.
    pub source: Option<PathBuf>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            repositories: Vec::new(),
            cache_dir: utils::get_cache_dir(),
            dynamic_version_ttl: Duration::from_secs(DEFAULT_DYNAMIC_TTL_SECS),
            latest_strategy: "latest-revision".to_string(),
            check_modified: false,
            changing_pattern: None,
            source: None,
        }
    }
}

impl ChainConfig {
    /// Parse a config document. Relative paths are taken relative to `base`.
    pub fn parse(content: &str, base: &Path) -> Result<Self, String> {
        let file: ConfigFile =
            serde_json::from_str(content).map_err(|e| format!("invalid config: {}", e))?;
        let mut cfg = ChainConfig::default();
        if let Some(name) = file.name {
            cfg.name = name;
        }
        cfg.repositories = file
            .repositories
            .into_iter()
            .map(|r| RepositoryConfig {
                path: absolutize(base, r.path),
                name: r.name,
            })
            .collect();
        if let Some(dir) = file.cache_dir {
            cfg.cache_dir = absolutize(base, dir);
        }
        if let Some(secs) = file.dynamic_version_ttl_secs {
            cfg.dynamic_version_ttl = Duration::from_secs(secs);
        }
        if let Some(s) = file.latest_strategy {
            cfg.latest_strategy = s;
        }
        if let Some(c) = file.check_modified {
            cfg.check_modified = c;
        }
        cfg.changing_pattern = file.changing_pattern.filter(|p| !p.trim().is_empty());
        Ok(cfg)
    }

    /// Apply `REVCHAIN_CACHE_DIR` and `REVCHAIN_DYNAMIC_TTL_SECS` through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("REVCHAIN_CACHE_DIR").filter(|d| !d.trim().is_empty()) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("REVCHAIN_DYNAMIC_TTL_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.dynamic_version_ttl = Duration::from_secs(secs),
                Err(_) => utils::log_error(&format!(
                    "Ignoring REVCHAIN_DYNAMIC_TTL_SECS={}: not a number of seconds",
                    raw
                )),
            }
        }
    }

    /// Request context matching these settings.
    pub fn context(&self) -> ResolveContext {
        ResolveContext::new(
            Arc::new(DefaultVersionMatcher),
            Arc::new(TtlRecheckPolicy::new(self.dynamic_version_ttl)),
        )
        .with_check_modified(self.check_modified)
    }

    pub fn dynamic_version_store(&self) -> FileDynamicVersionStore {
        FileDynamicVersionStore::open(&self.cache_dir)
    }
}

fn absolutize(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Load config from .revchainrc in dir, then ~/.revchainrc, then apply env overrides.
/// Missing or invalid file = default.
pub fn load_config(dir: &Path) -> ChainConfig {
    let mut candidates = vec![dir.join(CONFIG_FILE)];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(CONFIG_FILE));
    }
    let mut cfg = load_first(&candidates);
    cfg.apply_env(|key| std::env::var(key).ok());
    cfg
}

fn load_first(candidates: &[PathBuf]) -> ChainConfig {
    for path in candidates {
        if !path.is_file() {
            continue;
        }
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|s| ChainConfig::parse(&s, base));
        match parsed {
            Ok(mut cfg) => {
                cfg.source = Some(path.clone());
                return cfg;
            }
            Err(e) => {
                utils::log_error(&format!("Ignoring {}: {}", path.display(), e));
                return ChainConfig::default();
            }
        }
    }
    ChainConfig::default()
}

/// Assemble a chain of directory repositories backed by a file dynamic version store.
pub fn build_chain(cfg: &ChainConfig) -> Result<ResolverChain, String> {
    utils::init_cache(&cfg.cache_dir)
        .map_err(|e| format!("Failed to initialise cache {}: {}", cfg.cache_dir.display(), e))?;
    let latest = latest_strategy_by_name(&cfg.latest_strategy)
        .ok_or_else(|| format!("Unknown latest strategy '{}'", cfg.latest_strategy))?;

    let mut seen = HashSet::new();
    let mut chain = ResolverChain::new(cfg.name.clone(), Arc::new(cfg.dynamic_version_store()))
        .with_latest_strategy(latest);
    for repo in &cfg.repositories {
        if !seen.insert(repo.name.as_str()) {
            return Err(format!("Repository '{}' is configured twice", repo.name));
        }
        if repo.name == cfg.name {
            return Err(format!("Repository '{}' has the same name as the chain", repo.name));
        }
        chain.add_resolver(Arc::new(
            DirectoryResolver::new(repo.name.clone(), repo.path.clone(), cfg.cache_dir.clone())
                .with_changing_pattern(cfg.changing_pattern.clone()),
        ));
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Resolver;

    #[test]
    fn test_parse_full_config() {
        let cfg = ChainConfig::parse(
            r#"{
                "name": "build",
                "repositories": [
                    {"name": "local", "path": "repo"},
                    {"name": "shared", "path": "/srv/repo"}
                ],
                "cacheDir": "/tmp/revchain-cache",
                "dynamicVersionTtlSecs": 60,
                "latestStrategy": "latest-time",
                "checkModified": true,
                "changingPattern": "*-SNAPSHOT"
            }"#,
            Path::new("/work"),
        )
        .unwrap();
        assert_eq!(cfg.name, "build");
        assert_eq!(cfg.repositories[0].path, PathBuf::from("/work/repo"));
        assert_eq!(cfg.repositories[1].path, PathBuf::from("/srv/repo"));
        assert_eq!(cfg.cache_dir, PathBuf::from("/tmp/revchain-cache"));
        assert_eq!(cfg.dynamic_version_ttl, Duration::from_secs(60));
        assert_eq!(cfg.latest_strategy, "latest-time");
        assert!(cfg.check_modified);
        assert_eq!(cfg.changing_pattern.as_deref(), Some("*-SNAPSHOT"));
    }

    #[test]
    fn test_defaults_and_env_overrides() {
        let mut cfg = ChainConfig::parse("{}", Path::new("/work")).unwrap();
        assert!(cfg.repositories.is_empty());
        assert_eq!(cfg.dynamic_version_ttl, Duration::from_secs(DEFAULT_DYNAMIC_TTL_SECS));
        assert_eq!(cfg.latest_strategy, "latest-revision");

        cfg.apply_env(|key| match key {
            "REVCHAIN_CACHE_DIR" => Some("/var/cache/rc".to_string()),
            "REVCHAIN_DYNAMIC_TTL_SECS" => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(cfg.cache_dir, PathBuf::from("/var/cache/rc"));
        assert_eq!(cfg.dynamic_version_ttl, Duration::ZERO);

        cfg.apply_env(|key| (key == "REVCHAIN_DYNAMIC_TTL_SECS").then(|| "soon".to_string()));
        assert_eq!(cfg.dynamic_version_ttl, Duration::ZERO);
    }

    #[test]
    fn test_project_file_wins_and_invalid_falls_back() {
        let project = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::fs::write(project.path().join(CONFIG_FILE), r#"{"name":"project"}"#).unwrap();
        std::fs::write(home.path().join(CONFIG_FILE), r#"{"name":"home"}"#).unwrap();
        let candidates = [project.path().join(CONFIG_FILE), home.path().join(CONFIG_FILE)];
        let cfg = load_first(&candidates);
        assert_eq!(cfg.name, "project");
        assert_eq!(cfg.source.as_deref(), Some(candidates[0].as_path()));

        std::fs::write(project.path().join(CONFIG_FILE), "not json").unwrap();
        assert_eq!(load_first(&candidates).name, "main");

        std::fs::remove_file(project.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(load_first(&candidates).name, "home");
    }

    #[test]
    fn test_build_chain_keeps_repository_order() {
        let _guard = utils::CACHE_DIR_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let cache = tempfile::tempdir().unwrap();
        let cfg = ChainConfig {
            repositories: vec![
                RepositoryConfig { name: "b".into(), path: "/b".into() },
                RepositoryConfig { name: "a".into(), path: "/a".into() },
            ],
            cache_dir: cache.path().to_path_buf(),
            ..ChainConfig::default()
        };
        let chain = build_chain(&cfg).unwrap();
        let names: Vec<&str> = chain.resolvers().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(chain.name(), "main");
        assert!(cache.path().join(utils::LOG_FILE).exists());
        assert_eq!(utils::active_cache_dir(), cache.path());
        assert!(format!("{:?}", chain).contains("resolvers: [\"b\", \"a\"]"));
    }

    #[test]
    fn test_build_chain_rejects_bad_settings() {
        let _guard = utils::CACHE_DIR_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let cache = tempfile::tempdir().unwrap();
        let base = ChainConfig {
            cache_dir: cache.path().to_path_buf(),
            ..ChainConfig::default()
        };

        let unknown = ChainConfig {
            latest_strategy: "newest".into(),
            ..base.clone()
        };
        assert!(build_chain(&unknown).unwrap_err().contains("newest"));

        let dup = ChainConfig {
            repositories: vec![
                RepositoryConfig { name: "a".into(), path: "/a".into() },
                RepositoryConfig { name: "a".into(), path: "/b".into() },
            ],
            ..base
        };
        assert!(build_chain(&dup).unwrap_err().contains("configured twice"));
    }
}

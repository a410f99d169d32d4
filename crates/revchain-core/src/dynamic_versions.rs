//! Dynamic version cache: remembers which concrete revision a dynamic request resolved to,
//! per resolver, so later requests can skip a fresh resolution while the mapping is trusted.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::coordinate::{Coordinate, ModuleMeta};
use crate::utils;

/// A stored mapping as seen at read time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedDynamicVersion {
    pub module: ModuleMeta,
    pub age: Duration,
}

impl CachedDynamicVersion {
    pub fn revision(&self) -> &str {
        &self.module.id.version
    }
}

/// Persistent (resolver, requested coordinate) -> resolved module mapping.
/// Entries are only ever overwritten, never evicted; expiry is decided by a `RecheckPolicy`.
pub trait DynamicVersionStore: Send + Sync {
    fn get(&self, resolver: &str, requested: &Coordinate) -> Option<CachedDynamicVersion>;

    fn put(&self, resolver: &str, requested: &Coordinate, module: &ModuleMeta) -> Result<(), String>;
}

/// Decides whether a memoized dynamic version must be resolved again.
pub trait RecheckPolicy: Send + Sync {
    fn must_recheck(&self, module: &ModuleMeta, age: Duration) -> bool;
}

impl<F> RecheckPolicy for F
where
    F: Fn(&ModuleMeta, Duration) -> bool + Send + Sync,
{
    fn must_recheck(&self, module: &ModuleMeta, age: Duration) -> bool {
        self(module, age)
    }
}

/// Recheck once a mapping is at least `ttl` old. A zero ttl always rechecks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TtlRecheckPolicy {
    pub ttl: Duration,
}

impl TtlRecheckPolicy {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }
}

impl RecheckPolicy for TtlRecheckPolicy {
    fn must_recheck(&self, _module: &ModuleMeta, age: Duration) -> bool {
        age >= self.ttl
    }
}

/// Trust memoized versions forever (offline builds).
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverRecheck;

impl RecheckPolicy for NeverRecheck {
    fn must_recheck(&self, _module: &ModuleMeta, _age: Duration) -> bool {
        false
    }
}

/// Serialized form of one mapping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicVersionEntry {
    pub resolver: String,
    pub requested: Coordinate,
    pub module: ModuleMeta,
    pub saved_at_millis: u64,
}

impl DynamicVersionEntry {
    fn cached(&self) -> CachedDynamicVersion {
        CachedDynamicVersion {
            module: self.module.clone(),
            age: Duration::from_millis(utils::now_millis().saturating_sub(self.saved_at_millis)),
        }
    }
}

fn entry_key(resolver: &str, requested: &Coordinate) -> String {
    format!("{}|{}", resolver, requested)
}

/// Process-local store.
#[derive(Default)]
pub struct InMemoryDynamicVersionStore {
    entries: DashMap<String, DynamicVersionEntry>,
}

impl InMemoryDynamicVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert with an explicit save time (epoch millis).
    pub fn put_at(&self, resolver: &str, requested: &Coordinate, module: &ModuleMeta, saved_at_millis: u64) {
        self.entries.insert(
            entry_key(resolver, requested),
            DynamicVersionEntry {
                resolver: resolver.to_string(),
                requested: requested.clone(),
                module: module.clone(),
                saved_at_millis,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DynamicVersionStore for InMemoryDynamicVersionStore {
    fn get(&self, resolver: &str, requested: &Coordinate) -> Option<CachedDynamicVersion> {
        self.entries
            .get(&entry_key(resolver, requested))
            .map(|e| e.cached())
    }

    fn put(&self, resolver: &str, requested: &Coordinate, module: &ModuleMeta) -> Result<(), String> {
        self.put_at(resolver, requested, module, utils::now_millis());
        Ok(())
    }
}

/// Store backed by one JSON file. Loaded on open, rewritten on every put.
pub struct FileDynamicVersionStore {
    path: PathBuf,
    entries: DashMap<String, DynamicVersionEntry>,
    write_lock: Mutex<()>,
}

pub const DYNAMIC_VERSIONS_FILE: &str = "dynamic-versions.json";

impl FileDynamicVersionStore {
    /// Open `<cache_dir>/dynamic-versions.json`. A missing or corrupt file starts empty.
    pub fn open(cache_dir: &Path) -> Self {
        Self::open_file(cache_dir.join(DYNAMIC_VERSIONS_FILE))
    }

    pub fn open_file(path: PathBuf) -> Self {
        let entries = DashMap::new();
        if let Ok(content) = fs::read_to_string(&path) {
            match serde_json::from_str::<Vec<DynamicVersionEntry>>(&content) {
                Ok(list) => {
                    for e in list {
                        entries.insert(entry_key(&e.resolver, &e.requested), e);
                    }
                }
                Err(e) => utils::log_error(&format!(
                    "Ignoring unreadable dynamic version cache {}: {}",
                    path.display(),
                    e
                )),
            }
        }
        Self {
            path,
            entries,
            write_lock: Mutex::new(()),
        }
    }

    /// All mappings, sorted by resolver then requested coordinate.
    pub fn list(&self) -> Vec<DynamicVersionEntry> {
        let mut out: Vec<DynamicVersionEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| (&a.resolver, &a.requested).cmp(&(&b.resolver, &b.requested)));
        out
    }

    pub fn clear(&self) -> Result<(), String> {
        let _guard = self.write_lock.lock().map_err(|e| e.to_string())?;
        self.entries.clear();
        if self.path.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| format!("Failed to remove {}: {}", self.path.display(), e))?;
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), String> {
        let content = serde_json::to_string_pretty(&self.list())
            .map_err(|e| format!("Failed to serialize dynamic versions: {}", e))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("Failed to create cache dir: {}", e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| format!("Failed to write cache: {}", e))?;
        fs::rename(&tmp, &self.path).map_err(|e| format!("Failed to write cache: {}", e))
    }
}

impl DynamicVersionStore for FileDynamicVersionStore {
    fn get(&self, resolver: &str, requested: &Coordinate) -> Option<CachedDynamicVersion> {
        self.entries
            .get(&entry_key(resolver, requested))
            .map(|e| e.cached())
    }

    fn put(&self, resolver: &str, requested: &Coordinate, module: &ModuleMeta) -> Result<(), String> {
        let _guard = self.write_lock.lock().map_err(|e| e.to_string())?;
        self.entries.insert(
            entry_key(resolver, requested),
            DynamicVersionEntry {
                resolver: resolver.to_string(),
                requested: requested.clone(),
                module: module.clone(),
                saved_at_millis: utils::now_millis(),
            },
        );
        self.persist()
    }
}

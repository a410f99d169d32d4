//! Directory-backed repository.
//!
//! Layout:
//! ```text
//! <root>/<group>/<name>/<version>/module.json
//! <root>/<group>/<name>/<version>/<name>-<version>[-<classifier>].<ext>
//! <root>/<group>/<name>/<version>/<name>-<version>[-<classifier>].<ext>.sha256   (optional)
//! ```
//! `module.json` may be `{}`; recognised fields are `status` and `publishedAt` (RFC 3339).
//! Resolved metadata is cached in memory and under `<cache_dir>/metadata/<repo>/`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::coordinate::{Coordinate, ModuleMeta, ResolvedModule};
use crate::error_handling::ResolveError;
use crate::resolver::{
    Artifact, ArtifactReport, CacheOptions, DownloadOptions, DownloadReport, DownloadStatus,
    ResolveContext, Resolver,
};
use crate::utils::{log_debug, log_error, sanitize_component, sha256_file};
use crate::version::compare_revisions;

pub const MODULE_FILE: &str = "module.json";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModuleDescriptor {
    status: Option<String>,
    published_at: Option<DateTime<Utc>>,
}

/// Metadata cache entry. `metadata_mtime_millis` is the `module.json` mtime at read time.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedMetadata {
    module: ModuleMeta,
    metadata_mtime_millis: Option<u64>,
}

pub struct DirectoryResolver {
    name: String,
    root: PathBuf,
    cache_dir: PathBuf,
    changing_pattern: Option<String>,
    metadata: DashMap<Coordinate, CachedMetadata>,
}

impl DirectoryResolver {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            cache_dir: cache_dir.into(),
            changing_pattern: None,
            metadata: DashMap::new(),
        }
    }

    /// Revisions matching `pattern` are always re-read from the repository.
    pub fn with_changing_pattern(mut self, pattern: Option<String>) -> Self {
        self.changing_pattern = pattern;
        self
    }

    fn module_dir(&self, coordinate: &Coordinate) -> Option<PathBuf> {
        let parts = [&coordinate.group, &coordinate.name, &coordinate.version];
        if parts.iter().any(|p| !is_plain_component(p)) {
            return None;
        }
        Some(
            self.root
                .join(&coordinate.group)
                .join(&coordinate.name)
                .join(&coordinate.version),
        )
    }

    fn metadata_file(&self, id: &Coordinate) -> PathBuf {
        self.cache_dir
            .join("metadata")
            .join(sanitize_component(&self.name))
            .join(sanitize_component(&id.group))
            .join(sanitize_component(&id.name))
            .join(format!("{}.json", sanitize_component(&id.version)))
    }

    /// Read `module.json` for a concrete coordinate. `Ok(None)` when the revision is absent.
    fn read_module(&self, id: &Coordinate) -> Result<Option<CachedMetadata>, ResolveError> {
        let Some(dir) = self.module_dir(id) else {
            return Ok(None);
        };
        let path = dir.join(MODULE_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| ResolveError::backend(&self.name, id, format!("failed to read {}: {}", path.display(), e)))?;
        let descriptor: ModuleDescriptor = if content.trim().is_empty() {
            ModuleDescriptor::default()
        } else {
            serde_json::from_str(&content)
                .map_err(|e| ResolveError::parse(id, format!("invalid {}: {}", path.display(), e)))?
        };

        let mtime = modified(&path);
        let published = descriptor
            .published_at
            .or_else(|| mtime.map(DateTime::<Utc>::from))
            .unwrap_or_else(Utc::now);
        Ok(Some(CachedMetadata {
            module: ModuleMeta {
                id: id.clone(),
                status: descriptor.status.unwrap_or_else(|| "release".to_string()),
                published,
            },
            metadata_mtime_millis: mtime.map(to_millis),
        }))
    }

    /// Version directories under `<group>/<name>` that carry a `module.json`.
    fn list_versions(&self, coordinate: &Coordinate) -> Result<Vec<String>, ResolveError> {
        if !is_plain_component(&coordinate.group) || !is_plain_component(&coordinate.name) {
            return Ok(Vec::new());
        }
        let dir = self.root.join(&coordinate.group).join(&coordinate.name);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ResolveError::backend(
                    &self.name,
                    coordinate,
                    format!("failed to list {}: {}", dir.display(), e),
                ))
            }
        };
        let mut versions = Vec::new();
        for entry in entries.flatten() {
            if entry.path().join(MODULE_FILE).is_file() {
                if let Some(v) = entry.file_name().to_str() {
                    versions.push(v.to_string());
                }
            }
        }
        Ok(versions)
    }

    fn resolve_dynamic(
        &self,
        coordinate: &Coordinate,
        ctx: &ResolveContext,
    ) -> Result<Option<CachedMetadata>, ResolveError> {
        let mut accepted = Vec::new();
        for version in self.list_versions(coordinate)? {
            if ctx
                .matcher
                .accepts(&coordinate.version, &version)
                .map_err(|e| ResolveError::parse(coordinate, e))?
            {
                accepted.push(version);
            }
        }
        // Highest first; the status filter may skip some.
        accepted.sort_by(|a, b| compare_revisions(b, a));

        let wanted_status = coordinate.version.strip_prefix("latest.");
        for version in accepted {
            let Some(found) = self.read_module(&coordinate.with_version(version))? else {
                continue;
            };
            match wanted_status {
                Some(wanted) if !status_satisfies(&found.module.status, wanted) => continue,
                _ => return Ok(Some(found)),
            }
        }
        Ok(None)
    }

    fn remember(&self, entry: &CachedMetadata) {
        let path = self.metadata_file(&entry.module.id);
        let written = serde_json::to_string_pretty(entry)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(|e| e.to_string())?;
                }
                fs::write(&path, json).map_err(|e| e.to_string())
            });
        if let Err(e) = written {
            log_error(&format!("Failed to cache metadata at {}: {}", path.display(), e));
        }
        self.metadata.insert(entry.module.id.clone(), entry.clone());
    }

    fn forget(&self, id: &Coordinate) {
        self.metadata.remove(id);
        let _ = fs::remove_file(self.metadata_file(id));
    }

    fn cached_entry(&self, id: &Coordinate) -> Option<CachedMetadata> {
        if let Some(entry) = self.metadata.get(id) {
            return Some(entry.clone());
        }
        let content = fs::read_to_string(self.metadata_file(id)).ok()?;
        let entry: CachedMetadata = serde_json::from_str(&content).ok()?;
        if &entry.module.id != id {
            return None;
        }
        self.metadata.insert(id.clone(), entry.clone());
        Some(entry)
    }

    fn to_module(&self, meta: ModuleMeta) -> ResolvedModule {
        ResolvedModule::new(meta.id, meta.published, self.name.clone()).with_status(meta.status)
    }

    fn download_artifact(&self, artifact: &Artifact, options: &DownloadOptions) -> Result<ArtifactReport, String> {
        let file_name = artifact.file_name();
        if !is_plain_component(&file_name) {
            return Err(format!("invalid artifact file name '{}'", file_name));
        }
        let source = self
            .module_dir(&artifact.module)
            .map(|dir| dir.join(&file_name))
            .filter(|p| p.is_file())
            .ok_or_else(|| format!("{} not found in repository '{}'", file_name, self.name))?;

        let sha256 = sha256_file(&source).map_err(|e| format!("failed to hash {}: {}", source.display(), e))?;
        if options.verify_checksums {
            verify_sidecar(&source, &sha256)?;
        }

        let dest_dir = match &options.destination {
            Some(dir) => dir.clone(),
            None => self
                .cache_dir
                .join("artifacts")
                .join(sanitize_component(&self.name))
                .join(sanitize_component(&artifact.module.group))
                .join(sanitize_component(&artifact.module.name))
                .join(sanitize_component(&artifact.module.version)),
        };
        let dest = dest_dir.join(&file_name);

        let status = if dest.is_file() && sha256_file(&dest).map(|h| h == sha256).unwrap_or(false) {
            DownloadStatus::NoChange
        } else {
            fs::create_dir_all(&dest_dir)
                .map_err(|e| format!("failed to create {}: {}", dest_dir.display(), e))?;
            if dest.exists() {
                fs::remove_file(&dest).map_err(|e| format!("failed to replace {}: {}", dest.display(), e))?;
            }
            reflink_copy::reflink_or_copy(&source, &dest)
                .map_err(|e| format!("failed to copy {} to {}: {}", source.display(), dest.display(), e))?;
            DownloadStatus::Successful
        };

        let size = fs::metadata(&dest).map(|m| m.len()).ok();
        Ok(ArtifactReport {
            artifact: artifact.clone(),
            status,
            resolver: Some(self.name.clone()),
            local_path: Some(dest),
            size,
            sha256: Some(sha256),
            message: None,
        })
    }
}

impl Resolver for DirectoryResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn cache_options(&self, ctx: &ResolveContext) -> CacheOptions {
        CacheOptions {
            check_modified: ctx.check_modified,
            changing_pattern: self.changing_pattern.clone(),
        }
    }

    fn lookup_cached(&self, coordinate: &Coordinate, options: &CacheOptions) -> Option<ResolvedModule> {
        if options.is_changing(&coordinate.version) {
            return None;
        }
        let entry = self.cached_entry(coordinate)?;
        if options.check_modified {
            let current = self
                .module_dir(coordinate)
                .and_then(|dir| modified(&dir.join(MODULE_FILE)))
                .map(to_millis);
            if current != entry.metadata_mtime_millis {
                log_debug(&format!(
                    "Metadata for {} changed in '{}', dropping cached entry",
                    coordinate, self.name
                ));
                self.forget(coordinate);
                return None;
            }
        }
        Some(self.to_module(entry.module))
    }

    fn resolve(
        &self,
        coordinate: &Coordinate,
        ctx: &ResolveContext,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        let found = if ctx.matcher.is_dynamic(coordinate) {
            self.resolve_dynamic(coordinate, ctx)?
        } else {
            self.read_module(coordinate)?
        };
        Ok(found.map(|entry| {
            self.remember(&entry);
            self.to_module(entry.module)
        }))
    }

    fn download(&self, artifacts: &[Artifact], options: &DownloadOptions) -> DownloadReport {
        let mut report = DownloadReport::default();
        for artifact in artifacts {
            report.push(self.download_artifact(artifact, options).unwrap_or_else(|message| {
                let mut failed = ArtifactReport::failed(artifact.clone(), message);
                failed.resolver = Some(self.name.clone());
                failed
            }));
        }
        report
    }
}

fn is_plain_component(part: &str) -> bool {
    !part.is_empty() && part != "." && part != ".." && !part.contains(['/', '\\'])
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn to_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn status_rank(status: &str) -> Option<u8> {
    match status {
        "integration" => Some(0),
        "milestone" => Some(1),
        "release" => Some(2),
        _ => None,
    }
}

/// `latest.<wanted>` accepts any status at least as mature as `wanted`. Unknown statuses must
/// match exactly.
fn status_satisfies(status: &str, wanted: &str) -> bool {
    match (status_rank(status), status_rank(wanted)) {
        (Some(have), Some(want)) => have >= want,
        _ => status == wanted,
    }
}

fn verify_sidecar(source: &Path, actual: &str) -> Result<(), String> {
    let mut sidecar = source.as_os_str().to_owned();
    sidecar.push(".sha256");
    let sidecar = PathBuf::from(sidecar);
    let Ok(content) = fs::read_to_string(&sidecar) else {
        return Ok(());
    };
    let expected = content.split_whitespace().next().unwrap_or_default().to_lowercase();
    if expected != actual {
        return Err(format!(
            "checksum mismatch for {}: expected {}, got {}",
            source.display(),
            expected,
            actual
        ));
    }
    Ok(())
}

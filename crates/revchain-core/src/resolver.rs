//! The capability every repository backend exposes, plus the request context and the
//! download report types shared by all backends.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coordinate::{Coordinate, ResolvedModule};
use crate::dynamic_versions::{RecheckPolicy, TtlRecheckPolicy};
use crate::error_handling::ResolveError;
use crate::version::{DefaultVersionMatcher, VersionMatcher};

/// Per-request settings: how versions are classified and how long memoized dynamic
/// versions are trusted.
#[derive(Clone)]
pub struct ResolveContext {
    pub matcher: Arc<dyn VersionMatcher>,
    pub recheck_policy: Arc<dyn RecheckPolicy>,
    /// Validate cached metadata against its source before trusting it.
    pub check_modified: bool,
}

impl ResolveContext {
    pub fn new(matcher: Arc<dyn VersionMatcher>, recheck_policy: Arc<dyn RecheckPolicy>) -> Self {
        Self {
            matcher,
            recheck_policy,
            check_modified: false,
        }
    }

    pub fn with_check_modified(mut self, check_modified: bool) -> Self {
        self.check_modified = check_modified;
        self
    }
}

impl Default for ResolveContext {
    /// Default matcher; dynamic versions trusted for 24 hours.
    fn default() -> Self {
        Self::new(
            Arc::new(DefaultVersionMatcher),
            Arc::new(TtlRecheckPolicy::new(Duration::from_secs(24 * 60 * 60))),
        )
    }
}

impl fmt::Debug for ResolveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveContext")
            .field("check_modified", &self.check_modified)
            .finish_non_exhaustive()
    }
}

/// How a backend's metadata cache may be used for one request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheOptions {
    pub check_modified: bool,
    /// Revisions matching this (substring, or `*`-glob) are never served from cache.
    pub changing_pattern: Option<String>,
}

impl CacheOptions {
    pub fn is_changing(&self, revision: &str) -> bool {
        match self.changing_pattern.as_deref() {
            None | Some("") => false,
            Some(pattern) => glob_match(pattern, revision),
        }
    }
}

/// `*` matches any run of characters; a pattern without `*` matches as a substring.
fn glob_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return text.contains(pattern);
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = text;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

/// One file belonging to a module revision.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    pub module: Coordinate,
    pub name: String,
    pub ext: String,
    pub classifier: Option<String>,
}

impl Artifact {
    pub fn new(module: Coordinate, name: impl Into<String>, ext: impl Into<String>) -> Self {
        Self {
            module,
            name: name.into(),
            ext: ext.into(),
            classifier: None,
        }
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    /// Main artifact of a module: `<name>.jar`-style file named after the module.
    pub fn main(module: Coordinate, ext: impl Into<String>) -> Self {
        let name = module.name.clone();
        Self::new(module, name, ext)
    }

    /// `<name>-<version>[-<classifier>].<ext>`
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(c) => format!("{}-{}-{}.{}", self.name, self.module.version, c, self.ext),
            None => format!("{}-{}.{}", self.name, self.module.version, self.ext),
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.module, self.file_name())
    }
}

#[derive(Clone, Debug, Default)]
pub struct DownloadOptions {
    /// Where artifacts land; backends choose a cache location when unset.
    pub destination: Option<PathBuf>,
    pub verify_checksums: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadStatus {
    Successful,
    /// The destination already held the same bytes.
    NoChange,
    Failed,
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DownloadStatus::Successful => "successful",
            DownloadStatus::NoChange => "no-change",
            DownloadStatus::Failed => "failed",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReport {
    pub artifact: Artifact,
    pub status: DownloadStatus,
    pub resolver: Option<String>,
    pub local_path: Option<PathBuf>,
    pub size: Option<u64>,
    pub sha256: Option<String>,
    pub message: Option<String>,
}

impl ArtifactReport {
    pub fn failed(artifact: Artifact, message: impl Into<String>) -> Self {
        Self {
            artifact,
            status: DownloadStatus::Failed,
            resolver: None,
            local_path: None,
            size: None,
            sha256: None,
            message: Some(message.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == DownloadStatus::Failed
    }
}

/// Reports for a batch of artifacts, in request order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReport {
    pub artifacts: Vec<ArtifactReport>,
}

impl DownloadReport {
    pub fn push(&mut self, report: ArtifactReport) {
        self.artifacts.push(report);
    }

    pub fn report_for(&self, artifact: &Artifact) -> Option<&ArtifactReport> {
        self.artifacts.iter().find(|r| &r.artifact == artifact)
    }

    /// Take the report for `artifact` out of a single-artifact batch.
    pub fn into_report_for(self, artifact: &Artifact) -> Option<ArtifactReport> {
        self.artifacts.into_iter().find(|r| &r.artifact == artifact)
    }

    pub fn failed_count(&self) -> usize {
        self.artifacts.iter().filter(|r| r.is_failed()).count()
    }
}

/// A repository backend. Implementations are shared between resolving threads.
pub trait Resolver: Send + Sync {
    fn name(&self) -> &str;

    /// Cache options for a request; backends without a metadata cache keep the default.
    fn cache_options(&self, ctx: &ResolveContext) -> CacheOptions {
        CacheOptions {
            check_modified: ctx.check_modified,
            changing_pattern: None,
        }
    }

    /// Metadata cache only; never touches the backing repository.
    fn lookup_cached(&self, coordinate: &Coordinate, options: &CacheOptions) -> Option<ResolvedModule>;

    /// Full resolution against the backing repository. `Ok(None)` means not found.
    fn resolve(
        &self,
        coordinate: &Coordinate,
        ctx: &ResolveContext,
    ) -> Result<Option<ResolvedModule>, ResolveError>;

    /// One report per requested artifact. Failures are reported, not returned as errors.
    fn download(&self, artifacts: &[Artifact], options: &DownloadOptions) -> DownloadReport;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_file_name() {
        let m = Coordinate::new("org.acme", "core", "1.2");
        assert_eq!(Artifact::main(m.clone(), "jar").file_name(), "core-1.2.jar");
        assert_eq!(
            Artifact::main(m, "jar").with_classifier("sources").file_name(),
            "core-1.2-sources.jar"
        );
    }

    #[test]
    fn test_changing_pattern() {
        let opts = CacheOptions {
            check_modified: false,
            changing_pattern: Some("*-SNAPSHOT".to_string()),
        };
        assert!(opts.is_changing("1.0-SNAPSHOT"));
        assert!(!opts.is_changing("1.0"));

        let substring = CacheOptions {
            check_modified: false,
            changing_pattern: Some("dev".to_string()),
        };
        assert!(substring.is_changing("2.0-dev3"));
        assert!(!CacheOptions::default().is_changing("anything"));
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("1.*-rc*", "1.4-rc2"));
        assert!(!glob_match("1.*-rc*", "2.4-rc2"));
        assert!(glob_match("*", "x"));
    }

    #[test]
    fn test_report_lookup() {
        let a = Artifact::main(Coordinate::new("g", "a", "1"), "jar");
        let b = Artifact::main(Coordinate::new("g", "b", "1"), "jar");
        let mut report = DownloadReport::default();
        report.push(ArtifactReport::failed(a.clone(), "missing"));
        assert!(report.report_for(&a).is_some());
        assert!(report.report_for(&b).is_none());
        assert_eq!(report.failed_count(), 1);
    }
}

//! Module coordinates and resolved module revisions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version-less module identity (`group:name`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId {
    pub group: String,
    pub name: String,
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

/// Module identity plus requested version. The version may be exact (`1.4.2`) or dynamic
/// (`latest.release`, `1.+`, `[1.0,2.0)`, `^1.2`); a `VersionMatcher` decides which.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub group: String,
    pub name: String,
    pub version: String,
}

impl Coordinate {
    pub fn new(group: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn module_id(&self) -> ModuleId {
        ModuleId {
            group: self.group.clone(),
            name: self.name.clone(),
        }
    }

    /// Same module, different requested version.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            group: self.group.clone(),
            name: self.name.clone(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)
    }
}

impl FromStr for Coordinate {
    type Err = String;

    /// Parse `group:name:version`. The version is everything after the second colon so
    /// ranges such as `[1.0,2.0)` survive intact.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, ':');
        let group = parts.next().unwrap_or_default().trim();
        let name = parts.next().unwrap_or_default().trim();
        let version = parts.next().unwrap_or_default().trim();
        if group.is_empty() || name.is_empty() || version.is_empty() {
            return Err(format!(
                "Invalid coordinate '{}': expected group:name:version",
                s
            ));
        }
        Ok(Coordinate::new(group, name, version))
    }
}

/// Metadata snapshot of a resolved module, enough to decide whether a memoized dynamic
/// version is still trustworthy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMeta {
    pub id: Coordinate,
    pub status: String,
    pub published: DateTime<Utc>,
}

/// A concrete module revision produced by some resolver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedModule {
    pub id: Coordinate,
    pub published: DateTime<Utc>,
    pub status: String,
    /// Name of the resolver that produced this module.
    pub resolver: String,
    /// Name of the resolver that serves artifacts, when it differs from `resolver`.
    pub artifact_resolver: Option<String>,
}

impl ResolvedModule {
    pub fn new(id: Coordinate, published: DateTime<Utc>, resolver: impl Into<String>) -> Self {
        Self {
            id,
            published,
            status: "release".to_string(),
            resolver: resolver.into(),
            artifact_resolver: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_artifact_resolver(mut self, resolver: impl Into<String>) -> Self {
        self.artifact_resolver = Some(resolver.into());
        self
    }

    pub fn artifact_resolver_name(&self) -> &str {
        self.artifact_resolver.as_deref().unwrap_or(&self.resolver)
    }

    pub fn revision(&self) -> &str {
        &self.id.version
    }

    pub fn meta(&self) -> ModuleMeta {
        ModuleMeta {
            id: self.id.clone(),
            status: self.status.clone(),
            published: self.published,
        }
    }
}

impl fmt::Display for ResolvedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinate() {
        let c: Coordinate = "org.acme:core:1.2.3".parse().unwrap();
        assert_eq!(c, Coordinate::new("org.acme", "core", "1.2.3"));
        assert_eq!(c.to_string(), "org.acme:core:1.2.3");
        assert_eq!(c.module_id().to_string(), "org.acme:core");
    }

    #[test]
    fn test_parse_coordinate_keeps_range() {
        let c: Coordinate = "org.acme:core:[1.0,2.0)".parse().unwrap();
        assert_eq!(c.version, "[1.0,2.0)");
    }

    #[test]
    fn test_parse_coordinate_rejects_missing_parts() {
        assert!("org.acme:core".parse::<Coordinate>().is_err());
        assert!("::1.0".parse::<Coordinate>().is_err());
        assert!("".parse::<Coordinate>().is_err());
    }

    #[test]
    fn test_artifact_resolver_defaults_to_producer() {
        let m = ResolvedModule::new(Coordinate::new("g", "n", "1"), Utc::now(), "local");
        assert_eq!(m.artifact_resolver_name(), "local");
        let m = m.with_artifact_resolver("remote");
        assert_eq!(m.artifact_resolver_name(), "remote");
    }
}

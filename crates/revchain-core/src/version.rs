//! Version constraints: deciding whether a requested version is dynamic and whether a
//! concrete revision satisfies it.
//!
//! Supported dynamic forms:
//! - `latest`, `latest.<status>`, `+`
//! - prefix matches: `1.2.+`
//! - intervals: `[1.0,2.0)`, `]1.0,2.0[`, `[1.5,)`, `(,2.0]`
//! - semver requirements: `^1.2`, `~1.2.3`, `>=1.0, <2.0`, `*`

use std::cmp::Ordering;

use semver::{Version, VersionReq};

use crate::coordinate::Coordinate;

/// Classifies requested versions. Implementations must be shareable across resolving threads.
pub trait VersionMatcher: Send + Sync {
    fn is_dynamic(&self, coordinate: &Coordinate) -> bool;

    /// Whether `revision` satisfies `constraint`. Malformed constraints are an error.
    fn accepts(&self, constraint: &str, revision: &str) -> Result<bool, String>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultVersionMatcher;

#[derive(Clone, Debug, PartialEq)]
enum Constraint {
    Exact(String),
    Latest,
    Prefix(String),
    Interval {
        lower: Option<(Version, bool)>,
        upper: Option<(Version, bool)>,
    },
    Semver(VersionReq),
}

fn looks_dynamic(version: &str) -> bool {
    let v = version.trim();
    v == "latest"
        || v.starts_with("latest.")
        || v.ends_with('+')
        || v.starts_with('[')
        || v.starts_with('(')
        || v.starts_with(']')
        || v.starts_with('^')
        || v.starts_with('~')
        || v.starts_with('>')
        || v.starts_with('<')
        || v.starts_with('*')
        || v.contains(',')
}

fn parse_bound(raw: &str, constraint: &str) -> Result<Option<Version>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    parse_lenient(raw)
        .map(Some)
        .ok_or_else(|| format!("invalid bound '{}' in range '{}'", raw, constraint))
}

fn parse_constraint(constraint: &str) -> Result<Constraint, String> {
    let c = constraint.trim();
    if c.is_empty() {
        return Err("empty version constraint".to_string());
    }
    if !looks_dynamic(c) {
        return Ok(Constraint::Exact(c.to_string()));
    }
    if c == "latest" || c.starts_with("latest.") || c == "+" {
        return Ok(Constraint::Latest);
    }
    if let Some(prefix) = c.strip_suffix('+') {
        return Ok(Constraint::Prefix(prefix.to_string()));
    }
    let first = c.chars().next().unwrap_or_default();
    if matches!(first, '[' | '(' | ']') {
        let last = c.chars().last().unwrap_or_default();
        if c.len() < 2 || !matches!(last, ']' | ')' | '[') {
            return Err(format!("unterminated range '{}'", c));
        }
        let body = &c[1..c.len() - 1];
        let Some((lo, hi)) = body.split_once(',') else {
            // `[1.0]` pins a single revision.
            let v = parse_bound(body, c)?
                .ok_or_else(|| format!("empty range '{}'", c))?;
            return Ok(Constraint::Interval {
                lower: Some((v.clone(), true)),
                upper: Some((v, true)),
            });
        };
        let lower = parse_bound(lo, c)?.map(|v| (v, first == '['));
        let upper = parse_bound(hi, c)?.map(|v| (v, last == ']'));
        return Ok(Constraint::Interval { lower, upper });
    }
    VersionReq::parse(c)
        .map(Constraint::Semver)
        .map_err(|e| format!("invalid version requirement '{}': {}", c, e))
}

impl VersionMatcher for DefaultVersionMatcher {
    fn is_dynamic(&self, coordinate: &Coordinate) -> bool {
        looks_dynamic(&coordinate.version)
    }

    fn accepts(&self, constraint: &str, revision: &str) -> Result<bool, String> {
        Ok(match parse_constraint(constraint)? {
            Constraint::Exact(v) => v == revision.trim(),
            Constraint::Latest => true,
            Constraint::Prefix(p) => revision.starts_with(&p),
            Constraint::Interval { lower, upper } => {
                let Some(rev) = parse_lenient(revision) else {
                    return Ok(false);
                };
                let above = match &lower {
                    Some((v, true)) => rev >= *v,
                    Some((v, false)) => rev > *v,
                    None => true,
                };
                let below = match &upper {
                    Some((v, true)) => rev <= *v,
                    Some((v, false)) => rev < *v,
                    None => true,
                };
                above && below
            }
            Constraint::Semver(req) => parse_lenient(revision)
                .map(|v| req.matches(&v))
                .unwrap_or(false),
        })
    }
}

/// Parse a revision as semver, padding missing minor/patch (`1.2` -> `1.2.0`) and
/// dropping a leading `v`.
pub fn parse_lenient(revision: &str) -> Option<Version> {
    let r = revision.trim().trim_start_matches('v');
    if let Ok(v) = Version::parse(r) {
        return Some(v);
    }
    let split_at = r.find(['-', '+']).unwrap_or(r.len());
    let (core, rest) = r.split_at(split_at);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return None;
    }
    let mut padded: Vec<&str> = parts;
    while padded.len() < 3 {
        padded.push("0");
    }
    Version::parse(&format!("{}{}", padded.join("."), rest)).ok()
}

/// Revision ordering: semver when both sides parse, plain string order otherwise.
pub fn compare_revisions(a: &str, b: &str) -> Ordering {
    match (parse_lenient(a), parse_lenient(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

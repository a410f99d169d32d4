//! Error taxonomy for resolution.
//! A single resolver's failure is collected by the chain and only surfaces when every
//! resolver failed or found nothing; see `aggregate`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error raised while resolving a coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolveError {
    /// The request or the metadata behind it could not be parsed.
    Parse {
        coordinate: String,
        reason: String,
    },
    /// Any other failure of a single resolver (I/O, unreachable backend, caught panic).
    Backend {
        resolver: String,
        coordinate: String,
        reason: String,
    },
    /// Several resolvers failed; only the text of each failure is kept.
    Multiple {
        coordinate: String,
        message: String,
    },
}

impl ResolveError {
    pub fn parse(coordinate: impl fmt::Display, reason: impl Into<String>) -> Self {
        ResolveError::Parse {
            coordinate: coordinate.to_string(),
            reason: reason.into(),
        }
    }

    pub fn backend(
        resolver: impl Into<String>,
        coordinate: impl fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        ResolveError::Backend {
            resolver: resolver.into(),
            coordinate: coordinate.to_string(),
            reason: reason.into(),
        }
    }

    /// Coordinate the failure refers to, as requested.
    pub fn coordinate(&self) -> &str {
        match self {
            ResolveError::Parse { coordinate, .. }
            | ResolveError::Backend { coordinate, .. }
            | ResolveError::Multiple { coordinate, .. } => coordinate,
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Parse { coordinate, reason } => {
                write!(f, "could not parse request {}: {}", coordinate, reason)
            }
            ResolveError::Backend {
                resolver,
                coordinate,
                reason,
            } => {
                write!(f, "resolver '{}' failed for {}: {}", resolver, coordinate, reason)
            }
            ResolveError::Multiple { message, .. } => f.write_str(message),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Collapse the errors collected during the live phase into one.
/// A single error is returned unchanged so callers can still match on its kind.
pub fn aggregate(coordinate: impl fmt::Display, mut errors: Vec<ResolveError>) -> Option<ResolveError> {
    match errors.len() {
        0 => None,
        1 => errors.pop(),
        _ => {
            let lines: Vec<String> = errors.iter().map(|e| format!("\t{}", e)).collect();
            let coordinate = coordinate.to_string();
            Some(ResolveError::Multiple {
                message: format!(
                    "several problems occurred while resolving {}:\n{}",
                    coordinate,
                    lines.join("\n")
                ),
                coordinate,
            })
        }
    }
}

/// Render a caught panic payload as text.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "resolver panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate("g:n:1", vec![]).is_none());
    }

    #[test]
    fn test_aggregate_single_keeps_kind() {
        let err = ResolveError::parse("g:n:[1", "unterminated range");
        let out = aggregate("g:n:[1", vec![err.clone()]).unwrap();
        assert_eq!(out, err);
        assert!(matches!(out, ResolveError::Parse { .. }));
    }

    #[test]
    fn test_aggregate_multiple_lists_each_line() {
        let e1 = ResolveError::backend("central", "g:n:1", "connection refused");
        let e2 = ResolveError::backend("mirror", "g:n:1", "timed out");
        let out = aggregate("g:n:1", vec![e1, e2]).unwrap();
        let text = out.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "several problems occurred while resolving g:n:1:");
        assert_eq!(lines[1], "\tresolver 'central' failed for g:n:1: connection refused");
        assert_eq!(lines[2], "\tresolver 'mirror' failed for g:n:1: timed out");
        assert_eq!(out.coordinate(), "g:n:1");
    }
}

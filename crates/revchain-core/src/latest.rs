//! Latest-selection strategies. The chain hands a strategy the revisions that resolvers
//! produced for one request and takes its answer as final.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::version::compare_revisions;

/// Plain projection of a resolved candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionInfo {
    pub revision: String,
    pub last_modified: DateTime<Utc>,
}

pub trait LatestStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Index of the winning candidate, or `None` to reject all of them.
    fn pick_latest(&self, candidates: &[RevisionInfo]) -> Option<usize>;
}

/// Index of the maximum under `cmp`; on ties the earliest candidate wins.
fn max_index_by<F>(candidates: &[RevisionInfo], mut cmp: F) -> Option<usize>
where
    F: FnMut(&RevisionInfo, &RevisionInfo) -> Ordering,
{
    let mut best: Option<usize> = None;
    for (i, c) in candidates.iter().enumerate() {
        match best {
            Some(b) if cmp(c, &candidates[b]) != Ordering::Greater => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Highest revision (semver-aware).
#[derive(Clone, Copy, Debug, Default)]
pub struct LatestRevision;

impl LatestStrategy for LatestRevision {
    fn name(&self) -> &str {
        "latest-revision"
    }

    fn pick_latest(&self, candidates: &[RevisionInfo]) -> Option<usize> {
        max_index_by(candidates, |a, b| compare_revisions(&a.revision, &b.revision))
    }
}

/// Most recently published.
#[derive(Clone, Copy, Debug, Default)]
pub struct LatestTime;

impl LatestStrategy for LatestTime {
    fn name(&self) -> &str {
        "latest-time"
    }

    fn pick_latest(&self, candidates: &[RevisionInfo]) -> Option<usize> {
        max_index_by(candidates, |a, b| a.last_modified.cmp(&b.last_modified))
    }
}

/// Plain string order on the revision.
#[derive(Clone, Copy, Debug, Default)]
pub struct LatestLexicographic;

impl LatestStrategy for LatestLexicographic {
    fn name(&self) -> &str {
        "latest-lexicographic"
    }

    fn pick_latest(&self, candidates: &[RevisionInfo]) -> Option<usize> {
        max_index_by(candidates, |a, b| a.revision.cmp(&b.revision))
    }
}

/// Strategy for a config name; unknown names yield `None`.
pub fn latest_strategy_by_name(name: &str) -> Option<Arc<dyn LatestStrategy>> {
    match name.trim() {
        "latest-revision" | "revision" => Some(Arc::new(LatestRevision)),
        "latest-time" | "time" => Some(Arc::new(LatestTime)),
        "latest-lexicographic" | "lexicographic" => Some(Arc::new(LatestLexicographic)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn info(rev: &str, secs: i64) -> RevisionInfo {
        RevisionInfo {
            revision: rev.to_string(),
            last_modified: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_empty_has_no_winner() {
        assert_eq!(LatestRevision.pick_latest(&[]), None);
        assert_eq!(LatestTime.pick_latest(&[]), None);
        assert_eq!(LatestLexicographic.pick_latest(&[]), None);
    }

    #[test]
    fn test_latest_revision_is_semver_aware() {
        let c = [info("1.9", 300), info("1.10", 100), info("1.2", 200)];
        assert_eq!(LatestRevision.pick_latest(&c), Some(1));
        // Lexicographic ordering disagrees.
        assert_eq!(LatestLexicographic.pick_latest(&c), Some(0));
    }

    #[test]
    fn test_latest_time() {
        let c = [info("1.9", 300), info("1.10", 100), info("1.2", 200)];
        assert_eq!(LatestTime.pick_latest(&c), Some(0));
    }

    #[test]
    fn test_ties_keep_first() {
        let c = [info("2.0", 1), info("2.0.0", 5)];
        assert_eq!(LatestRevision.pick_latest(&c), Some(0));
        let c = [info("1.0", 7), info("2.0", 7)];
        assert_eq!(LatestTime.pick_latest(&c), Some(0));
    }

    #[test]
    fn test_strategy_by_name() {
        assert_eq!(latest_strategy_by_name("latest-time").unwrap().name(), "latest-time");
        assert_eq!(latest_strategy_by_name("revision").unwrap().name(), "latest-revision");
        assert!(latest_strategy_by_name("newest").is_none());
    }
}

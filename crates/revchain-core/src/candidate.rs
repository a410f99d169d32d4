//! Per-request, per-resolver resolution state and latest-selection over it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::coordinate::{Coordinate, ResolvedModule};
use crate::error_handling::{panic_message, ResolveError};
use crate::latest::{LatestStrategy, RevisionInfo};
use crate::memoizer::DynamicRevisionMemoizer;
use crate::resolver::{ResolveContext, Resolver};

/// One resolver's view of a single `resolve` call. Lives only for that call.
pub struct ResolutionCandidate {
    index: usize,
    resolver: Arc<dyn Resolver>,
    /// What the resolver is asked for: the request, or its memoized revision.
    coordinate: Coordinate,
    requested: Coordinate,
    static_version: bool,
    module: Option<ResolvedModule>,
}

impl ResolutionCandidate {
    /// `static_version` is computed once per request from the original descriptor.
    pub fn new(
        index: usize,
        resolver: Arc<dyn Resolver>,
        descriptor: &Coordinate,
        static_version: bool,
        memoizer: &DynamicRevisionMemoizer,
        ctx: &ResolveContext,
    ) -> Self {
        let rewritten = memoizer.rewrite(
            resolver.name(),
            descriptor,
            static_version,
            ctx.recheck_policy.as_ref(),
        );
        Self {
            index,
            resolver,
            coordinate: rewritten.unwrap_or_else(|| descriptor.clone()),
            requested: descriptor.clone(),
            static_version,
            module: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.resolver
    }

    pub fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }

    pub fn is_static_version(&self) -> bool {
        self.static_version
    }

    pub fn module(&self) -> Option<&ResolvedModule> {
        self.module.as_ref()
    }

    pub fn into_module(self) -> Option<ResolvedModule> {
        self.module
    }

    fn set_module(&mut self, module: Option<ResolvedModule>) {
        debug_assert!(self.module.is_none(), "resolved module is write-once");
        if self.module.is_none() {
            self.module = module;
        }
    }

    /// Cache-only lookup against this resolver's metadata cache.
    pub fn lookup_in_cache(&mut self, ctx: &ResolveContext) {
        let options = self.resolver.cache_options(ctx);
        let found = self.resolver.lookup_cached(&self.coordinate, &options);
        self.set_module(found);
    }

    /// Live resolution. Panics inside the resolver are turned into a backend error so the
    /// chain can move on to the next resolver. A success refreshes the memo for the original
    /// request, also when the coordinate came from that memo.
    pub fn resolve_live(
        &mut self,
        ctx: &ResolveContext,
        memoizer: &DynamicRevisionMemoizer,
    ) -> Result<(), ResolveError> {
        let resolver = Arc::clone(&self.resolver);
        let coordinate = self.coordinate.clone();
        let outcome = catch_unwind(AssertUnwindSafe(|| resolver.resolve(&coordinate, ctx)))
            .unwrap_or_else(|payload| {
                Err(ResolveError::backend(
                    resolver.name(),
                    &coordinate,
                    panic_message(&*payload),
                ))
            })?;

        if let Some(module) = &outcome {
            memoizer.remember(&self.requested, module);
        }
        self.set_module(outcome);
        Ok(())
    }

    pub fn revision_info(&self) -> Option<RevisionInfo> {
        self.module.as_ref().map(|m| RevisionInfo {
            revision: m.revision().to_string(),
            last_modified: m.published,
        })
    }
}

/// Let `strategy` pick among the candidates that resolved something. Candidates are offered in
/// configuration order; the returned position indexes `candidates`.
pub fn select_latest(candidates: &[ResolutionCandidate], strategy: &dyn LatestStrategy) -> Option<usize> {
    let resolved: Vec<(usize, RevisionInfo)> = candidates
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.revision_info().map(|info| (i, info)))
        .collect();
    let infos: Vec<RevisionInfo> = resolved.iter().map(|(_, info)| info.clone()).collect();
    strategy
        .pick_latest(&infos)
        .and_then(|winner| resolved.get(winner))
        .map(|(i, _)| *i)
}

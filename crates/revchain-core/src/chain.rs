//! Resolver chain: resolves a coordinate against an ordered list of resolvers and routes
//! later artifact downloads back to whichever resolver supplied the module.
//!
//! Resolution runs in two phases over one `ResolutionCandidate` per resolver:
//! 1. cache phase: every resolver's metadata cache, in order; the first hit wins outright.
//! 2. live phase: every resolver, in order. Errors are collected and the loop continues.
//!    A static request returns on the first module found; a dynamic request asks every
//!    resolver and lets the `LatestStrategy` pick among the answers.
//!
//! Both phases, and the download fallback, walk resolvers in configuration order.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use rayon::prelude::*;

use crate::candidate::{select_latest, ResolutionCandidate};
use crate::coordinate::{Coordinate, ResolvedModule};
use crate::dynamic_versions::DynamicVersionStore;
use crate::error_handling::{aggregate, panic_message, ResolveError};
use crate::latest::{LatestRevision, LatestStrategy};
use crate::memoizer::DynamicRevisionMemoizer;
use crate::resolver::{
    Artifact, ArtifactReport, CacheOptions, DownloadOptions, DownloadReport, ResolveContext, Resolver,
};
use crate::utils::log_debug;

/// Where downloads for a resolved module go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Affinity {
    /// Index into the chain's resolvers.
    Member(usize),
    /// The module named the chain itself; downloads try every resolver.
    Chain,
}

pub struct ResolverChain {
    name: String,
    resolvers: Vec<Arc<dyn Resolver>>,
    memoizer: DynamicRevisionMemoizer,
    latest: Arc<dyn LatestStrategy>,
    /// Resolved coordinate -> supplier. Last writer wins; never iterated.
    affinity: DashMap<Coordinate, Affinity>,
}

impl fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.resolvers.iter().map(|r| r.name()).collect();
        f.debug_struct("ResolverChain")
            .field("name", &self.name)
            .field("resolvers", &names)
            .field("latest", &self.latest.name())
            .finish_non_exhaustive()
    }
}

impl ResolverChain {
    pub fn new(name: impl Into<String>, store: Arc<dyn DynamicVersionStore>) -> Self {
        Self {
            name: name.into(),
            resolvers: Vec::new(),
            memoizer: DynamicRevisionMemoizer::new(store),
            latest: Arc::new(LatestRevision),
            affinity: DashMap::new(),
        }
    }

    pub fn with_latest_strategy(mut self, latest: Arc<dyn LatestStrategy>) -> Self {
        self.latest = latest;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.add_resolver(resolver);
        self
    }

    pub fn add_resolver(&mut self, resolver: Arc<dyn Resolver>) {
        self.resolvers.push(resolver);
    }

    pub fn resolvers(&self) -> &[Arc<dyn Resolver>] {
        &self.resolvers
    }

    pub fn affinity_for(&self, module: &Coordinate) -> Option<Affinity> {
        self.affinity.get(module).map(|a| *a)
    }

    fn remember_affinity(&self, module: &Coordinate, affinity: Affinity) {
        self.affinity.insert(module.clone(), affinity);
    }

    /// Affinity for a live result: the member named as the module's artifact resolver, the
    /// chain itself, or else the resolver that was asked.
    fn live_affinity(&self, candidate_index: usize, module: &ResolvedModule) -> Affinity {
        let name = module.artifact_resolver_name();
        if let Some(i) = self.resolvers.iter().position(|r| r.name() == name) {
            return Affinity::Member(i);
        }
        if name == self.name {
            return Affinity::Chain;
        }
        Affinity::Member(candidate_index)
    }

    fn create_candidates(&self, descriptor: &Coordinate, ctx: &ResolveContext) -> Vec<ResolutionCandidate> {
        let static_version = !ctx.matcher.is_dynamic(descriptor);
        self.resolvers
            .iter()
            .enumerate()
            .map(|(i, r)| {
                ResolutionCandidate::new(i, Arc::clone(r), descriptor, static_version, &self.memoizer, ctx)
            })
            .collect()
    }

    /// Resolve `descriptor` to one module. `Ok(None)` when no resolver knows it and none failed.
    pub fn resolve_module(
        &self,
        descriptor: &Coordinate,
        ctx: &ResolveContext,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        let mut candidates = self.create_candidates(descriptor, ctx);

        if let Some(i) = self.lookup_all_in_cache_and_get_latest(&mut candidates, ctx) {
            if let Some((index, module)) = take_winner(&mut candidates, i) {
                log_debug(&format!(
                    "Found module {} in resolver cache {}",
                    module.id,
                    self.resolvers[index].name()
                ));
                self.remember_affinity(&module.id, Affinity::Member(index));
                return Ok(Some(module));
            }
        }

        let Some(i) = self.resolve_latest_module(&mut candidates, descriptor, ctx)? else {
            return Ok(None);
        };
        let Some((index, module)) = take_winner(&mut candidates, i) else {
            return Ok(None);
        };
        let affinity = self.live_affinity(index, &module);
        log_debug(&format!(
            "Found module {} using resolver {} (downloads via {:?})",
            module.id, module.resolver, affinity
        ));
        self.remember_affinity(&module.id, affinity);
        Ok(Some(module))
    }

    fn lookup_all_in_cache_and_get_latest(
        &self,
        candidates: &mut [ResolutionCandidate],
        ctx: &ResolveContext,
    ) -> Option<usize> {
        for (i, candidate) in candidates.iter_mut().enumerate() {
            candidate.lookup_in_cache(ctx);
            if candidate.module().is_some() {
                return Some(i);
            }
        }
        // Only reached when no cache hit: the strategy is handed an empty set.
        select_latest(candidates, self.latest.as_ref())
    }

    fn resolve_latest_module(
        &self,
        candidates: &mut [ResolutionCandidate],
        descriptor: &Coordinate,
        ctx: &ResolveContext,
    ) -> Result<Option<usize>, ResolveError> {
        let mut errors = Vec::new();
        for (i, candidate) in candidates.iter_mut().enumerate() {
            match candidate.resolve_live(ctx, &self.memoizer) {
                Ok(()) => {
                    if candidate.module().is_some() && candidate.is_static_version() {
                        return Ok(Some(i));
                    }
                }
                Err(e) => {
                    log_debug(&format!(
                        "Resolver {} failed for {}: {}",
                        candidate.resolver().name(),
                        candidate.coordinate(),
                        e
                    ));
                    errors.push(e);
                }
            }
        }

        let latest = select_latest(candidates, self.latest.as_ref());
        if latest.is_none() {
            if let Some(err) = aggregate(descriptor, errors) {
                return Err(err);
            }
        }
        Ok(latest)
    }

    /// One report per artifact, in input order. Never fails as a whole.
    pub fn download_artifacts(&self, artifacts: &[Artifact], options: &DownloadOptions) -> DownloadReport {
        let mut overall = DownloadReport::default();
        for artifact in artifacts {
            let report = match self.affinity_for(&artifact.module) {
                Some(Affinity::Member(i)) if i < self.resolvers.len() => {
                    self.download_from_single_repository(i, artifact, options)
                }
                _ => self.download_from_any_repository(artifact, options),
            };
            overall.push(report);
        }
        overall
    }

    fn download_from_single_repository(
        &self,
        index: usize,
        artifact: &Artifact,
        options: &DownloadOptions,
    ) -> ArtifactReport {
        let resolver = &self.resolvers[index];
        log_debug(&format!(
            "Attempting to download artifact {} using resolver {}",
            artifact,
            resolver.name()
        ));
        download_one(resolver.as_ref(), artifact, options)
    }

    fn download_from_any_repository(&self, artifact: &Artifact, options: &DownloadOptions) -> ArtifactReport {
        log_debug(&format!("Attempting to download {} using all resolvers", artifact));
        for resolver in &self.resolvers {
            let report = download_one(resolver.as_ref(), artifact, options);
            if !report.is_failed() {
                return report;
            }
        }
        ArtifactReport::failed(
            artifact.clone(),
            format!("no resolver in '{}' could download {}", self.name, artifact),
        )
    }
}

fn take_winner(candidates: &mut Vec<ResolutionCandidate>, i: usize) -> Option<(usize, ResolvedModule)> {
    if i >= candidates.len() {
        return None;
    }
    let candidate = candidates.swap_remove(i);
    let index = candidate.index();
    candidate.into_module().map(|m| (index, m))
}

/// Download a single artifact from one resolver. A missing report or a panic becomes a
/// failed report.
fn download_one(resolver: &dyn Resolver, artifact: &Artifact, options: &DownloadOptions) -> ArtifactReport {
    let single = std::slice::from_ref(artifact);
    match catch_unwind(AssertUnwindSafe(|| resolver.download(single, options))) {
        Ok(report) => report.into_report_for(artifact).unwrap_or_else(|| {
            ArtifactReport::failed(
                artifact.clone(),
                format!("resolver '{}' returned no report for {}", resolver.name(), artifact),
            )
        }),
        Err(payload) => ArtifactReport::failed(
            artifact.clone(),
            format!("resolver '{}' panicked: {}", resolver.name(), panic_message(&*payload)),
        ),
    }
}

impl Resolver for ResolverChain {
    fn name(&self) -> &str {
        &self.name
    }

    /// First cache hit among the members, in order. A hit routes later downloads to that member.
    fn lookup_cached(&self, coordinate: &Coordinate, options: &CacheOptions) -> Option<ResolvedModule> {
        self.resolvers.iter().enumerate().find_map(|(i, r)| {
            let module = r.lookup_cached(coordinate, options)?;
            self.remember_affinity(&module.id, Affinity::Member(i));
            Some(module)
        })
    }

    fn resolve(
        &self,
        coordinate: &Coordinate,
        ctx: &ResolveContext,
    ) -> Result<Option<ResolvedModule>, ResolveError> {
        self.resolve_module(coordinate, ctx)
    }

    fn download(&self, artifacts: &[Artifact], options: &DownloadOptions) -> DownloadReport {
        self.download_artifacts(artifacts, options)
    }
}

/// Resolve many coordinates concurrently, one `resolve_module` call each. Output keeps
/// request order.
pub fn resolve_all(
    chain: &ResolverChain,
    requests: &[Coordinate],
    ctx: &ResolveContext,
) -> Vec<(Coordinate, Result<Option<ResolvedModule>, ResolveError>)> {
    requests
        .par_iter()
        .map(|c| (c.clone(), chain.resolve_module(c, ctx)))
        .collect()
}

//! Trust-or-recheck layer over a `DynamicVersionStore`.

use std::sync::Arc;

use crate::coordinate::{Coordinate, ResolvedModule};
use crate::dynamic_versions::{DynamicVersionStore, RecheckPolicy};
use crate::utils::{log_debug, log_error};

pub struct DynamicRevisionMemoizer {
    store: Arc<dyn DynamicVersionStore>,
}

impl DynamicRevisionMemoizer {
    pub fn new(store: Arc<dyn DynamicVersionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DynamicVersionStore> {
        &self.store
    }

    /// Coordinate to ask `resolver` for. Returns `None` when the descriptor should be used
    /// unchanged: static request, nothing memoized, or the memo has expired.
    pub fn rewrite(
        &self,
        resolver: &str,
        descriptor: &Coordinate,
        static_version: bool,
        policy: &dyn RecheckPolicy,
    ) -> Option<Coordinate> {
        if static_version {
            return None;
        }
        let cached = self.store.get(resolver, descriptor)?;
        if policy.must_recheck(&cached.module, cached.age) {
            log_debug(&format!(
                "Resolved revision in dynamic revision cache is expired: will perform fresh resolve of '{}' in '{}'",
                descriptor, resolver
            ));
            return None;
        }
        log_debug(&format!(
            "Found resolved revision in dynamic revision cache: using '{}' for '{}' in '{}'",
            cached.revision(),
            descriptor,
            resolver
        ));
        Some(descriptor.with_version(cached.revision()))
    }

    /// Persist `original -> module` under the module's resolver unless the request was already
    /// concrete. Store failures are logged; a lost memo only costs a later fresh resolve.
    pub fn remember(&self, original: &Coordinate, module: &ResolvedModule) {
        if original == &module.id {
            return;
        }
        log_debug(&format!(
            "Caching resolved revision in dynamic revision cache: will use '{}' for '{}'",
            module.id, original
        ));
        if let Err(e) = self.store.put(&module.resolver, original, &module.meta()) {
            log_error(&format!(
                "Failed to save dynamic revision for {} ({}): {}",
                original, module.resolver, e
            ));
        }
    }
}

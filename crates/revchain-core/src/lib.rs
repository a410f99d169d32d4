//! Core library for revchain: an ordered resolver chain with dynamic version memoization
//! and download routing back to the repository that supplied each module.
//! Used by the CLI binary; the `Resolver` trait is the extension point for other backends.

pub mod candidate;
pub mod chain;
pub mod config;
pub mod coordinate;
pub mod dynamic_versions;
pub mod error_handling;
pub mod latest;
pub mod memoizer;
pub mod repository;
pub mod resolver;
pub mod utils;
pub mod version;


// Re-export main API for CLI
pub use chain::{resolve_all, Affinity, ResolverChain};
pub use config::{build_chain, load_config, ChainConfig, RepositoryConfig};
pub use coordinate::{Coordinate, ModuleId, ModuleMeta, ResolvedModule};
pub use dynamic_versions::{
    DynamicVersionEntry, DynamicVersionStore, FileDynamicVersionStore, InMemoryDynamicVersionStore,
    NeverRecheck, RecheckPolicy, TtlRecheckPolicy,
};
pub use error_handling::ResolveError;
pub use latest::{latest_strategy_by_name, LatestStrategy};
pub use repository::DirectoryResolver;
pub use resolver::{
    Artifact, ArtifactReport, DownloadOptions, DownloadReport, DownloadStatus, ResolveContext,
    Resolver,
};
pub use utils::{get_cache_dir, init_cache, log, log_debug, log_error};
pub use version::{DefaultVersionMatcher, VersionMatcher};

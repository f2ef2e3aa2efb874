//! Configuration: manifest types, loading, and extends resolution

pub mod loader;
pub mod merge;
pub mod types;

pub use loader::{find_root, load_monorepo_config, load_workspace_manifest, CONFIG_FILE};
pub use merge::deep_merge;
pub use types::{
    CacheConfig, ConfigRef, ExecutorConfig, ExecutorKind, MatchBy, MonorepoConfig, RunnerConfig,
    RunnerKind, WorkspaceFilter, WorkspaceManifest, WorkspaceScript,
};

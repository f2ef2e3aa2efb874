//! Convoy Core - Core library for the Convoy task orchestrator
//!
//! This crate provides the configuration model (including extends-chain
//! resolution and deep merging), the workspace/monorepo model with
//! discovery, and the shared error types.

pub mod config;
pub mod error;
pub mod monorepo;

pub use config::{
    CacheConfig, ConfigRef, ExecutorConfig, ExecutorKind, MatchBy, MonorepoConfig, RunnerConfig,
    RunnerKind, WorkspaceFilter, WorkspaceManifest, WorkspaceScript,
};
pub use error::{ConfigError, ConvoyError, Result};
pub use monorepo::{Monorepo, RunContext, Workspace};

//! Configuration types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How a workspace filter pattern is matched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchBy {
    /// Match the pattern against the workspace name
    #[default]
    Name,
    /// Match the pattern against the workspace directory
    Directory,
}

/// Selects workspaces by a regex pattern over their name or directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceFilter {
    /// Regex pattern
    pub pattern: String,
    /// What the pattern is matched against
    #[serde(default)]
    pub by: MatchBy,
}

/// A pipeline entry: run `script` in every workspace matching the filter.
///
/// When `script` is omitted it defaults to the script currently being
/// expanded, which is what makes "same script, different workspace" edges
/// expressible with a single declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceScript {
    /// Regex pattern
    pub pattern: String,
    /// What the pattern is matched against
    #[serde(default)]
    pub by: MatchBy,
    /// Target script to run in matched workspaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

/// Reference to another config of the same family: by registry name, or an
/// inline config used directly as the base.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigRef<T> {
    /// Name of a registered config
    Named(String),
    /// Inline config object
    Inline(Box<T>),
}

/// Cache configuration — a closed family tagged by `kind`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CacheConfig {
    /// Hash the contents of a resolved file set
    Files {
        /// Path patterns: literal paths, directories, or globs. May contain
        /// the `{monorepo_dir}` / `{workspace_dir}` placeholders.
        patterns: Vec<String>,
    },
    /// Compose several caches into one gate
    Multiple {
        /// Sub-caches, hashed in declaration order
        caches: Vec<CacheConfig>,
    },
}

/// Runner strategy discriminant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    /// Run the script in every filtered workspace
    #[default]
    Many,
    /// Expand pipeline declarations into a dependency-ordered unit graph
    Pipeline,
    /// Compose several runners under one umbrella
    Multiple,
    /// Re-enter another monorepo script
    Root,
}

/// Runner configuration.
///
/// A flat struct with a `kind` discriminant; fields not applying to a kind
/// are simply unused. Scalars are `Option` so that extends-merging never
/// overwrites a base value with an unset default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Base config to inherit from (registry name or inline)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<ConfigRef<RunnerConfig>>,

    /// Runner strategy; defaults to `many`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<RunnerKind>,

    /// Environment variables added for every task of this runner
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Runner-level cache gating task execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,

    /// Bypass cache gating entirely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_cache: Option<bool>,

    /// Whether tasks of this runner may run concurrently with adjacent
    /// parallel tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,

    /// Re-run a failing task instead of failing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_on_error: Option<bool>,

    /// Cap on restarts; unbounded when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<u32>,

    /// Propagate a task failure, aborting the enclosing scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throw_on_error: Option<bool>,

    /// Executor used when a workspace declares no override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<ExecutorConfig>,

    /// Allow-list of workspaces (takes precedence over `exclude`)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<WorkspaceFilter>,

    /// Workspaces to skip; only applied when `include` is empty
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<WorkspaceFilter>,

    /// Pipeline: scripts that must run in the same workspace first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub self_scripts: Vec<String>,

    /// Pipeline: scripts that must run in every dependency workspace first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependency_scripts: Vec<String>,

    /// Pipeline: scripts that must run in pattern-matched workspaces first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub workspace_scripts: Vec<WorkspaceScript>,

    /// Multiple: child runners (registry names or inline)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub runners: Vec<ConfigRef<RunnerConfig>>,

    /// Multiple: abort remaining children on the first failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_on_error: Option<bool>,

    /// Root: the monorepo script to re-enter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl RunnerConfig {
    /// Effective runner kind
    pub fn kind(&self) -> RunnerKind {
        self.kind.unwrap_or_default()
    }

    /// Whether tasks of this runner opt into parallel batching
    pub fn parallel(&self) -> bool {
        self.parallel.unwrap_or(false)
    }

    /// Whether failing tasks are restarted
    pub fn restart_on_error(&self) -> bool {
        self.restart_on_error.unwrap_or(false)
    }

    /// Whether task failures propagate
    pub fn throw_on_error(&self) -> bool {
        self.throw_on_error.unwrap_or(false)
    }

    /// Whether cache gating is bypassed
    pub fn skip_cache(&self) -> bool {
        self.skip_cache.unwrap_or(false)
    }

    /// Whether a multiple runner stops on the first child failure
    pub fn stop_on_error(&self) -> bool {
        self.stop_on_error.unwrap_or(false)
    }
}

/// Executor strategy discriminant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// Run the command line the workspace declares for a script
    #[default]
    Script,
    /// Run an explicit program with arguments
    Command,
    /// Compose several executors
    Multiple,
}

/// Executor configuration, same flat-struct shape as [`RunnerConfig`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Base config to inherit from (workspace executor name or inline)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<ConfigRef<ExecutorConfig>>,

    /// Executor strategy; defaults to `script`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ExecutorKind>,

    /// Environment variables added for the task
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Executor-level cache gating task execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,

    /// Bypass cache gating entirely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_cache: Option<bool>,

    /// Script: the script name to run; defaults to the task's script
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    /// Command: the program to spawn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Command: arguments passed to the program
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Multiple: child executors (workspace executor names or inline)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub executors: Vec<ConfigRef<ExecutorConfig>>,

    /// Multiple: run children concurrently
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,

    /// Multiple: abort remaining children on the first failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_on_error: Option<bool>,
}

impl ExecutorConfig {
    /// Default executor: run the task's script by name
    pub fn script(script: impl Into<String>) -> Self {
        Self {
            kind: Some(ExecutorKind::Script),
            script: Some(script.into()),
            ..Default::default()
        }
    }

    /// Effective executor kind
    pub fn kind(&self) -> ExecutorKind {
        self.kind.unwrap_or_default()
    }

    /// Whether cache gating is bypassed
    pub fn skip_cache(&self) -> bool {
        self.skip_cache.unwrap_or(false)
    }

    /// Whether a multiple executor runs children concurrently
    pub fn parallel(&self) -> bool {
        self.parallel.unwrap_or(false)
    }

    /// Whether a multiple executor stops on the first child failure
    pub fn stop_on_error(&self) -> bool {
        self.stop_on_error.unwrap_or(false)
    }
}

/// Root `convoy.toml` configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonorepoConfig {
    /// Monorepo name
    pub name: Option<String>,

    /// Member directory patterns relative to the root (literal or glob)
    pub members: Vec<String>,

    /// Environment variables applied to every task
    pub env: BTreeMap<String, String>,

    /// Global workspace allow-list
    pub include: Vec<WorkspaceFilter>,

    /// Global workspace exclusions; only applied when `include` is empty
    pub exclude: Vec<WorkspaceFilter>,

    /// Named runners, keyed by the script they handle
    pub runner: BTreeMap<String, RunnerConfig>,
}

/// Per-workspace `convoy.toml` manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceManifest {
    /// Workspace name; must be unique within the monorepo
    pub name: Option<String>,

    /// Script name -> command line
    pub scripts: BTreeMap<String, String>,

    /// Names of workspaces this workspace depends on
    pub dependencies: Vec<String>,

    /// Environment variables for tasks in this workspace
    pub env: BTreeMap<String, String>,

    /// Named executor overrides, keyed by script
    pub executor: BTreeMap<String, ExecutorConfig>,
}

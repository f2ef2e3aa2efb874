//! Task — the atomic unit of work
//!
//! A task binds a (script, workspace, runner config, executor) tuple. Its
//! `start` gates execution through the cache engine and delegates the
//! actual action to the executor.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use convoy_core::config::{CacheConfig, RunnerConfig};
use convoy_core::error::ConfigError;
use convoy_core::monorepo::Workspace;

use crate::cache::{CacheContext, CacheError, TaskCache};
use crate::executor::{ExecContext, Executor};
use crate::reporter::{TaskEvent, TaskReporter};

/// Errors from executing a single unit
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The unit's action failed
    #[error("Script '{script}' failed in workspace '{workspace}': {reason}")]
    Failed {
        script: String,
        workspace: String,
        reason: String,
    },

    /// The workspace declares neither the script nor an executor for it
    #[error("Workspace '{workspace}' has no script '{script}'")]
    MissingScript { workspace: String, script: String },

    /// The process could not be spawned
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// Configuration failure while preparing the task
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Cache record failure; not specially distinguished by callers
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// A concrete (workspace, script) execution unit
#[derive(Clone)]
pub struct Task {
    /// Script being executed
    pub script: String,
    /// Workspace the script runs in
    pub workspace: Arc<Workspace>,
    /// Resolved config of the owning runner (drives policy and caching)
    pub runner: Arc<RunnerConfig>,
    /// Prepared executor performing the action
    pub executor: Executor,
    monorepo_dir: PathBuf,
    monorepo_env: BTreeMap<String, String>,
    reporter: Arc<dyn TaskReporter>,
}

impl Task {
    /// Create a task bound to its run context pieces
    pub fn new(
        script: impl Into<String>,
        workspace: Arc<Workspace>,
        runner: Arc<RunnerConfig>,
        executor: Executor,
        monorepo_dir: PathBuf,
        monorepo_env: BTreeMap<String, String>,
        reporter: Arc<dyn TaskReporter>,
    ) -> Self {
        Self {
            script: script.into(),
            workspace,
            runner,
            executor,
            monorepo_dir,
            monorepo_env,
            reporter,
        }
    }

    /// Unit identity, `workspace:script`
    pub fn id(&self) -> String {
        format!("{}:{}", self.workspace.name, self.script)
    }

    /// The progress sink this task reports to
    pub fn reporter(&self) -> &Arc<dyn TaskReporter> {
        &self.reporter
    }

    /// Layered environment: monorepo, then runner, then workspace, then
    /// executor — later wins.
    pub fn env(&self) -> BTreeMap<String, String> {
        let mut env = self.monorepo_env.clone();
        env.extend(self.runner.env.clone());
        env.extend(self.workspace.env.clone());
        env.extend(self.executor.config().env.clone());
        env
    }

    /// Run the unit, gated through the cache engine.
    ///
    /// With no cache declared on either the runner or the executor, or
    /// with either side setting `skip_cache`, the action runs
    /// unconditionally. Otherwise the present caches are composed into one
    /// gate: the action only runs when inputs changed, and the new hash is
    /// persisted after it completes without error.
    pub async fn start(&self) -> Result<(), TaskError> {
        let started = Instant::now();
        let id = self.id();
        self.reporter.report(&TaskEvent::Started { id: id.clone() });

        match self.run_gated().await {
            Ok(cached) => {
                self.reporter.report(&TaskEvent::Completed {
                    id,
                    duration: started.elapsed(),
                    cached,
                });
                Ok(())
            }
            Err(err) => {
                self.reporter.report(&TaskEvent::Failed {
                    id,
                    duration: started.elapsed(),
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Returns whether execution was skipped on a cache hit
    async fn run_gated(&self) -> Result<bool, TaskError> {
        let mut configs: Vec<&CacheConfig> = Vec::new();
        if let Some(cache) = &self.runner.cache {
            configs.push(cache);
        }
        if let Some(cache) = &self.executor.config().cache {
            configs.push(cache);
        }

        let skip = self.runner.skip_cache() || self.executor.config().skip_cache();
        if configs.is_empty() || skip {
            self.execute().await?;
            return Ok(false);
        }

        let cache_ctx = CacheContext {
            monorepo_dir: self.monorepo_dir.clone(),
            workspace: self.workspace.clone(),
            script: self.script.clone(),
        };
        let cache = TaskCache::compose(&configs, &cache_ctx)?;

        if cache.compute()? {
            tracing::info!(task = %self.id(), "executing task, cache miss");
            self.execute().await?;
            cache.save()?;
            Ok(false)
        } else {
            tracing::info!(task = %self.id(), "skipping execution, cache hit");
            Ok(true)
        }
    }

    async fn execute(&self) -> Result<(), TaskError> {
        let ctx = ExecContext {
            workspace: self.workspace.clone(),
            script: self.script.clone(),
            env: self.env(),
            reporter: self.reporter.clone(),
        };
        self.executor.execute(&ctx).await
    }
}

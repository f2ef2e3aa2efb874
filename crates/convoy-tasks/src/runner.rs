//! Runners — strategies for deciding which units run, in what grouping
//!
//! A runner is dispatched on its config's `kind`: `many` runs one script
//! across every filtered workspace, `pipeline` expands declarations into a
//! dependency-ordered unit graph, `multiple` composes child runners, and
//! `root` re-enters another monorepo script.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use convoy_core::config::{ConfigRef, ExecutorConfig, RunnerConfig, RunnerKind};
use convoy_core::error::ConfigError;
use convoy_core::monorepo::{RunContext, Workspace};

use crate::executor::Executor;
use crate::graph::{format_cycle, Graph, GraphError, Vertex};
use crate::pipeline::{script_pipelines, unit_id, workspace_pipelines, ExecutionUnit};
use crate::reporter::{TaskEvent, TaskReporter};
use crate::task::{Task, TaskError};

/// Errors from a run
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The unit graph is cyclic
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A task failure propagated through `throw_on_error`
    #[error(transparent)]
    Task(#[from] TaskError),

    /// A spawned task panicked
    #[error("Task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Run a monorepo script: resolve its registered runner, falling back to
/// running it everywhere in parallel.
///
/// Boxed because `root` runners re-enter this function.
pub fn run_script<'a>(
    ctx: &'a RunContext,
    script: &'a str,
    reporter: Arc<dyn TaskReporter>,
) -> BoxFuture<'a, Result<(), RunError>> {
    Box::pin(async move {
        let config = resolve_script_runner(ctx, script)?;
        Runner::new(script, Arc::new(config), reporter).run(ctx).await
    })
}

/// The registered runner config for a script, resolved; or the default
/// "run everywhere in parallel" fallback.
fn resolve_script_runner(ctx: &RunContext, script: &str) -> Result<RunnerConfig, ConfigError> {
    match ctx.monorepo.runner(script) {
        Some(config) => config.resolve(&ctx.monorepo.config.runner),
        None => Ok(RunnerConfig {
            kind: Some(RunnerKind::Many),
            parallel: Some(true),
            ..Default::default()
        }),
    }
}

/// A runner bound to a script, with its config resolved
pub struct Runner {
    /// Script this runner was invoked for
    pub script: String,
    /// Resolved configuration
    pub config: Arc<RunnerConfig>,
    reporter: Arc<dyn TaskReporter>,
}

impl Runner {
    /// Create a runner from an already-resolved config
    pub fn new(
        script: impl Into<String>,
        config: Arc<RunnerConfig>,
        reporter: Arc<dyn TaskReporter>,
    ) -> Self {
        Self {
            script: script.into(),
            config,
            reporter,
        }
    }

    /// Run according to the config's kind. Boxed because `multiple` and
    /// `root` runners recurse.
    pub fn run<'a>(&'a self, ctx: &'a RunContext) -> BoxFuture<'a, Result<(), RunError>> {
        Box::pin(async move {
            match self.config.kind() {
                RunnerKind::Many => self.run_many(ctx).await,
                RunnerKind::Pipeline => self.run_pipeline(ctx).await,
                RunnerKind::Multiple => self.run_multiple(ctx).await,
                RunnerKind::Root => self.run_root(ctx).await,
            }
        })
    }

    /// Run the script across every filtered workspace as one flat list
    async fn run_many(&self, ctx: &RunContext) -> Result<(), RunError> {
        let workspaces = filtered_workspaces(ctx, &self.config, Some(&self.script))?;

        if workspaces.is_empty() {
            warn!(script = %self.script, "no workspaces found for script");
            return Ok(());
        }

        info!(script = %self.script, count = workspaces.len(), "running workspaces");

        let tasks = workspaces
            .iter()
            .map(|workspace| self.create_task(ctx, &self.script, workspace, None))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        self.run_tasks(tasks).await
    }

    /// Expand the pipeline into a unit graph and run it layer by layer
    async fn run_pipeline(&self, ctx: &RunContext) -> Result<(), RunError> {
        let pipelines = script_pipelines(ctx, &self.script, &self.config)?;
        let seeds = filtered_workspaces(ctx, &self.config, Some(&self.script))?;
        let units = workspace_pipelines(ctx, &pipelines, &self.script, &seeds)?;

        if units.is_empty() {
            warn!(script = %self.script, "no workspaces found for script");
            return Ok(());
        }

        let mut graph: Graph<ExecutionUnit> = Graph::new();
        for unit in units {
            graph.add_vertex(Vertex {
                id: unit.id.clone(),
                edges: unit.depends_on.clone(),
                data: unit,
            });
        }

        if let Some(cycle) = graph.find_cycle() {
            return Err(GraphError::Cycle(format_cycle(&cycle)).into());
        }

        let layers = graph.layers();
        info!(
            script = %self.script,
            tasks = graph.len(),
            layers = layers.len(),
            "running pipelines"
        );

        for (index, layer) in layers.iter().enumerate() {
            self.reporter.report(&TaskEvent::LayerStarted {
                layer: index,
                task_count: layer.len(),
            });

            let tasks = layer
                .iter()
                .map(|vertex| {
                    let unit = &vertex.data;
                    self.create_task(
                        ctx,
                        &unit.pipeline.script,
                        &unit.workspace,
                        Some(&unit.pipeline.runner),
                    )
                })
                .collect::<Result<Vec<_>, ConfigError>>()?;

            self.run_tasks(tasks).await?;
        }

        Ok(())
    }

    /// Run child runners under one umbrella
    async fn run_multiple(&self, ctx: &RunContext) -> Result<(), RunError> {
        let configs = self
            .config
            .runners
            .iter()
            .map(|child| match child {
                ConfigRef::Named(name) => ctx
                    .monorepo
                    .runner(name)
                    .ok_or_else(|| ConfigError::RunnerNotFound(name.clone()))
                    .and_then(|config| config.resolve(&ctx.monorepo.config.runner)),
                ConfigRef::Inline(config) => config.resolve(&ctx.monorepo.config.runner),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if configs.is_empty() {
            return Err(ConfigError::MissingField("runner.runners".to_string()).into());
        }

        let children: Vec<Runner> = configs
            .into_iter()
            .map(|config| Runner::new(&self.script, Arc::new(config), self.reporter.clone()))
            .collect();

        let stop_on_error = self.config.stop_on_error();

        if self.config.parallel() {
            let results =
                futures::future::join_all(children.iter().map(|child| child.run(ctx))).await;

            let mut first_error = None;
            for result in results {
                if let Err(err) = result {
                    if stop_on_error && first_error.is_none() {
                        first_error = Some(err);
                    } else {
                        warn!("{}", err);
                    }
                }
            }
            if let Some(err) = first_error {
                return Err(err);
            }
        } else {
            for child in &children {
                if let Err(err) = child.run(ctx).await {
                    if stop_on_error {
                        return Err(err);
                    }
                    warn!("{}", err);
                }
            }
        }

        Ok(())
    }

    /// Re-enter another monorepo script
    async fn run_root(&self, ctx: &RunContext) -> Result<(), RunError> {
        let target = self
            .config
            .script
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("runner.script".to_string()))?;

        run_script(ctx, target, self.reporter.clone()).await
    }

    /// Create a task, resolving its executor: workspace override first,
    /// then the runner's executor, then the default run-script-by-name.
    fn create_task(
        &self,
        ctx: &RunContext,
        script: &str,
        workspace: &Arc<Workspace>,
        runner: Option<&Arc<RunnerConfig>>,
    ) -> Result<Task, ConfigError> {
        let runner = runner.cloned().unwrap_or_else(|| self.config.clone());

        let executor_config = workspace
            .executor(script)
            .cloned()
            .or_else(|| runner.executor.clone())
            .unwrap_or_else(|| ExecutorConfig::script(script));
        let executor = Executor::from_config(&executor_config, workspace)?;

        Ok(Task::new(
            script,
            workspace.clone(),
            runner,
            executor,
            ctx.monorepo.directory.clone(),
            ctx.monorepo.config.env.clone(),
            self.reporter.clone(),
        ))
    }

    /// Run one layer's tasks.
    ///
    /// Consecutive tasks whose runners are both parallel form one batch
    /// launched together and awaited to settlement; everything else runs
    /// one at a time.
    pub async fn run_tasks(&self, tasks: Vec<Task>) -> Result<(), RunError> {
        let batches = partition_parallel(tasks, |task| task.runner.parallel());

        for batch in batches {
            if batch.len() == 1 {
                for task in batch {
                    run_task(task).await?;
                }
                continue;
            }

            let handles: Vec<_> = batch
                .into_iter()
                .map(|task| tokio::spawn(run_task(task)))
                .collect();

            let mut first_error = None;
            for handle in handles {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        if first_error.is_none() {
                            first_error = Some(err);
                        } else {
                            warn!("{}", err);
                        }
                    }
                    Err(join) => {
                        if first_error.is_none() {
                            first_error = Some(RunError::Join(join));
                        }
                    }
                }
            }
            if let Some(err) = first_error {
                return Err(err);
            }
        }

        Ok(())
    }
}

/// Apply the error policy of the task's owning runner: restart while the
/// cap allows, then propagate or swallow.
async fn run_task(task: Task) -> Result<(), RunError> {
    let mut attempt: u32 = 0;

    loop {
        let Err(err) = task.start().await else {
            return Ok(());
        };

        tracing::error!(task = %task.id(), "{}", err);

        if task.runner.restart_on_error()
            && task.runner.max_restarts.map_or(true, |cap| attempt < cap)
        {
            attempt += 1;
            task.reporter().report(&TaskEvent::Restarted {
                id: task.id(),
                attempt,
            });
            continue;
        }

        if task.runner.throw_on_error() {
            return Err(RunError::Task(TaskError::Failed {
                script: task.script.clone(),
                workspace: task.workspace.name.clone(),
                reason: err.to_string(),
            }));
        }

        // Swallowed: siblings and later layers continue.
        return Ok(());
    }
}

/// Partition into maximal runs where adjacent items both opt into
/// parallel execution; every other item gets a batch of its own.
fn partition_parallel<T>(items: Vec<T>, is_parallel: impl Fn(&T) -> bool) -> Vec<Vec<T>> {
    let mut batches: Vec<Vec<T>> = Vec::new();

    for item in items {
        let joins_last = batches
            .last()
            .and_then(|batch| batch.last())
            .map(|last| is_parallel(last) && is_parallel(&item))
            .unwrap_or(false);

        if joins_last {
            if let Some(batch) = batches.last_mut() {
                batch.push(item);
            }
        } else {
            batches.push(vec![item]);
        }
    }

    batches
}

/// Workspaces passing the runner's filter.
///
/// The runner's include/exclude take priority over the monorepo's;
/// include acts as an allow-list when non-empty, exclusions only apply
/// when no include list is set. With `script` given, workspaces must also
/// declare the script or a custom executor for it.
pub fn filtered_workspaces(
    ctx: &RunContext,
    config: &RunnerConfig,
    script: Option<&str>,
) -> Result<Vec<Arc<Workspace>>, ConfigError> {
    let monorepo = &ctx.monorepo.config;
    let mut filtered = Vec::new();

    for workspace in &ctx.workspaces {
        let selected = if !config.include.is_empty() {
            any_filter_matches(workspace, &config.include)?
        } else if !config.exclude.is_empty() && any_filter_matches(workspace, &config.exclude)? {
            false
        } else if !monorepo.include.is_empty() {
            any_filter_matches(workspace, &monorepo.include)?
        } else if !monorepo.exclude.is_empty() && any_filter_matches(workspace, &monorepo.exclude)?
        {
            false
        } else {
            true
        };

        if !selected {
            continue;
        }

        if let Some(script) = script {
            if !workspace.has_script_or_executor(script) {
                continue;
            }
        }

        filtered.push(workspace.clone());
    }

    Ok(filtered)
}

fn any_filter_matches(
    workspace: &Workspace,
    filters: &[convoy_core::config::WorkspaceFilter],
) -> Result<bool, ConfigError> {
    for filter in filters {
        if workspace.matches_filter(filter)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Compute the layered execution plan for a script without running it.
pub fn plan_script(ctx: &RunContext, script: &str) -> Result<Vec<Vec<String>>, RunError> {
    let config = resolve_script_runner(ctx, script)?;
    plan_with(ctx, script, &Arc::new(config), &mut HashSet::new())
}

fn plan_with(
    ctx: &RunContext,
    script: &str,
    config: &Arc<RunnerConfig>,
    visited_roots: &mut HashSet<String>,
) -> Result<Vec<Vec<String>>, RunError> {
    match config.kind() {
        RunnerKind::Many => {
            let workspaces = filtered_workspaces(ctx, config, Some(script))?;
            if workspaces.is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![workspaces
                .iter()
                .map(|workspace| unit_id(&workspace.name, script))
                .collect()])
        }
        RunnerKind::Pipeline => {
            let pipelines = script_pipelines(ctx, script, config)?;
            let seeds = filtered_workspaces(ctx, config, Some(script))?;
            let units = workspace_pipelines(ctx, &pipelines, script, &seeds)?;

            let mut graph: Graph<ExecutionUnit> = Graph::new();
            for unit in units {
                graph.add_vertex(Vertex {
                    id: unit.id.clone(),
                    edges: unit.depends_on.clone(),
                    data: unit,
                });
            }

            if let Some(cycle) = graph.find_cycle() {
                return Err(GraphError::Cycle(format_cycle(&cycle)).into());
            }

            Ok(graph
                .layers()
                .iter()
                .map(|layer| layer.iter().map(|vertex| vertex.id.clone()).collect())
                .collect())
        }
        RunnerKind::Multiple => {
            let mut plan = Vec::new();
            for child in &config.runners {
                let resolved = match child {
                    ConfigRef::Named(name) => ctx
                        .monorepo
                        .runner(name)
                        .ok_or_else(|| ConfigError::RunnerNotFound(name.clone()))?
                        .resolve(&ctx.monorepo.config.runner)?,
                    ConfigRef::Inline(config) => config.resolve(&ctx.monorepo.config.runner)?,
                };
                plan.extend(plan_with(ctx, script, &Arc::new(resolved), visited_roots)?);
            }
            Ok(plan)
        }
        RunnerKind::Root => {
            let target = config
                .script
                .as_deref()
                .ok_or_else(|| ConfigError::MissingField("runner.script".to_string()))?;
            if !visited_roots.insert(target.to_string()) {
                return Ok(Vec::new());
            }
            let resolved = resolve_script_runner(ctx, target)?;
            plan_with(ctx, target, &Arc::new(resolved), visited_roots)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::CollectingReporter;
    use convoy_core::config::{CacheConfig, MonorepoConfig, WorkspaceManifest, WorkspaceScript};
    use convoy_core::monorepo::Monorepo;
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::TempDir;

    fn make_workspace(root: &Path, name: &str, scripts: &[(&str, &str)], deps: &[&str]) -> Arc<Workspace> {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let manifest = WorkspaceManifest {
            name: Some(name.to_string()),
            scripts: scripts
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        };
        Arc::new(Workspace::from_manifest(dir, manifest).unwrap())
    }

    fn make_context(
        root: &Path,
        runners: &[(&str, RunnerConfig)],
        workspaces: Vec<Arc<Workspace>>,
    ) -> RunContext {
        let config = MonorepoConfig {
            runner: runners
                .iter()
                .map(|(name, config)| (name.to_string(), config.clone()))
                .collect::<BTreeMap<_, _>>(),
            ..Default::default()
        };
        RunContext::new(
            Monorepo {
                directory: root.to_path_buf(),
                config,
            },
            workspaces,
        )
    }

    #[test]
    fn test_partition_parallel_batching() {
        // parallel, parallel, sequential, parallel -> [[1,2],[3],[4]]
        let items = vec![(1, true), (2, true), (3, false), (4, true)];
        let batches = partition_parallel(items, |(_, parallel)| *parallel);

        let ids: Vec<Vec<i32>> = batches
            .iter()
            .map(|batch| batch.iter().map(|(id, _)| *id).collect())
            .collect();
        assert_eq!(ids, vec![vec![1, 2], vec![3], vec![4]]);
    }

    #[test]
    fn test_partition_all_sequential() {
        let items = vec![(1, false), (2, false)];
        let batches = partition_parallel(items, |(_, parallel)| *parallel);
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn test_filtered_workspaces_include_priority() {
        let temp = TempDir::new().unwrap();
        let lib = make_workspace(temp.path(), "lib", &[("build", "true")], &[]);
        let app = make_workspace(temp.path(), "app", &[("build", "true")], &[]);
        let ctx = make_context(temp.path(), &[], vec![lib, app]);

        let config = RunnerConfig {
            include: vec![convoy_core::config::WorkspaceFilter {
                pattern: "^lib$".to_string(),
                by: convoy_core::config::MatchBy::Name,
            }],
            ..Default::default()
        };

        let filtered = filtered_workspaces(&ctx, &config, Some("build")).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "lib");
    }

    #[test]
    fn test_filtered_workspaces_exclude_and_script() {
        let temp = TempDir::new().unwrap();
        let lib = make_workspace(temp.path(), "lib", &[("build", "true")], &[]);
        let app = make_workspace(temp.path(), "app", &[("build", "true")], &[]);
        let docs = make_workspace(temp.path(), "docs", &[], &[]);
        let ctx = make_context(temp.path(), &[], vec![lib, app, docs]);

        let config = RunnerConfig {
            exclude: vec![convoy_core::config::WorkspaceFilter {
                pattern: "^app$".to_string(),
                by: convoy_core::config::MatchBy::Name,
            }],
            ..Default::default()
        };

        // app excluded by filter, docs filtered out for lacking the script.
        let filtered = filtered_workspaces(&ctx, &config, Some("build")).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "lib");
    }

    #[tokio::test]
    async fn test_run_script_fallback_runs_everywhere() {
        let temp = TempDir::new().unwrap();
        let a = make_workspace(temp.path(), "a", &[("touchit", "touch ran.txt")], &[]);
        let b = make_workspace(temp.path(), "b", &[("touchit", "touch ran.txt")], &[]);
        let ctx = make_context(temp.path(), &[], vec![a, b]);

        let reporter = Arc::new(CollectingReporter::default());
        run_script(&ctx, "touchit", reporter).await.unwrap();

        assert!(temp.path().join("a/ran.txt").exists());
        assert!(temp.path().join("b/ran.txt").exists());
    }

    #[tokio::test]
    async fn test_pipeline_runs_dependencies_in_earlier_layer() {
        let temp = TempDir::new().unwrap();
        let lib = make_workspace(
            temp.path(),
            "lib",
            &[("build", "echo lib >> ../order.txt")],
            &[],
        );
        let app = make_workspace(
            temp.path(),
            "app",
            &[("build", "echo app >> ../order.txt")],
            &["lib"],
        );

        let build = RunnerConfig {
            kind: Some(RunnerKind::Pipeline),
            dependency_scripts: vec!["build".to_string()],
            ..Default::default()
        };
        let ctx = make_context(temp.path(), &[("build", build)], vec![lib, app]);

        let reporter = Arc::new(CollectingReporter::default());
        run_script(&ctx, "build", reporter.clone()).await.unwrap();

        let order = std::fs::read_to_string(temp.path().join("order.txt")).unwrap();
        let lines: Vec<&str> = order.lines().collect();
        assert_eq!(lines, vec!["lib", "app"]);

        let layers: Vec<usize> = reporter
            .events()
            .iter()
            .filter_map(|event| match event {
                TaskEvent::LayerStarted { layer, .. } => Some(*layer),
                _ => None,
            })
            .collect();
        assert_eq!(layers, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_pipeline_cycle_aborts_without_executing() {
        let temp = TempDir::new().unwrap();
        let lib = make_workspace(
            temp.path(),
            "lib",
            &[("a", "touch ran-a.txt"), ("b", "touch ran-b.txt")],
            &[],
        );

        let b_runner = RunnerConfig {
            self_scripts: vec!["a".to_string()],
            ..Default::default()
        };
        let a_runner = RunnerConfig {
            kind: Some(RunnerKind::Pipeline),
            self_scripts: vec!["b".to_string()],
            ..Default::default()
        };
        let ctx = make_context(
            temp.path(),
            &[("a", a_runner), ("b", b_runner)],
            vec![lib],
        );

        let reporter = Arc::new(CollectingReporter::default());
        let err = run_script(&ctx, "a", reporter).await.unwrap_err();

        assert!(matches!(err, RunError::Graph(GraphError::Cycle(_))));
        assert!(!temp.path().join("lib/ran-a.txt").exists());
        assert!(!temp.path().join("lib/ran-b.txt").exists());
    }

    #[tokio::test]
    async fn test_task_failure_swallowed_by_default() {
        let temp = TempDir::new().unwrap();
        let bad = make_workspace(temp.path(), "bad", &[("go", "exit 1")], &[]);
        let good = make_workspace(temp.path(), "good", &[("go", "touch ran.txt")], &[]);
        let ctx = make_context(temp.path(), &[], vec![bad, good]);

        let reporter = Arc::new(CollectingReporter::default());
        // Default fallback runner has no throw_on_error: the run succeeds.
        run_script(&ctx, "go", reporter).await.unwrap();
        assert!(temp.path().join("good/ran.txt").exists());
    }

    #[tokio::test]
    async fn test_throw_on_error_propagates() {
        let temp = TempDir::new().unwrap();
        let bad = make_workspace(temp.path(), "bad", &[("go", "exit 1")], &[]);

        let runner = RunnerConfig {
            throw_on_error: Some(true),
            ..Default::default()
        };
        let ctx = make_context(temp.path(), &[("go", runner)], vec![bad]);

        let reporter = Arc::new(CollectingReporter::default());
        let err = run_script(&ctx, "go", reporter).await.unwrap_err();
        assert!(matches!(err, RunError::Task(TaskError::Failed { .. })));
    }

    #[tokio::test]
    async fn test_restart_on_error_retries_up_to_cap() {
        let temp = TempDir::new().unwrap();
        let flaky = make_workspace(temp.path(), "flaky", &[("go", "exit 1")], &[]);

        let runner = RunnerConfig {
            restart_on_error: Some(true),
            max_restarts: Some(2),
            throw_on_error: Some(true),
            ..Default::default()
        };
        let ctx = make_context(temp.path(), &[("go", runner)], vec![flaky]);

        let reporter = Arc::new(CollectingReporter::default());
        let err = run_script(&ctx, "go", reporter.clone()).await.unwrap_err();

        // Restarted twice, then the exhausted cap falls through to
        // throw_on_error.
        let restarts: Vec<u32> = reporter
            .events()
            .iter()
            .filter_map(|event| match event {
                TaskEvent::Restarted { attempt, .. } => Some(*attempt),
                _ => None,
            })
            .collect();
        assert_eq!(restarts, vec![1, 2]);

        let starts = reporter
            .events()
            .iter()
            .filter(|event| matches!(event, TaskEvent::Started { .. }))
            .count();
        assert_eq!(starts, 3);

        assert!(matches!(err, RunError::Task(_)));
    }

    #[tokio::test]
    async fn test_restart_recovers_when_task_succeeds() {
        let temp = TempDir::new().unwrap();
        // Fails until the marker exists, creating it on the first attempt.
        let flaky = make_workspace(
            temp.path(),
            "flaky",
            &[(
                "go",
                "if [ -f marker ]; then exit 0; else touch marker; exit 1; fi",
            )],
            &[],
        );

        let runner = RunnerConfig {
            restart_on_error: Some(true),
            throw_on_error: Some(true),
            ..Default::default()
        };
        let ctx = make_context(temp.path(), &[("go", runner)], vec![flaky]);

        let reporter = Arc::new(CollectingReporter::default());
        run_script(&ctx, "go", reporter.clone()).await.unwrap();

        let restarts = reporter
            .events()
            .iter()
            .filter(|event| matches!(event, TaskEvent::Restarted { .. }))
            .count();
        assert_eq!(restarts, 1);
    }

    #[tokio::test]
    async fn test_multiple_runner_sequential() {
        let temp = TempDir::new().unwrap();
        let pkg = make_workspace(
            temp.path(),
            "pkg",
            &[("go", "echo run >> ../multi.txt")],
            &[],
        );

        let child = RunnerConfig::default();
        let runner = RunnerConfig {
            kind: Some(RunnerKind::Multiple),
            runners: vec![
                ConfigRef::Inline(Box::new(child.clone())),
                ConfigRef::Inline(Box::new(child)),
            ],
            ..Default::default()
        };
        let ctx = make_context(temp.path(), &[("go", runner)], vec![pkg]);

        let reporter = Arc::new(CollectingReporter::default());
        run_script(&ctx, "go", reporter).await.unwrap();

        let log = std::fs::read_to_string(temp.path().join("multi.txt")).unwrap();
        assert_eq!(log.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_root_runner_reenters_other_script() {
        let temp = TempDir::new().unwrap();
        let pkg = make_workspace(temp.path(), "pkg", &[("real", "touch ran.txt")], &[]);

        let alias = RunnerConfig {
            kind: Some(RunnerKind::Root),
            script: Some("real".to_string()),
            ..Default::default()
        };
        let ctx = make_context(temp.path(), &[("alias", alias)], vec![pkg]);

        let reporter = Arc::new(CollectingReporter::default());
        run_script(&ctx, "alias", reporter).await.unwrap();
        assert!(temp.path().join("pkg/ran.txt").exists());
    }

    #[tokio::test]
    async fn test_pipeline_with_cache_skips_unchanged_layer() {
        let temp = TempDir::new().unwrap();
        let lib = make_workspace(
            temp.path(),
            "lib",
            &[("build", "echo run >> log.txt")],
            &[],
        );
        std::fs::write(temp.path().join("lib/input.txt"), "v1").unwrap();

        let runner = RunnerConfig {
            kind: Some(RunnerKind::Pipeline),
            cache: Some(CacheConfig::Files {
                patterns: vec!["input.txt".to_string()],
            }),
            ..Default::default()
        };
        let ctx = make_context(temp.path(), &[("build", runner)], vec![lib]);

        let reporter = Arc::new(CollectingReporter::default());
        run_script(&ctx, "build", reporter.clone()).await.unwrap();
        run_script(&ctx, "build", reporter).await.unwrap();

        let log = std::fs::read_to_string(temp.path().join("lib/log.txt")).unwrap();
        assert_eq!(log.lines().count(), 1);
    }

    #[test]
    fn test_plan_script_pipeline_layers() {
        let temp = TempDir::new().unwrap();
        let lib = make_workspace(temp.path(), "lib", &[("build", "true")], &[]);
        let app = make_workspace(temp.path(), "app", &[("build", "true")], &["lib"]);

        let build = RunnerConfig {
            kind: Some(RunnerKind::Pipeline),
            dependency_scripts: vec!["build".to_string()],
            ..Default::default()
        };
        let ctx = make_context(temp.path(), &[("build", build)], vec![lib, app]);

        let plan = plan_script(&ctx, "build").unwrap();
        assert_eq!(plan, vec![vec!["lib:build"], vec!["app:build"]]);
    }

    #[test]
    fn test_plan_script_many_single_layer() {
        let temp = TempDir::new().unwrap();
        let a = make_workspace(temp.path(), "a", &[("lint", "true")], &[]);
        let b = make_workspace(temp.path(), "b", &[("lint", "true")], &[]);
        let ctx = make_context(temp.path(), &[], vec![a, b]);

        let plan = plan_script(&ctx, "lint").unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].len(), 2);
    }

    #[tokio::test]
    async fn test_workspace_scripts_edge_runs_other_workspace() {
        let temp = TempDir::new().unwrap();
        let app = make_workspace(
            temp.path(),
            "app",
            &[("dev", "echo app >> ../order.txt")],
            &[],
        );
        let api = make_workspace(
            temp.path(),
            "api",
            &[("dev", "echo api >> ../order.txt")],
            &[],
        );

        let dev = RunnerConfig {
            kind: Some(RunnerKind::Pipeline),
            include: vec![convoy_core::config::WorkspaceFilter {
                pattern: "^app$".to_string(),
                by: convoy_core::config::MatchBy::Name,
            }],
            workspace_scripts: vec![WorkspaceScript {
                pattern: "^api$".to_string(),
                by: convoy_core::config::MatchBy::Name,
                script: None,
            }],
            ..Default::default()
        };
        let ctx = make_context(temp.path(), &[("dev", dev)], vec![app, api]);

        let reporter = Arc::new(CollectingReporter::default());
        run_script(&ctx, "dev", reporter).await.unwrap();

        let order = std::fs::read_to_string(temp.path().join("order.txt")).unwrap();
        assert_eq!(order.lines().collect::<Vec<_>>(), vec!["api", "app"]);
    }
}

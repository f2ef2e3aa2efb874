//! Pipeline expansion
//!
//! Two phases turn per-script pipeline declarations into a concrete unit
//! graph. Phase A walks script names reachable from the root and records
//! one pipeline per script; phase B fans those declarations out across
//! every participating workspace into `workspace:script` units with
//! dependency edges.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use convoy_core::config::{MatchBy, RunnerConfig, WorkspaceScript};
use convoy_core::error::ConfigError;
use convoy_core::monorepo::{RunContext, Workspace};

/// One script's expanded pipeline declaration
#[derive(Debug)]
pub struct ScriptPipeline {
    /// The script this pipeline belongs to
    pub script: String,
    /// Scripts that must run in the same workspace first
    pub self_scripts: Vec<String>,
    /// Scripts that must run in every dependency workspace first
    pub dependency_scripts: Vec<String>,
    /// Scripts that must run in pattern-matched workspaces first; every
    /// entry carries a concrete target script
    pub workspace_scripts: Vec<WorkspaceScript>,
    /// The runner config this declaration came from
    pub runner: Arc<RunnerConfig>,
}

/// A concrete (workspace, script) vertex with its dependency edges
#[derive(Debug, Clone)]
pub struct ExecutionUnit {
    /// Unit identity, `workspace:script`
    pub id: String,
    /// Workspace the unit runs in
    pub workspace: Arc<Workspace>,
    /// The pipeline declaration this unit was expanded from
    pub pipeline: Arc<ScriptPipeline>,
    /// Identities of units that must complete first
    pub depends_on: Vec<String>,
}

/// Unit identity for a (workspace, script) pair
pub fn unit_id(workspace: &str, script: &str) -> String {
    format!("{}:{}", workspace, script)
}

/// Phase A — discover every script pipeline reachable from the root.
///
/// A script other than the root with a monorepo runner registered under
/// its exact name uses that runner's declaration; every other script
/// reuses the root runner's. Workspace-script entries missing a target
/// default to the script currently being discovered. The visited set over
/// script names makes discovery terminate even for cyclic declarations.
pub fn script_pipelines(
    ctx: &RunContext,
    root_script: &str,
    root_runner: &Arc<RunnerConfig>,
) -> Result<Vec<Arc<ScriptPipeline>>, ConfigError> {
    let mut pipelines = Vec::new();
    let mut visited = HashSet::new();
    discover_script(
        ctx,
        root_script,
        root_script,
        root_runner,
        &mut visited,
        &mut pipelines,
    )?;
    debug!(
        root = root_script,
        count = pipelines.len(),
        "script pipelines discovered"
    );
    Ok(pipelines)
}

fn discover_script(
    ctx: &RunContext,
    script: &str,
    root_script: &str,
    root_runner: &Arc<RunnerConfig>,
    visited: &mut HashSet<String>,
    pipelines: &mut Vec<Arc<ScriptPipeline>>,
) -> Result<(), ConfigError> {
    if !visited.insert(script.to_string()) {
        return Ok(());
    }

    let runner: Arc<RunnerConfig> = if script != root_script {
        match ctx.monorepo.runner(script) {
            Some(config) => Arc::new(config.resolve(&ctx.monorepo.config.runner)?),
            None => root_runner.clone(),
        }
    } else {
        root_runner.clone()
    };

    let self_scripts = runner.self_scripts.clone();
    let dependency_scripts = runner.dependency_scripts.clone();
    let workspace_scripts: Vec<WorkspaceScript> = runner
        .workspace_scripts
        .iter()
        .map(|entry| WorkspaceScript {
            pattern: entry.pattern.clone(),
            by: entry.by,
            script: Some(entry.script.clone().unwrap_or_else(|| script.to_string())),
        })
        .collect();

    let referenced: Vec<String> = self_scripts
        .iter()
        .chain(dependency_scripts.iter())
        .cloned()
        .chain(
            workspace_scripts
                .iter()
                .filter_map(|entry| entry.script.clone()),
        )
        .collect();

    for name in &referenced {
        discover_script(ctx, name, root_script, root_runner, visited, pipelines)?;
    }

    pipelines.push(Arc::new(ScriptPipeline {
        script: script.to_string(),
        self_scripts,
        dependency_scripts,
        workspace_scripts,
        runner,
    }));

    Ok(())
}

/// Phase B — expand script pipelines into concrete execution units.
///
/// Seeded with the workspaces passing the runner's filter; recursion
/// follows self, dependency, and workspace-script edges. The visited set
/// over unit ids deduplicates and guarantees termination under cyclic
/// script references — the later graph cycle check on unit edges is a
/// separate concern.
pub fn workspace_pipelines(
    ctx: &RunContext,
    pipelines: &[Arc<ScriptPipeline>],
    root_script: &str,
    seeds: &[Arc<Workspace>],
) -> Result<Vec<ExecutionUnit>, ConfigError> {
    let mut units = Vec::new();
    let mut visited = HashSet::new();

    for workspace in seeds {
        expand_unit(ctx, pipelines, workspace, root_script, &mut visited, &mut units)?;
    }

    debug!(
        root = root_script,
        count = units.len(),
        "execution units expanded"
    );
    Ok(units)
}

fn expand_unit(
    ctx: &RunContext,
    pipelines: &[Arc<ScriptPipeline>],
    workspace: &Arc<Workspace>,
    script: &str,
    visited: &mut HashSet<String>,
    units: &mut Vec<ExecutionUnit>,
) -> Result<(), ConfigError> {
    let id = unit_id(&workspace.name, script);
    if !visited.insert(id.clone()) {
        return Ok(());
    }

    let Some(pipeline) = pipelines.iter().find(|p| p.script == script) else {
        return Ok(());
    };

    let mut depends_on = Vec::new();

    for self_script in &pipeline.self_scripts {
        depends_on.push(unit_id(&workspace.name, self_script));
        expand_unit(ctx, pipelines, workspace, self_script, visited, units)?;
    }

    for dependency_script in &pipeline.dependency_scripts {
        for dependency in &workspace.dependencies {
            // Dependencies outside the loaded workspace set are ignored.
            let Some(dep_workspace) = ctx.workspace(dependency) else {
                continue;
            };
            depends_on.push(unit_id(&dep_workspace.name, dependency_script));
            let dep_workspace = dep_workspace.clone();
            expand_unit(
                ctx,
                pipelines,
                &dep_workspace,
                dependency_script,
                visited,
                units,
            )?;
        }
    }

    for entry in &pipeline.workspace_scripts {
        let target = entry.script.as_deref().unwrap_or(script);
        let candidates: Vec<Arc<Workspace>> = ctx
            .workspaces
            .iter()
            .filter_map(|candidate| {
                match matches_workspace_script(candidate, workspace, entry, target, script) {
                    Ok(true) => Some(Ok(candidate.clone())),
                    Ok(false) => None,
                    Err(err) => Some(Err(err)),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        for candidate in candidates {
            depends_on.push(unit_id(&candidate.name, target));
            expand_unit(ctx, pipelines, &candidate, target, visited, units)?;
        }
    }

    units.push(ExecutionUnit {
        id,
        workspace: workspace.clone(),
        pipeline: pipeline.clone(),
        depends_on,
    });

    Ok(())
}

/// Whether `candidate` participates in a workspace-script entry expanded
/// from `current`.
///
/// Self-identity disambiguation: a name-matched candidate sharing the
/// current workspace's directory, and a directory-matched candidate with
/// the same name or a sibling under the same immediate parent, only count
/// when the target script differs from the one being expanded. A
/// directory-matched candidate nested strictly deeper under the current
/// workspace's parent path is included unconditionally.
fn matches_workspace_script(
    candidate: &Workspace,
    current: &Workspace,
    entry: &WorkspaceScript,
    target: &str,
    script: &str,
) -> Result<bool, ConfigError> {
    match entry.by {
        MatchBy::Name => {
            if !candidate.name_matches(&entry.pattern)? {
                return Ok(false);
            }
            if candidate.directory == current.directory {
                return Ok(target != script);
            }
            Ok(true)
        }
        MatchBy::Directory => {
            if !candidate.directory_matches(&entry.pattern)? {
                return Ok(false);
            }
            if candidate.name == current.name {
                return Ok(target != script);
            }

            let candidate_parent = candidate.directory.parent();
            let current_parent = current.directory.parent();
            if candidate_parent == current_parent {
                return Ok(target != script);
            }
            if let (Some(candidate_parent), Some(current_parent)) =
                (candidate_parent, current_parent)
            {
                if candidate_parent.starts_with(current_parent) {
                    let candidate_depth = candidate.directory.components().count();
                    let current_depth = current.directory.components().count();
                    return Ok(candidate_depth > current_depth);
                }
            }
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::config::{MonorepoConfig, WorkspaceManifest};
    use convoy_core::monorepo::Monorepo;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn workspace(name: &str, dir: &str, scripts: &[&str], dependencies: &[&str]) -> Arc<Workspace> {
        let manifest = WorkspaceManifest {
            name: Some(name.to_string()),
            scripts: scripts
                .iter()
                .map(|s| (s.to_string(), "true".to_string()))
                .collect(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        };
        Arc::new(Workspace::from_manifest(PathBuf::from(dir), manifest).unwrap())
    }

    fn context(
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
                directory: PathBuf::from("/repo"),
                config,
            },
            workspaces,
        )
    }

    fn unit<'a>(units: &'a [ExecutionUnit], id: &str) -> &'a ExecutionUnit {
        units.iter().find(|u| u.id == id).unwrap()
    }

    #[test]
    fn test_dependency_scripts_expansion() {
        let lib = workspace("lib", "/repo/packages/lib", &["build"], &[]);
        let app = workspace("app", "/repo/packages/app", &["build"], &["lib"]);
        let ctx = context(&[], vec![lib.clone(), app.clone()]);

        let runner = Arc::new(RunnerConfig {
            dependency_scripts: vec!["build".to_string()],
            ..Default::default()
        });

        let pipelines = script_pipelines(&ctx, "build", &runner).unwrap();
        assert_eq!(pipelines.len(), 1);

        let units = workspace_pipelines(&ctx, &pipelines, "build", &[app, lib]).unwrap();
        assert_eq!(units.len(), 2);

        let app_build = unit(&units, "app:build");
        assert_eq!(app_build.depends_on, vec!["lib:build"]);

        let lib_build = unit(&units, "lib:build");
        assert!(lib_build.depends_on.is_empty());
    }

    #[test]
    fn test_self_scripts_expansion() {
        let lib = workspace("lib", "/repo/packages/lib", &["build", "codegen"], &[]);
        let ctx = context(&[], vec![lib.clone()]);

        let runner = Arc::new(RunnerConfig {
            self_scripts: vec!["codegen".to_string()],
            ..Default::default()
        });

        let pipelines = script_pipelines(&ctx, "build", &runner).unwrap();
        // "build" plus the referenced "codegen".
        assert_eq!(pipelines.len(), 2);

        let units = workspace_pipelines(&ctx, &pipelines, "build", &[lib]).unwrap();
        let build = unit(&units, "lib:build");
        assert_eq!(build.depends_on, vec!["lib:codegen"]);
        assert!(unit(&units, "lib:codegen").depends_on.is_empty());
    }

    #[test]
    fn test_monorepo_runner_overrides_sub_script() {
        // "test" pipes through "build", whose own registered runner adds a
        // dependency edge across packages.
        let lib = workspace("lib", "/repo/packages/lib", &["build", "test"], &[]);
        let app = workspace("app", "/repo/packages/app", &["build", "test"], &["lib"]);

        let build_runner = RunnerConfig {
            dependency_scripts: vec!["build".to_string()],
            ..Default::default()
        };
        let ctx = context(&[("build", build_runner)], vec![lib.clone(), app.clone()]);

        let test_runner = Arc::new(RunnerConfig {
            self_scripts: vec!["build".to_string()],
            ..Default::default()
        });

        let pipelines = script_pipelines(&ctx, "test", &test_runner).unwrap();
        assert_eq!(pipelines.len(), 2);

        let units = workspace_pipelines(&ctx, &pipelines, "test", &[app]).unwrap();
        assert_eq!(unit(&units, "app:test").depends_on, vec!["app:build"]);
        assert_eq!(unit(&units, "app:build").depends_on, vec!["lib:build"]);
        assert!(unit(&units, "lib:build").depends_on.is_empty());
    }

    #[test]
    fn test_missing_dependency_ignored() {
        let app = workspace("app", "/repo/packages/app", &["build"], &["not-loaded"]);
        let ctx = context(&[], vec![app.clone()]);

        let runner = Arc::new(RunnerConfig {
            dependency_scripts: vec!["build".to_string()],
            ..Default::default()
        });

        let pipelines = script_pipelines(&ctx, "build", &runner).unwrap();
        let units = workspace_pipelines(&ctx, &pipelines, "build", &[app]).unwrap();

        assert!(unit(&units, "app:build").depends_on.is_empty());
    }

    #[test]
    fn test_cyclic_script_references_terminate() {
        let lib = workspace("lib", "/repo/packages/lib", &["a", "b"], &[]);

        let b_runner = RunnerConfig {
            self_scripts: vec!["a".to_string()],
            ..Default::default()
        };
        let ctx = context(&[("b", b_runner)], vec![lib.clone()]);

        let a_runner = Arc::new(RunnerConfig {
            self_scripts: vec!["b".to_string()],
            ..Default::default()
        });

        // a -> b -> a: discovery terminates via the visited sets.
        let pipelines = script_pipelines(&ctx, "a", &a_runner).unwrap();
        assert_eq!(pipelines.len(), 2);

        let units = workspace_pipelines(&ctx, &pipelines, "a", &[lib]).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(unit(&units, "lib:a").depends_on, vec!["lib:b"]);
        assert_eq!(unit(&units, "lib:b").depends_on, vec!["lib:a"]);
    }

    #[test]
    fn test_workspace_scripts_default_target_excludes_self() {
        let app = workspace("app", "/repo/apps/app", &["dev"], &[]);
        let api = workspace("api", "/repo/apps/api", &["dev"], &[]);
        let ctx = context(&[], vec![app.clone(), api.clone()]);

        // No explicit target: defaults to the current script, so the
        // matching entry points every other workspace at "dev".
        let runner = Arc::new(RunnerConfig {
            workspace_scripts: vec![WorkspaceScript {
                pattern: "^api$".to_string(),
                by: MatchBy::Name,
                script: None,
            }],
            ..Default::default()
        });

        let pipelines = script_pipelines(&ctx, "dev", &runner).unwrap();
        let units = workspace_pipelines(&ctx, &pipelines, "dev", &[app]).unwrap();

        assert_eq!(unit(&units, "app:dev").depends_on, vec!["api:dev"]);
        // api:dev itself matched its own pattern but same-workspace,
        // same-script edges are filtered out.
        assert!(unit(&units, "api:dev").depends_on.is_empty());
    }

    #[test]
    fn test_workspace_scripts_same_workspace_different_script() {
        let app = workspace("app", "/repo/apps/app", &["dev", "prepare"], &[]);
        let ctx = context(&[], vec![app.clone()]);

        let runner = Arc::new(RunnerConfig {
            workspace_scripts: vec![WorkspaceScript {
                pattern: "^app$".to_string(),
                by: MatchBy::Name,
                script: Some("prepare".to_string()),
            }],
            ..Default::default()
        });

        let pipelines = script_pipelines(&ctx, "dev", &runner).unwrap();
        let units = workspace_pipelines(&ctx, &pipelines, "dev", &[app]).unwrap();

        // Different target script: the self edge is allowed.
        assert_eq!(unit(&units, "app:dev").depends_on, vec!["app:prepare"]);
    }

    #[test]
    fn test_workspace_scripts_directory_sibling_filtered() {
        let app = workspace("app", "/repo/apps/app", &["dev"], &[]);
        let sibling = workspace("sibling", "/repo/apps/sibling", &["dev"], &[]);
        let nested = workspace("nested", "/repo/apps/app/plugins/nested", &["dev"], &[]);
        let ctx = context(&[], vec![app.clone(), sibling.clone(), nested.clone()]);

        let runner = Arc::new(RunnerConfig {
            workspace_scripts: vec![WorkspaceScript {
                pattern: "/repo/apps".to_string(),
                by: MatchBy::Directory,
                script: None,
            }],
            ..Default::default()
        });

        let pipelines = script_pipelines(&ctx, "dev", &runner).unwrap();
        let units = workspace_pipelines(&ctx, &pipelines, "dev", &[app.clone()]).unwrap();

        let app_dev = unit(&units, "app:dev");
        // Same-parent siblings are filtered for the same script; a
        // workspace nested strictly deeper is included.
        assert!(!app_dev.depends_on.contains(&"sibling:dev".to_string()));
        assert!(app_dev.depends_on.contains(&"nested:dev".to_string()));
    }

    #[test]
    fn test_units_deduplicated_by_identity() {
        // Two seeds depending on the same workspace create lib:build once.
        let lib = workspace("lib", "/repo/packages/lib", &["build"], &[]);
        let a = workspace("a", "/repo/packages/a", &["build"], &["lib"]);
        let b = workspace("b", "/repo/packages/b", &["build"], &["lib"]);
        let ctx = context(&[], vec![lib.clone(), a.clone(), b.clone()]);

        let runner = Arc::new(RunnerConfig {
            dependency_scripts: vec!["build".to_string()],
            ..Default::default()
        });

        let pipelines = script_pipelines(&ctx, "build", &runner).unwrap();
        let units = workspace_pipelines(&ctx, &pipelines, "build", &[a, b, lib]).unwrap();

        assert_eq!(units.len(), 3);
        assert_eq!(
            units.iter().filter(|u| u.id == "lib:build").count(),
            1
        );
    }
}

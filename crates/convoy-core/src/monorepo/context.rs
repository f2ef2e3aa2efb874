//! Run context: the loaded monorepo and its workspaces

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::config::{loader, MonorepoConfig, RunnerConfig};
use crate::error::Result;

use super::discovery::discover_workspaces;
use super::workspace::Workspace;

/// The monorepo root and its configuration
#[derive(Debug, Clone)]
pub struct Monorepo {
    /// Absolute root directory
    pub directory: PathBuf,
    /// Root configuration
    pub config: MonorepoConfig,
}

impl Monorepo {
    /// Load the monorepo configuration from its root directory
    pub fn load(root: &Path) -> Result<Self> {
        let config = loader::load_monorepo_config(root)?;
        Ok(Self {
            directory: root.to_path_buf(),
            config,
        })
    }

    /// Look up the runner registered for a script
    pub fn runner(&self, script: &str) -> Option<&RunnerConfig> {
        self.config.runner.get(script)
    }
}

/// Everything a run needs, loaded once and threaded explicitly through
/// every component call. Immutable for the duration of the run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// The loaded monorepo
    pub monorepo: Monorepo,
    /// All loaded workspaces
    pub workspaces: Vec<Arc<Workspace>>,
}

impl RunContext {
    /// Create a context from already-loaded parts
    pub fn new(monorepo: Monorepo, workspaces: Vec<Arc<Workspace>>) -> Self {
        Self {
            monorepo,
            workspaces,
        }
    }

    /// Load the monorepo config and discover every workspace
    pub fn load(root: &Path) -> Result<Self> {
        let monorepo = Monorepo::load(root)?;
        let workspaces = discover_workspaces(root, &monorepo.config)?;
        info!(count = workspaces.len(), "workspaces loaded");
        Ok(Self {
            monorepo,
            workspaces,
        })
    }

    /// Find a workspace by name
    pub fn workspace(&self, name: &str) -> Option<&Arc<Workspace>> {
        self.workspaces.iter().find(|w| w.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_context() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(loader::CONFIG_FILE),
            r#"
                members = ["packages/*"]

                [runner.build]
                kind = "pipeline"
            "#,
        )
        .unwrap();

        let pkg = temp.path().join("packages").join("lib");
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(
            pkg.join(loader::CONFIG_FILE),
            "name = \"lib\"\n[scripts]\nbuild = \"true\"\n",
        )
        .unwrap();

        let ctx = RunContext::load(temp.path()).unwrap();
        assert_eq!(ctx.workspaces.len(), 1);
        assert!(ctx.workspace("lib").is_some());
        assert!(ctx.workspace("missing").is_none());
        assert!(ctx.monorepo.runner("build").is_some());
        assert!(ctx.monorepo.runner("test").is_none());
    }
}

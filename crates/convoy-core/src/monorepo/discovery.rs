//! Workspace discovery from member patterns

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{loader, MonorepoConfig};
use crate::error::{ConfigError, Result};

use super::workspace::Workspace;

/// Expand the monorepo's member patterns and load every workspace manifest.
///
/// Directories without a manifest are skipped; a duplicate workspace name
/// keeps the first occurrence.
pub fn discover_workspaces(root: &Path, config: &MonorepoConfig) -> Result<Vec<Arc<Workspace>>> {
    let mut workspaces: Vec<Arc<Workspace>> = Vec::new();
    let mut seen_dirs: HashSet<std::path::PathBuf> = HashSet::new();
    let mut seen_names: HashSet<String> = HashSet::new();

    for pattern in &config.members {
        let full_pattern = root.join(pattern).to_string_lossy().into_owned();

        let paths = glob::glob(&full_pattern).map_err(|err| ConfigError::InvalidPattern {
            pattern: pattern.clone(),
            message: err.to_string(),
        })?;

        for path in paths.flatten() {
            if !path.is_dir() || !path.join(loader::CONFIG_FILE).exists() {
                continue;
            }
            if !seen_dirs.insert(path.clone()) {
                continue;
            }

            let manifest = loader::load_workspace_manifest(&path)?;
            let workspace = Workspace::from_manifest(path, manifest)?;

            if !seen_names.insert(workspace.name.clone()) {
                warn!(
                    name = %workspace.name,
                    directory = %workspace.directory.display(),
                    "duplicate workspace name, skipping"
                );
                continue;
            }

            debug!(name = %workspace.name, directory = %workspace.directory.display(), "discovered workspace");
            workspaces.push(Arc::new(workspace));
        }
    }

    Ok(workspaces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_workspace(root: &Path, dir: &str, name: &str) {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(
            path.join(loader::CONFIG_FILE),
            format!("name = \"{}\"\n[scripts]\nbuild = \"true\"\n", name),
        )
        .unwrap();
    }

    #[test]
    fn test_discover_glob_members() {
        let temp = TempDir::new().unwrap();
        write_workspace(temp.path(), "packages/lib", "lib");
        write_workspace(temp.path(), "packages/app", "app");
        // No manifest: should be skipped silently.
        std::fs::create_dir_all(temp.path().join("packages/empty")).unwrap();

        let config = MonorepoConfig {
            members: vec!["packages/*".to_string()],
            ..Default::default()
        };

        let workspaces = discover_workspaces(temp.path(), &config).unwrap();
        let mut names: Vec<_> = workspaces.iter().map(|w| w.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["app", "lib"]);
    }

    #[test]
    fn test_discover_literal_member() {
        let temp = TempDir::new().unwrap();
        write_workspace(temp.path(), "tools/cli", "cli");

        let config = MonorepoConfig {
            members: vec!["tools/cli".to_string()],
            ..Default::default()
        };

        let workspaces = discover_workspaces(temp.path(), &config).unwrap();
        assert_eq!(workspaces.len(), 1);
        assert_eq!(workspaces[0].name, "cli");
    }

    #[test]
    fn test_discover_duplicate_name_keeps_first() {
        let temp = TempDir::new().unwrap();
        write_workspace(temp.path(), "packages/a", "dup");
        write_workspace(temp.path(), "packages/b", "dup");

        let config = MonorepoConfig {
            members: vec!["packages/*".to_string()],
            ..Default::default()
        };

        let workspaces = discover_workspaces(temp.path(), &config).unwrap();
        assert_eq!(workspaces.len(), 1);
    }
}

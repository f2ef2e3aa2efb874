//! Configuration file loading

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::{MonorepoConfig, WorkspaceManifest};

/// Manifest file name, for the monorepo root and every workspace
pub const CONFIG_FILE: &str = "convoy.toml";

/// Locate the monorepo root by walking up from `start`.
///
/// The root is the nearest ancestor whose manifest declares `members`;
/// failing that, the nearest ancestor with a manifest at all.
pub fn find_root(start: &Path) -> Option<PathBuf> {
    let mut fallback = None;

    for dir in start.ancestors() {
        let manifest = dir.join(CONFIG_FILE);
        if !manifest.exists() {
            continue;
        }

        if let Ok(content) = std::fs::read_to_string(&manifest) {
            if let Ok(config) = toml::from_str::<MonorepoConfig>(&content) {
                if !config.members.is_empty() {
                    return Some(dir.to_path_buf());
                }
            }
        }

        fallback.get_or_insert_with(|| dir.to_path_buf());
    }

    fallback
}

/// Load the root monorepo configuration
pub fn load_monorepo_config(root: &Path) -> Result<MonorepoConfig> {
    let path = root.join(CONFIG_FILE);
    if !path.exists() {
        return Err(ConfigError::NotFound(path).into());
    }

    debug!(path = %path.display(), "loading monorepo config");
    let content = std::fs::read_to_string(&path).map_err(ConfigError::Io)?;
    let config = toml::from_str(&content).map_err(ConfigError::Toml)?;
    Ok(config)
}

/// Load a workspace manifest from its directory
pub fn load_workspace_manifest(dir: &Path) -> Result<WorkspaceManifest> {
    let path = dir.join(CONFIG_FILE);
    if !path.exists() {
        return Err(ConfigError::NotFound(path).into());
    }

    debug!(path = %path.display(), "loading workspace manifest");
    let content = std::fs::read_to_string(&path).map_err(ConfigError::Io)?;
    let manifest = toml::from_str(&content).map_err(ConfigError::Toml)?;
    Ok(manifest)
}

//! Workspace model and filter matching

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use regex::Regex;

use crate::config::{ExecutorConfig, MatchBy, WorkspaceFilter, WorkspaceManifest};
use crate::error::ConfigError;

/// One package inside the monorepo, loaded once and immutable for the run
#[derive(Debug)]
pub struct Workspace {
    /// Unique workspace name
    pub name: String,
    /// Absolute directory of the workspace
    pub directory: PathBuf,
    /// Script name -> command line
    pub scripts: BTreeMap<String, String>,
    /// Declared dependency names
    pub dependencies: Vec<String>,
    /// Environment variables for tasks in this workspace
    pub env: BTreeMap<String, String>,
    /// Named executor overrides, keyed by script
    pub executors: BTreeMap<String, ExecutorConfig>,
    /// Serializes read-modify-write of the on-disk cache record
    cache_lock: Arc<Mutex<()>>,
}

impl Workspace {
    /// Build a workspace from its loaded manifest
    pub fn from_manifest(
        directory: PathBuf,
        manifest: WorkspaceManifest,
    ) -> Result<Self, ConfigError> {
        let name = manifest.name.ok_or_else(|| {
            ConfigError::MissingField(format!("name in {}", directory.display()))
        })?;

        Ok(Self {
            name,
            directory,
            scripts: manifest.scripts,
            dependencies: manifest.dependencies,
            env: manifest.env,
            executors: manifest.executor,
            cache_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Resolve a path relative to the workspace directory
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.directory.join(path)
    }

    /// Path of the persisted cache record for this workspace
    pub fn cache_file(&self) -> PathBuf {
        self.directory.join(".convoy").join("cache.json")
    }

    /// Mutex guarding the cache record file
    pub fn cache_lock(&self) -> &Arc<Mutex<()>> {
        &self.cache_lock
    }

    /// Whether the workspace declares a script under this name
    pub fn has_script(&self, script: &str) -> bool {
        self.scripts.contains_key(script)
    }

    /// The command line declared for a script
    pub fn script(&self, script: &str) -> Option<&str> {
        self.scripts.get(script).map(String::as_str)
    }

    /// Whether the workspace declares an executor override for this script
    pub fn has_executor(&self, script: &str) -> bool {
        self.executors.contains_key(script)
    }

    /// The executor override declared for a script
    pub fn executor(&self, script: &str) -> Option<&ExecutorConfig> {
        self.executors.get(script)
    }

    /// Whether a task for this script has anything to run here
    pub fn has_script_or_executor(&self, script: &str) -> bool {
        self.has_script(script) || self.has_executor(script)
    }

    /// Match a regex pattern against the workspace name
    pub fn name_matches(&self, pattern: &str) -> Result<bool, ConfigError> {
        let regex = compile(pattern)?;
        Ok(regex.is_match(&self.name))
    }

    /// Match a regex pattern against the workspace directory
    pub fn directory_matches(&self, pattern: &str) -> Result<bool, ConfigError> {
        let regex = compile(pattern)?;
        Ok(regex.is_match(&self.directory.to_string_lossy()))
    }

    /// Match a workspace filter
    pub fn matches_filter(&self, filter: &WorkspaceFilter) -> Result<bool, ConfigError> {
        match filter.by {
            MatchBy::Name => self.name_matches(&filter.pattern),
            MatchBy::Directory => self.directory_matches(&filter.pattern),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|err| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })
}

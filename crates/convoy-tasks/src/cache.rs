//! Content-hash cache gating task execution
//!
//! Each workspace persists one record file mapping cache kind -> script ->
//! hash. A cache "changes" when the freshly computed hash differs from the
//! stored one (or no record exists); the record is only written after the
//! task's action completed without error.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use convoy_core::config::{deep_merge, CacheConfig};
use convoy_core::error::ConfigError;
use convoy_core::monorepo::Workspace;

/// Stable identity of a cache implementation; keys the persisted record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// File-set content hash
    Files,
    /// Composition of several caches
    Multiple,
}

impl CacheKind {
    /// The record key for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Multiple => "multiple",
        }
    }
}

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// IO error
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a cache instance is bound to
#[derive(Debug, Clone)]
pub struct CacheContext {
    /// Monorepo root, for the `{monorepo_dir}` placeholder
    pub monorepo_dir: PathBuf,
    /// Workspace owning the record file
    pub workspace: Arc<Workspace>,
    /// Script the record entry is keyed by
    pub script: String,
}

/// A prepared cache instance — a closed family dispatched by kind
#[derive(Debug)]
pub enum TaskCache {
    /// Hash over a resolved file set
    Files(FilesCache),
    /// Hash over several sub-caches
    Multiple(MultipleCache),
}

impl TaskCache {
    /// Build a prepared cache from its configuration
    pub fn build(config: &CacheConfig, ctx: &CacheContext) -> Result<Self, ConfigError> {
        match config {
            CacheConfig::Files { patterns } => {
                Ok(Self::Files(FilesCache::prepare(patterns, ctx)?))
            }
            CacheConfig::Multiple { caches } => {
                let prepared = caches
                    .iter()
                    .map(|child| Self::build(child, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Multiple(MultipleCache {
                    workspace: ctx.workspace.clone(),
                    script: ctx.script.clone(),
                    caches: prepared,
                }))
            }
        }
    }

    /// Compose several cache configurations into one composite gate
    pub fn compose(configs: &[&CacheConfig], ctx: &CacheContext) -> Result<Self, ConfigError> {
        let prepared = configs
            .iter()
            .map(|config| Self::build(config, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Multiple(MultipleCache {
            workspace: ctx.workspace.clone(),
            script: ctx.script.clone(),
            caches: prepared,
        }))
    }

    /// The stable kind tag of this cache
    pub fn kind(&self) -> CacheKind {
        match self {
            Self::Files(_) => CacheKind::Files,
            Self::Multiple(_) => CacheKind::Multiple,
        }
    }

    fn workspace(&self) -> &Arc<Workspace> {
        match self {
            Self::Files(cache) => &cache.workspace,
            Self::Multiple(cache) => &cache.workspace,
        }
    }

    fn script(&self) -> &str {
        match self {
            Self::Files(cache) => &cache.script,
            Self::Multiple(cache) => &cache.script,
        }
    }

    /// Compute the current input hash
    pub fn hash(&self) -> Result<String, CacheError> {
        match self {
            Self::Files(cache) => cache.hash(),
            Self::Multiple(cache) => cache.hash(),
        }
    }

    /// Whether the inputs changed since the last saved hash.
    ///
    /// True on any mismatch or when no record exists — the action should
    /// run.
    pub fn compute(&self) -> Result<bool, CacheError> {
        let stored = stored_hash(self.workspace(), self.kind(), self.script())?;
        let current = self.hash()?;
        Ok(stored.as_deref() != Some(current.as_str()))
    }

    /// Persist the current hash into the workspace record
    pub fn save(&self) -> Result<(), CacheError> {
        let hash = self.hash()?;
        store_hash(self.workspace(), self.kind(), self.script(), &hash)
    }
}

/// Cache over the contents of a resolved file set
#[derive(Debug)]
pub struct FilesCache {
    workspace: Arc<Workspace>,
    script: String,
    files: Vec<PathBuf>,
}

impl FilesCache {
    /// Resolve patterns into the concrete file set.
    ///
    /// Placeholders are substituted first; relative patterns resolve
    /// against the workspace directory. A pattern that globs to nothing is
    /// retried as a literal path: a missing path is silently skipped, a
    /// directory expands recursively, a file is taken as-is. Discovery
    /// order is preserved, duplicates dropped.
    fn prepare(patterns: &[String], ctx: &CacheContext) -> Result<Self, ConfigError> {
        let mut files = Vec::new();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        for pattern in patterns {
            let substituted = substitute_placeholders(pattern, ctx)?;
            let absolute = if Path::new(&substituted).is_absolute() {
                substituted
            } else {
                ctx.workspace
                    .resolve(&substituted)
                    .to_string_lossy()
                    .into_owned()
            };

            let paths = glob::glob(&absolute).map_err(|err| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: err.to_string(),
            })?;

            let mut matched = false;
            for path in paths.flatten() {
                matched = true;
                collect_path(&path, &mut seen, &mut files);
            }
            if !matched {
                collect_path(Path::new(&absolute), &mut seen, &mut files);
            }
        }

        debug!(
            workspace = %ctx.workspace.name,
            script = %ctx.script,
            file_count = files.len(),
            "file cache prepared"
        );

        Ok(Self {
            workspace: ctx.workspace.clone(),
            script: ctx.script.clone(),
            files,
        })
    }

    /// `H(H(f1);H(f2);...)` over every resolved file's bytes
    fn hash(&self) -> Result<String, CacheError> {
        let mut digests = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let bytes = std::fs::read(file)?;
            digests.push(digest_bytes(&bytes));
        }
        Ok(digest_parts(&digests))
    }
}

/// Composite of several caches; one gate across all of them
#[derive(Debug)]
pub struct MultipleCache {
    workspace: Arc<Workspace>,
    script: String,
    caches: Vec<TaskCache>,
}

impl MultipleCache {
    /// `H(h1;h2;...)` over the sub-caches' own hashes, in order
    fn hash(&self) -> Result<String, CacheError> {
        let mut hashes = Vec::with_capacity(self.caches.len());
        for cache in &self.caches {
            hashes.push(cache.hash()?);
        }
        Ok(digest_parts(&hashes))
    }
}

fn substitute_placeholders(pattern: &str, ctx: &CacheContext) -> Result<String, ConfigError> {
    let substituted = pattern
        .replace("{monorepo_dir}", &ctx.monorepo_dir.to_string_lossy())
        .replace("{workspace_dir}", &ctx.workspace.directory.to_string_lossy());

    if let (Some(open), Some(close)) = (substituted.find('{'), substituted.rfind('}')) {
        if open < close {
            return Err(ConfigError::UnknownPlaceholder(substituted));
        }
    }

    Ok(substituted)
}

fn collect_path(path: &Path, seen: &mut HashSet<PathBuf>, files: &mut Vec<PathBuf>) {
    if path.is_dir() {
        for entry in WalkDir::new(path).into_iter().flatten() {
            if entry.file_type().is_file() {
                let file = entry.into_path();
                if seen.insert(file.clone()) {
                    files.push(file);
                }
            }
        }
    } else if path.is_file() && seen.insert(path.to_path_buf()) {
        files.push(path.to_path_buf());
    }
}

fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn digest_parts(parts: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join(";").as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Read the stored hash for (kind, script) from the workspace record
fn stored_hash(
    workspace: &Workspace,
    kind: CacheKind,
    script: &str,
) -> Result<Option<String>, CacheError> {
    let path = workspace.cache_file();
    if !path.exists() {
        return Ok(None);
    }

    let record: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    Ok(record
        .get(kind.as_str())
        .and_then(|entry| entry.get(script))
        .and_then(Value::as_str)
        .map(String::from))
}

/// Merge `{kind: {script: hash}}` into the workspace record file.
///
/// The read-merge-write sequence holds the workspace cache mutex so
/// concurrent tasks in the same workspace cannot lose each other's kinds.
fn store_hash(
    workspace: &Workspace,
    kind: CacheKind,
    script: &str,
    hash: &str,
) -> Result<(), CacheError> {
    let _guard = workspace
        .cache_lock()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let path = workspace.cache_file();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let existing: Value = if path.exists() {
        serde_json::from_str(&std::fs::read_to_string(&path)?)?
    } else {
        Value::Object(Default::default())
    };

    let entry = serde_json::json!({ kind.as_str(): { script: hash } });
    let merged = deep_merge(existing, entry);

    std::fs::write(&path, serde_json::to_string_pretty(&merged)?)?;
    Ok(())
}

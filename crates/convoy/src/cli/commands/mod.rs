//! CLI commands

mod list;
mod plan;
mod run;

pub use list::ListCommand;
pub use plan::PlanCommand;
pub use run::RunCommand;

use std::path::PathBuf;

use anyhow::Context;

use convoy_core::config::find_root;
use convoy_core::monorepo::RunContext;

/// Locate the monorepo root from the current directory and load everything
pub(crate) fn load_context() -> anyhow::Result<(PathBuf, RunContext)> {
    let cwd = std::env::current_dir()?;
    let root = find_root(&cwd).context("No convoy.toml found in this directory or any parent")?;
    let ctx = RunContext::load(&root)?;
    Ok((root, ctx))
}

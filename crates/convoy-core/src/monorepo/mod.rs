//! Monorepo model: workspaces, discovery, and run context

pub mod context;
pub mod discovery;
pub mod workspace;

pub use context::{Monorepo, RunContext};
pub use discovery::discover_workspaces;
pub use workspace::Workspace;

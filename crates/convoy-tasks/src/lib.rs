//! Convoy Tasks - Pipeline graph engine and cache-gated task scheduler
//!
//! This crate expands per-script pipeline declarations into a dependency
//! graph of (workspace, script) units, orders them into parallelizable
//! layers, and gates each unit's execution behind a content-hash cache.

pub mod cache;
pub mod executor;
pub mod graph;
pub mod pipeline;
pub mod reporter;
pub mod runner;
pub mod task;

pub use cache::{CacheContext, CacheError, CacheKind, TaskCache};
pub use executor::{ExecContext, Executor};
pub use graph::{format_cycle, Graph, GraphError, Vertex};
pub use pipeline::{script_pipelines, unit_id, workspace_pipelines, ExecutionUnit, ScriptPipeline};
pub use reporter::{CollectingReporter, TaskEvent, TaskReporter, TracingReporter};
pub use runner::{filtered_workspaces, plan_script, run_script, RunError, Runner};
pub use task::{Task, TaskError};

//! CLI definition and command handling

pub mod commands;

use clap::{Parser, Subcommand};

use commands::{ListCommand, PlanCommand, RunCommand};

/// Convoy - Monorepo task orchestration CLI
#[derive(Debug, Parser)]
#[command(name = "convoy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a script across the monorepo
    Run(RunCommand),

    /// Show the layered execution plan for a script without running it
    Plan(PlanCommand),

    /// List discovered workspaces
    List(ListCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Run(ref cmd) => cmd.execute(&self),
            Commands::Plan(ref cmd) => cmd.execute(&self),
            Commands::List(ref cmd) => cmd.execute(&self),
        }
    }
}

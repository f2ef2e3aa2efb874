//! Run command — execute a script across the monorepo

use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;

use convoy_tasks::{run_script, TaskEvent, TaskReporter, TracingReporter};

use crate::cli::Cli;

/// Run a script across the monorepo
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Script to run (e.g. build, test, lint)
    pub script: String,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        let (_, ctx) = super::load_context()?;

        if !cli.quiet {
            let names: Vec<&str> = ctx.workspaces.iter().map(|w| w.name.as_str()).collect();
            println!(
                "{} {} workspace{}: {}",
                style("→").blue(),
                names.len(),
                if names.len() == 1 { "" } else { "s" },
                summarize(&names),
            );
            println!();
        }

        let reporter: Arc<dyn TaskReporter> = if cli.quiet {
            Arc::new(TracingReporter)
        } else {
            Arc::new(ConsoleReporter::new(cli.verbose))
        };

        let start = Instant::now();
        let result = run_script(&ctx, &self.script, reporter).await;

        match result {
            Ok(()) => {
                if !cli.quiet {
                    println!();
                    println!(
                        "  {} completed in {:.1}s",
                        style("✓").green().bold(),
                        start.elapsed().as_secs_f64()
                    );
                }
                Ok(())
            }
            Err(err) => {
                if !cli.quiet {
                    println!();
                    println!("  {} {}", style("✗").red().bold(), style(&err).red());
                }
                Err(err.into())
            }
        }
    }
}

fn summarize(names: &[&str]) -> String {
    if names.len() > 5 {
        format!("{}, and {} more", names[..5].join(", "), names.len() - 5)
    } else {
        names.join(", ")
    }
}

/// Console reporter with live output
struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { id } => {
                println!("  {} {}", style("▸").dim(), style(id).bold());
            }
            TaskEvent::Output { id, line, is_stderr } => {
                if self.verbose {
                    if *is_stderr {
                        println!("    {} {}", style(format!("[{}]", id)).red().dim(), line);
                    } else {
                        println!("    {} {}", style(format!("[{}]", id)).dim(), line);
                    }
                }
            }
            TaskEvent::Completed { id, duration, cached } => {
                if *cached {
                    println!(
                        "  {} {} {} {}",
                        style("✓").green(),
                        style(id).green(),
                        style("(cache hit)").cyan(),
                        style(format!("{:.1}s", duration.as_secs_f64())).dim()
                    );
                } else {
                    println!(
                        "  {} {} {}",
                        style("✓").green(),
                        style(id).green(),
                        style(format!("{:.1}s", duration.as_secs_f64())).dim()
                    );
                }
            }
            TaskEvent::Failed { id, duration, error } => {
                println!(
                    "  {} {} {} {}",
                    style("✗").red(),
                    style(id).red(),
                    style(format!("{:.1}s", duration.as_secs_f64())).dim(),
                    style(error).red().dim()
                );
            }
            TaskEvent::Restarted { id, attempt } => {
                println!(
                    "  {} {} {}",
                    style("↻").yellow(),
                    style(id).yellow(),
                    style(format!("(restart {})", attempt)).dim()
                );
            }
            TaskEvent::LayerStarted { layer, task_count } => {
                if self.verbose {
                    println!(
                        "  {} Layer {} ({} tasks)",
                        style("─").dim(),
                        layer,
                        task_count
                    );
                }
            }
        }
    }
}

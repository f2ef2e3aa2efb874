//! Plan command — show the layered execution plan without running

use clap::Args;
use console::style;

use convoy_tasks::plan_script;

use crate::cli::{Cli, OutputFormat};

/// Show the layered execution plan for a script without running it
#[derive(Debug, Args)]
pub struct PlanCommand {
    /// Script to plan
    pub script: String,
}

impl PlanCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let (_, ctx) = super::load_context()?;

        let plan = plan_script(&ctx, &self.script)?;

        if cli.format == OutputFormat::Json {
            let layers: Vec<serde_json::Value> = plan
                .iter()
                .enumerate()
                .map(|(index, layer)| {
                    serde_json::json!({
                        "layer": index,
                        "tasks": layer,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&layers)?);
            return Ok(());
        }

        if plan.is_empty() {
            println!(
                "{} no tasks for script {}",
                style("○").yellow(),
                style(&self.script).cyan()
            );
            return Ok(());
        }

        for (index, layer) in plan.iter().enumerate() {
            println!(
                "{} ({} task{})",
                style(format!("Layer {}", index)).bold(),
                layer.len(),
                if layer.len() == 1 { "" } else { "s" },
            );
            for id in layer {
                println!("  {} {}", style("▸").dim(), id);
            }
        }

        Ok(())
    }
}

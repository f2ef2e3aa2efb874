//! List command — show discovered workspaces

use clap::Args;
use console::style;

use crate::cli::{Cli, OutputFormat};

/// List discovered workspaces
#[derive(Debug, Args)]
pub struct ListCommand {}

impl ListCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let (root, ctx) = super::load_context()?;

        if cli.format == OutputFormat::Json {
            let workspaces: Vec<serde_json::Value> = ctx
                .workspaces
                .iter()
                .map(|workspace| {
                    serde_json::json!({
                        "name": workspace.name,
                        "directory": workspace.directory,
                        "scripts": workspace.scripts.keys().collect::<Vec<_>>(),
                        "dependencies": workspace.dependencies,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&workspaces)?);
            return Ok(());
        }

        if ctx.workspaces.is_empty() {
            println!("{} no workspaces found", style("○").yellow());
            return Ok(());
        }

        println!(
            "{} {} workspace{} in {}",
            style("→").blue(),
            ctx.workspaces.len(),
            if ctx.workspaces.len() == 1 { "" } else { "s" },
            style(root.display()).dim(),
        );

        for workspace in &ctx.workspaces {
            let relative = workspace
                .directory
                .strip_prefix(&root)
                .unwrap_or(&workspace.directory);
            let scripts: Vec<&str> = workspace.scripts.keys().map(String::as_str).collect();

            println!(
                "  {} {} {}",
                style(&workspace.name).bold(),
                style(relative.display()).dim(),
                if scripts.is_empty() {
                    style("(no scripts)".to_string()).dim()
                } else {
                    style(format!("[{}]", scripts.join(", "))).dim()
                },
            );
        }

        Ok(())
    }
}

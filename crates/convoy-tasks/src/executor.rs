//! Executors — strategies for performing one unit's action

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use convoy_core::config::{ConfigRef, ExecutorConfig, ExecutorKind};
use convoy_core::error::ConfigError;
use convoy_core::monorepo::Workspace;

use crate::reporter::{TaskEvent, TaskReporter};
use crate::task::TaskError;

/// What an execution is bound to
#[derive(Clone)]
pub struct ExecContext {
    /// Workspace the action runs in
    pub workspace: Arc<Workspace>,
    /// Script being executed
    pub script: String,
    /// Fully layered environment variables
    pub env: BTreeMap<String, String>,
    /// Progress sink
    pub reporter: Arc<dyn TaskReporter>,
}

impl ExecContext {
    fn unit_id(&self) -> String {
        format!("{}:{}", self.workspace.name, self.script)
    }
}

/// A prepared executor with its extends chain resolved
#[derive(Debug, Clone)]
pub struct Executor {
    config: ExecutorConfig,
    children: Vec<Executor>,
}

impl Executor {
    /// Build an executor from its configuration, resolving the extends
    /// chain against the workspace's executor registry. Children of a
    /// `multiple` executor are resolved eagerly.
    pub fn from_config(config: &ExecutorConfig, workspace: &Workspace) -> Result<Self, ConfigError> {
        let config = config.resolve(&workspace.executors)?;

        let children = match config.kind() {
            ExecutorKind::Multiple => config
                .executors
                .iter()
                .map(|child| match child {
                    ConfigRef::Named(name) => workspace
                        .executors
                        .get(name)
                        .ok_or_else(|| ConfigError::ExecutorNotFound(name.clone()))
                        .and_then(|config| Executor::from_config(config, workspace)),
                    ConfigRef::Inline(config) => Executor::from_config(config, workspace),
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };

        Ok(Self { config, children })
    }

    /// The resolved configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Perform the action. Boxed because `multiple` executors recurse.
    pub fn execute<'a>(&'a self, ctx: &'a ExecContext) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin(async move {
            match self.config.kind() {
                ExecutorKind::Script => self.execute_script(ctx).await,
                ExecutorKind::Command => self.execute_command(ctx).await,
                ExecutorKind::Multiple => self.execute_multiple(ctx).await,
            }
        })
    }

    /// Run the command line the workspace declares for the script
    async fn execute_script(&self, ctx: &ExecContext) -> Result<(), TaskError> {
        let script = self.config.script.as_deref().unwrap_or(&ctx.script);
        let line = ctx
            .workspace
            .script(script)
            .ok_or_else(|| TaskError::MissingScript {
                workspace: ctx.workspace.name.clone(),
                script: script.to_string(),
            })?
            .to_string();

        run_command("sh", &["-c".to_string(), line], ctx).await
    }

    /// Run an explicit program with arguments
    async fn execute_command(&self, ctx: &ExecContext) -> Result<(), TaskError> {
        let program = self
            .config
            .command
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("executor.command".to_string()))?;

        run_command(program, &self.config.args, ctx).await
    }

    /// Run child executors, together or in order
    async fn execute_multiple(&self, ctx: &ExecContext) -> Result<(), TaskError> {
        let stop_on_error = self.config.stop_on_error();

        if self.config.parallel() {
            let handles: Vec<_> = self
                .children
                .iter()
                .map(|child| {
                    let child = child.clone();
                    let ctx = ctx.clone();
                    tokio::spawn(async move { child.execute(&ctx).await })
                })
                .collect();

            let mut first_error = None;
            for handle in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(join) => Err(TaskError::Failed {
                        workspace: ctx.workspace.name.clone(),
                        script: ctx.script.clone(),
                        reason: format!("executor panicked: {}", join),
                    }),
                };
                if let Err(err) = result {
                    if first_error.is_none() {
                        first_error = Some(err);
                    } else {
                        tracing::warn!("{}", err);
                    }
                }
            }

            match first_error {
                Some(err) if stop_on_error => Err(err),
                Some(err) => {
                    tracing::warn!("{}", err);
                    Ok(())
                }
                None => Ok(()),
            }
        } else {
            for child in &self.children {
                if let Err(err) = child.execute(ctx).await {
                    if stop_on_error {
                        return Err(err);
                    }
                    tracing::warn!("{}", err);
                }
            }
            Ok(())
        }
    }
}

/// Spawn a process in the workspace directory, relaying output line by
/// line through the reporter, and wait for it to exit.
async fn run_command(program: &str, args: &[String], ctx: &ExecContext) -> Result<(), TaskError> {
    let display = if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    };

    let mut child = Command::new(program)
        .args(args)
        .current_dir(&ctx.workspace.directory)
        .envs(&ctx.env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| TaskError::Spawn {
            command: display.clone(),
            source,
        })?;

    let id = ctx.unit_id();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stdout_relay = async {
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                ctx.reporter.report(&TaskEvent::Output {
                    id: id.clone(),
                    line,
                    is_stderr: false,
                });
            }
        }
    };
    let stderr_relay = async {
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                ctx.reporter.report(&TaskEvent::Output {
                    id: id.clone(),
                    line,
                    is_stderr: true,
                });
            }
        }
    };
    tokio::join!(stdout_relay, stderr_relay);

    let status = child.wait().await.map_err(|source| TaskError::Spawn {
        command: display,
        source,
    })?;

    if status.success() {
        Ok(())
    } else {
        Err(TaskError::Failed {
            workspace: ctx.workspace.name.clone(),
            script: ctx.script.clone(),
            reason: format!("process exited with code {}", status.code().unwrap_or(-1)),
        })
    }
}

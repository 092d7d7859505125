//! Runs an external test command as the suite.

use dockhand_core::{RunContext, SuiteOutcome, TestSuite};
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

/// Test suite backed by a child process.
///
/// The child inherits stdio and receives the descriptor through an
/// environment variable. Dropping the running suite kills the child.
pub struct CommandSuite {
    program: String,
    args: Vec<String>,
    descriptor_env: String,
}

impl CommandSuite {
    /// Build from `program arg...`. Returns `None` for an empty command.
    pub fn new(command: &[String], descriptor_env: impl Into<String>) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            descriptor_env: descriptor_env.into(),
        })
    }

    fn command<C>(&self, ctx: &RunContext<C>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(&self.descriptor_env, ctx.descriptor().as_str())
            .env("DOCKHAND_CONTAINER_ID", ctx.container_id())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

impl<C: Send + 'static> TestSuite<C> for CommandSuite {
    async fn run(self, ctx: RunContext<C>) -> SuiteOutcome {
        let mut cmd = self.command(&ctx);
        // The child opens its own connections.
        drop(ctx);

        info!(program = %self.program, args = ?self.args, "Running test command");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return SuiteOutcome::aborted(format!("failed to spawn {}: {}", self.program, e)),
        };

        match child.wait().await {
            Ok(status) if status.success() => SuiteOutcome::Passed,
            Ok(status) => SuiteOutcome::failed(format!("test command exited with {}", status)),
            Err(e) => SuiteOutcome::aborted(format!("failed to wait for test command: {}", e)),
        }
    }
}

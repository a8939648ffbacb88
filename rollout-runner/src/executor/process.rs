//! Process actions
//!
//! Runs a program inside the run's workspace with the run environment.
//! The child is killed if the action future is dropped, which is how a
//! stage timeout stops it.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use rollout_core::domain::pipeline::ActionSpec;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

use super::{Action, ActionOutcome};
use crate::context::RunContext;

/// A program invocation built from an [`ActionSpec`]
#[derive(Debug, Clone)]
pub struct ProcessAction {
    program: String,
    args: Vec<String>,
    cwd: Option<String>,
    env: HashMap<String, String>,
    label: String,
}

impl ProcessAction {
    pub fn from_spec(spec: &ActionSpec) -> Self {
        let label = spec.describe();
        match spec {
            ActionSpec::Command {
                cmd,
                args,
                cwd,
                env,
            } => Self {
                program: cmd.clone(),
                args: args.clone(),
                cwd: cwd.clone(),
                env: env.clone(),
                label,
            },
            ActionSpec::Shell { script } => Self {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), script.clone()],
                cwd: None,
                env: HashMap::new(),
                label,
            },
        }
    }
}

#[async_trait]
impl Action for ProcessAction {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn execute(&self, ctx: &RunContext) -> ActionOutcome {
        // Relative directories resolve against the workspace
        let working_dir = match &self.cwd {
            Some(dir) => ctx.workspace.join(dir),
            None => ctx.workspace.clone(),
        };

        debug!("Executing {} {:?} in {}", self.program, self.args, working_dir.display());

        let child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&working_dir)
            .envs(ctx.env())
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                return ActionOutcome::not_started(format!(
                    "failed to start '{}': {}",
                    self.program, e
                ));
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return ActionOutcome::not_started(format!(
                "'{}' started without output pipes",
                self.program
            ));
        };

        let output = match read_merged(stdout, stderr).await {
            Ok(output) => output,
            Err(e) => format!("failed to read output of '{}': {}", self.program, e),
        };

        match child.wait().await {
            Ok(status) => ActionOutcome {
                success: status.success(),
                exit_code: status.code(),
                output,
            },
            Err(e) => ActionOutcome {
                success: false,
                exit_code: None,
                output: format!("{}failed to wait for '{}': {}", output, self.program, e),
            },
        }
    }
}

/// Collects both streams line by line in the order the lines arrive
async fn read_merged<O, E>(stdout: O, stderr: E) -> std::io::Result<String>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut stdout = BufReader::new(stdout).split(b'\n');
    let mut stderr = BufReader::new(stderr).split(b'\n');
    let (mut stdout_open, mut stderr_open) = (true, true);
    let mut merged = String::new();

    while stdout_open || stderr_open {
        let line = tokio::select! {
            line = stdout.next_segment(), if stdout_open => {
                let line = line?;
                stdout_open = line.is_some();
                line
            }
            line = stderr.next_segment(), if stderr_open => {
                let line = line?;
                stderr_open = line.is_some();
                line
            }
        };
        if let Some(line) = line {
            merged.push_str(&String::from_utf8_lossy(&line));
            merged.push('\n');
        }
    }
    Ok(merged)
}

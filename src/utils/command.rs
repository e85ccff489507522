//! Structured external-tool commands and the sequential runner that executes them.

use std::fmt;
use std::process::Stdio;

use log::{debug, error};
use tokio::process::Command;

use crate::config::defs::PipelineError;

/// One external tool invocation.
///
/// `Argv` runs the program directly with an argument vector. `Shell` goes
/// through `sh -c` and is reserved for stages that need pipes or redirection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCommand {
    Argv { program: String, args: Vec<String> },
    Shell(String),
}

impl ToolCommand {
    pub fn new(program: &str) -> Self {
        ToolCommand::Argv {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    pub fn shell(script: impl Into<String>) -> Self {
        ToolCommand::Shell(script.into())
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        match &mut self {
            ToolCommand::Argv { args, .. } => args.push(arg.as_ref().to_string()),
            ToolCommand::Shell(script) => {
                script.push(' ');
                script.push_str(arg.as_ref());
            }
        }
        self
    }

    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        args.into_iter().fold(self, |cmd, a| cmd.arg(a))
    }

    /// Program name for Argv commands, the first word for shell scripts.
    pub fn program(&self) -> &str {
        match self {
            ToolCommand::Argv { program, .. } => program,
            ToolCommand::Shell(script) => script.split_whitespace().next().unwrap_or(""),
        }
    }

    fn to_process(&self) -> Command {
        match self {
            ToolCommand::Argv { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
            ToolCommand::Shell(script) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(script);
                cmd
            }
        }
    }
}

fn needs_quotes(arg: &str) -> bool {
    arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"')
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolCommand::Argv { program, args } => {
                write!(f, "{}", program)?;
                for arg in args {
                    if needs_quotes(arg) {
                        write!(f, " \"{}\"", arg.replace('"', "\\\""))?;
                    } else {
                        write!(f, " {}", arg)?;
                    }
                }
                Ok(())
            }
            ToolCommand::Shell(script) => write!(f, "{}", script),
        }
    }
}

/// Runs commands one after another, stopping at the first failure.
///
/// # Arguments
///
/// * `commands` - Commands in execution order.
/// * `tool` - Name used in the failure message.
/// * `progress` - Called with the command index before each command starts.
///
/// # Returns
/// Ok once every command exited with status 0, otherwise a `ToolExecution`
/// error carrying the failing command, its stdout and stderr.
pub async fn run_commands<F>(commands: &[ToolCommand], tool: &str, mut progress: F) -> Result<(), PipelineError>
where
    F: FnMut(usize),
{
    for (i, cmd) in commands.iter().enumerate() {
        progress(i);
        let rendered = cmd.to_string();
        debug!("Running {} command {}/{}: {}", tool, i + 1, commands.len(), rendered);

        let output = cmd
            .to_process()
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                error!("Failed to spawn {}: {}", cmd.program(), e);
                PipelineError::ToolExecution {
                    tool: tool.to_string(),
                    command: rendered.clone(),
                    stdout: String::new(),
                    stderr: format!("Failed to spawn {}: {}", cmd.program(), e),
                    code: None,
                }
            })?;

        if !output.status.success() {
            error!("{} exited with {:?}: {}", cmd.program(), output.status.code(), rendered);
            return Err(PipelineError::ToolExecution {
                tool: tool.to_string(),
                command: rendered,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                code: output.status.code(),
            });
        }
    }
    Ok(())
}

//! Bounded execution of external cluster tools.
//!
//! Every invocation captures stdout and stderr separately, runs under its own
//! timeout and is killed, together with everything it started, when the
//! timeout fires or the surrounding future is dropped. A non-zero
//! exit is always reported as [`ProcessError::NonZeroExit`]; callers never see
//! the stdout of a failed command as a successful result.

use std::{
    process::Stdio,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{ChildStdin, Command},
};

use crate::{shell::get_shell_command, text::redact_paths};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the external program is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Program {
    /// Direct exec with an argument list. No shell is involved.
    Exec { program: String, args: Vec<String> },
    /// A fixed script run by the shell. Values reach the script only as
    /// positional parameters (`"$1"`, `"$2"`, ...), never as script text.
    Shell {
        script: &'static str,
        args: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct CommandInvocation {
    program: Program,
    env_vars: Vec<(String, String)>,
    stdin: Option<String>,
    timeout: Duration,
}

impl CommandInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: Program::Exec {
                program: program.into(),
                args: Vec::new(),
            },
            env_vars: Vec::new(),
            stdin: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn shell(script: &'static str) -> Self {
        Self {
            program: Program::Shell {
                script,
                args: Vec::new(),
            },
            env_vars: Vec::new(),
            stdin: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        match &mut self.program {
            Program::Exec { args, .. } | Program::Shell { args, .. } => args.push(arg.into()),
        }
        self
    }

    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self = self.arg(value);
        }
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn env_vars(&self) -> &[(String, String)] {
        &self.env_vars
    }

    pub fn stdin_input(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    /// Human readable command line, used for logs and debug payloads.
    pub fn command_line(&self) -> String {
        match &self.program {
            Program::Exec { program, args } => join_command(program, args),
            Program::Shell { script, args } => {
                let (shell, flag) = get_shell_command();
                let mut parts = vec![flag.to_string(), script.to_string(), shell.clone()];
                parts.extend(args.iter().cloned());
                join_command(&shell, &parts)
            }
        }
    }

    fn to_command(&self) -> Command {
        let mut command = match &self.program {
            Program::Exec { program, args } => {
                let mut command = Command::new(program);
                command.args(args);
                command
            }
            Program::Shell { script, args } => {
                let (shell, flag) = get_shell_command();
                let mut command = Command::new(&shell);
                // `$0` is the shell name, user values start at `$1`
                command.arg(flag).arg(script).arg(&shell).args(args);
                command
            }
        };
        for (key, value) in &self.env_vars {
            command.env(key, value);
        }
        command
    }
}

fn join_command(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) || arg.contains('\'') {
            line.push('\'');
            line.push_str(&arg.replace('\'', r"'\''"));
            line.push('\'');
        } else {
            line.push_str(arg);
        }
    }
    line
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl CommandResult {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with status {code}")]
    NonZeroExit {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("i/o error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    pub fn command(&self) -> &str {
        match self {
            ProcessError::Spawn { command, .. }
            | ProcessError::NonZeroExit { command, .. }
            | ProcessError::Timeout { command, .. }
            | ProcessError::Io { command, .. } => command,
        }
    }

    /// Short, path-redacted explanation suitable for an API response.
    ///
    /// For a non-zero exit this prefers stderr and falls back to stdout, since
    /// several site scripts report their errors on stdout.
    pub fn user_message(&self) -> String {
        match self {
            ProcessError::Spawn { .. } => "command is not available on this system".to_string(),
            ProcessError::NonZeroExit {
                code,
                stdout,
                stderr,
                ..
            } => {
                let detail = if stderr.trim().is_empty() {
                    stdout.trim()
                } else {
                    stderr.trim()
                };
                if detail.is_empty() {
                    format!("command failed with status {code}")
                } else {
                    redact_paths(&first_lines(detail, 5))
                }
            }
            ProcessError::Timeout { timeout, .. } => {
                format!("command timed out after {}s", timeout.as_secs())
            }
            ProcessError::Io { .. } => "command failed while reading its output".to_string(),
        }
    }
}

fn first_lines(text: &str, limit: usize) -> String {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .take(limit)
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &CommandInvocation) -> Result<CommandResult, ProcessError>;
}

/// Runs invocations as child processes of the server.
///
/// Each child leads its own process group, so a timeout or a dropped request
/// takes down everything a script started, not only the shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

/// Kills the process group on drop unless the leader was already reaped.
struct GroupGuard {
    child: AsyncGroupChild,
    reaped: bool,
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.start_kill();
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

async fn feed_stdin(pipe: Option<ChildStdin>, input: Option<&str>) -> std::io::Result<()> {
    let (Some(mut pipe), Some(input)) = (pipe, input) else {
        return Ok(());
    };
    let written = async {
        pipe.write_all(input.as_bytes()).await?;
        pipe.shutdown().await
    }
    .await;
    match written {
        // the tool is free to exit without reading its input
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, invocation: &CommandInvocation) -> Result<CommandResult, ProcessError> {
        let command_line = invocation.command_line();
        let timeout = invocation.timeout_duration();
        let started = Instant::now();

        let mut command = invocation.to_command();
        command
            .stdin(if invocation.stdin_input().is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(command = %command_line, ?timeout, "spawning command");

        let child = command.group_spawn().map_err(|source| ProcessError::Spawn {
            command: command_line.clone(),
            source,
        })?;
        let mut guard = GroupGuard {
            child,
            reaped: false,
        };

        let inner = guard.child.inner();
        let stdin = inner.stdin.take();
        let stdout = inner.stdout.take();
        let stderr = inner.stderr.take();

        let execution = async {
            let (status, stdout, stderr, ()) = tokio::try_join!(
                guard.child.wait(),
                read_pipe(stdout),
                read_pipe(stderr),
                feed_stdin(stdin, invocation.stdin_input()),
            )?;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        };

        let outcome = tokio::time::timeout(timeout, execution).await;
        let (status, stdout, stderr) = match outcome {
            Ok(Ok(output)) => {
                guard.reaped = true;
                output
            }
            Ok(Err(source)) => {
                return Err(ProcessError::Io {
                    command: command_line,
                    source,
                });
            }
            Err(_) => {
                tracing::warn!(command = %command_line, ?timeout, "command timed out");
                match guard.child.kill().await {
                    Ok(()) => guard.reaped = true,
                    Err(err) => {
                        tracing::warn!(command = %command_line, error = %err, "could not kill process group");
                    }
                }
                return Err(ProcessError::Timeout {
                    command: command_line,
                    timeout,
                });
            }
        };

        let exit_code = status.code().unwrap_or(-1);
        if !status.success() {
            return Err(ProcessError::NonZeroExit {
                command: command_line,
                code: exit_code,
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            });
        }

        Ok(CommandResult {
            exit_code,
            stdout,
            stderr,
            duration: started.elapsed(),
        })
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use scripted::ScriptedRunner;

#[cfg(any(test, feature = "test-support"))]
mod scripted {
    use std::sync::Mutex;

    use super::*;

    enum Outcome {
        Success(String),
        Failure {
            code: i32,
            stdout: String,
            stderr: String,
        },
    }

    struct Script {
        command_line: String,
        outcome: Outcome,
        delay: Duration,
    }

    /// Answers invocations from canned output keyed by command line.
    ///
    /// Unknown commands fail like a missing binary (status 127). A delay longer
    /// than the invocation timeout produces [`ProcessError::Timeout`].
    #[derive(Default)]
    pub struct ScriptedRunner {
        scripts: Vec<Script>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(self, command_line: impl Into<String>, stdout: impl Into<String>) -> Self {
            self.on_delayed(command_line, stdout, Duration::ZERO)
        }

        pub fn on_delayed(
            mut self,
            command_line: impl Into<String>,
            stdout: impl Into<String>,
            delay: Duration,
        ) -> Self {
            self.scripts.push(Script {
                command_line: command_line.into(),
                outcome: Outcome::Success(stdout.into()),
                delay,
            });
            self
        }

        pub fn on_failure(
            mut self,
            command_line: impl Into<String>,
            code: i32,
            stdout: impl Into<String>,
            stderr: impl Into<String>,
        ) -> Self {
            self.scripts.push(Script {
                command_line: command_line.into(),
                outcome: Outcome::Failure {
                    code,
                    stdout: stdout.into(),
                    stderr: stderr.into(),
                },
                delay: Duration::ZERO,
            });
            self
        }

        /// Command lines seen so far, in call order.
        pub fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .map(|calls| calls.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl ProcessRunner for ScriptedRunner {
        async fn run(
            &self,
            invocation: &CommandInvocation,
        ) -> Result<CommandResult, ProcessError> {
            let command_line = invocation.command_line();
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(command_line.clone());
            }

            let Some(script) = self
                .scripts
                .iter()
                .find(|script| script.command_line == command_line)
            else {
                return Err(ProcessError::NonZeroExit {
                    command: command_line,
                    code: 127,
                    stdout: String::new(),
                    stderr: "command not found".to_string(),
                });
            };

            let timeout = invocation.timeout_duration();
            if script.delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(ProcessError::Timeout {
                    command: command_line,
                    timeout,
                });
            }
            if !script.delay.is_zero() {
                tokio::time::sleep(script.delay).await;
            }

            match &script.outcome {
                Outcome::Success(stdout) => Ok(CommandResult {
                    exit_code: 0,
                    stdout: stdout.clone().into_bytes(),
                    stderr: Vec::new(),
                    duration: script.delay,
                }),
                Outcome::Failure {
                    code,
                    stdout,
                    stderr,
                } => Err(ProcessError::NonZeroExit {
                    command: command_line,
                    code: *code,
                    stdout: stdout.clone(),
                    stderr: stderr.clone(),
                }),
            }
        }
    }
}

use std::{
    collections::BTreeMap,
    ffi::OsString,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use serde::Serialize;
use thiserror::Error;
use utils::{
    process::{CommandInvocation, ProcessError, ProcessRunner},
    shell::{merge_paths, resolve_executable_path},
    validate::ValidationError,
};

use super::table::ParseError;

/// Tools reported by the health check.
pub const KNOWN_TOOLS: &[&str] = &[
    "sinfo",
    "squeue",
    "scancel",
    "scontrol",
    "showquota",
    "cpuavail",
    "myproject",
    "toolchains",
    "create_venv",
    "delete_venv",
];

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error(transparent)]
    InvalidArgument(#[from] ValidationError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    UnexpectedFormat(#[from] ParseError),
}

/// One executed command and what it printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandTrace {
    pub command: String,
    pub stdout: String,
}

/// Parsed data together with the commands that produced it.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub data: T,
    pub traces: Vec<CommandTrace>,
}

impl<T> Fetched<T> {
    pub fn new(data: T, trace: CommandTrace) -> Self {
        Self {
            data,
            traces: vec![trace],
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            data: f(self.data),
            traces: self.traces,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusterSettings {
    /// Directory holding site scripts; searched before PATH.
    pub tool_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub fanout_limit: usize,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            tool_dir: None,
            timeout: utils::process::DEFAULT_TIMEOUT,
            fanout_limit: 4,
        }
    }
}

/// Entry point for every cluster tool invocation.
#[derive(Clone)]
pub struct Cluster {
    runner: Arc<dyn ProcessRunner>,
    settings: ClusterSettings,
    child_path: Option<OsString>,
}

impl Cluster {
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: ClusterSettings) -> Self {
        let child_path = settings
            .tool_dir
            .as_ref()
            .map(|dir| merge_paths(dir, std::env::var_os("PATH").unwrap_or_default()));
        Self {
            runner,
            settings,
            child_path,
        }
    }

    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    /// Invocation of a named tool with the configured timeout and search path.
    /// Executables in the tool dir win over anything else on PATH.
    pub fn command(&self, tool: &str) -> CommandInvocation {
        let program = self
            .settings
            .tool_dir
            .as_ref()
            .and_then(|dir| resolve_executable_path(tool, dir.as_os_str()))
            .map(|candidate| candidate.to_string_lossy().into_owned())
            .unwrap_or_else(|| tool.to_string());
        self.prepare(CommandInvocation::new(program))
    }

    /// Invocation of a fixed shell script; see [`CommandInvocation::shell`].
    pub fn script(&self, script: &'static str) -> CommandInvocation {
        self.prepare(CommandInvocation::shell(script))
    }

    fn prepare(&self, invocation: CommandInvocation) -> CommandInvocation {
        let invocation = invocation.timeout(self.settings.timeout);
        match &self.child_path {
            Some(path) => invocation.env("PATH", path.to_string_lossy()),
            None => invocation,
        }
    }

    /// Run an invocation and return its stdout. Failures are logged with the
    /// command line before they are returned.
    pub async fn capture(&self, invocation: CommandInvocation) -> Result<CommandTrace, ClusterError> {
        let command = invocation.command_line();
        match self.runner.run(&invocation).await {
            Ok(result) => {
                tracing::debug!(%command, duration_ms = result.duration.as_millis() as u64, "command finished");
                Ok(CommandTrace {
                    command,
                    stdout: result.stdout_text(),
                })
            }
            Err(err) => {
                tracing::error!(%command, error = %err, "cluster command failed");
                Err(err.into())
            }
        }
    }

    /// Run an invocation and hand its stdout to `parse`.
    pub async fn fetch<T>(
        &self,
        invocation: CommandInvocation,
        parse: impl FnOnce(&str) -> Result<T, ParseError>,
    ) -> Result<Fetched<T>, ClusterError> {
        let trace = self.capture(invocation).await?;
        match parse(&trace.stdout) {
            Ok(data) => Ok(Fetched::new(data, trace)),
            Err(err) => {
                tracing::error!(command = %trace.command, error = %err, "could not parse command output");
                Err(err.into())
            }
        }
    }

    /// Whether each known tool can be found by name.
    pub fn tool_status(&self) -> BTreeMap<&'static str, bool> {
        let search = match &self.child_path {
            Some(path) => path.clone(),
            None => std::env::var_os("PATH").unwrap_or_default(),
        };
        KNOWN_TOOLS
            .iter()
            .map(|tool| (*tool, resolve_executable_path(tool, &search).is_some()))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use utils::process::ScriptedRunner;

    use super::{Cluster, ClusterSettings};

    pub fn cluster(runner: ScriptedRunner) -> (Cluster, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let cluster = Cluster::new(runner.clone(), ClusterSettings::default());
        (cluster, runner)
    }
}

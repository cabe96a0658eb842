mod system;

#[cfg(test)]
pub mod fake;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use system::SystemRunner;

/**
    Errors from running or controlling external tools.
*/
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/**
    A program invocation. Values listed as secrets are masked when the
    command is rendered for logs.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    secrets: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secrets: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn secret(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.secrets.push(value);
        }
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        for secret in &self.secrets {
            rendered = rendered.replace(secret.as_str(), "***");
        }
        f.write_str(&rendered)
    }
}

/// Output of a command that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
}

impl ExitInfo {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}

/**
    A running child process owned by the caller.
*/
#[async_trait]
pub trait ManagedChild: Send {
    fn id(&self) -> Option<u32>;

    /// Non-blocking exit check.
    fn try_wait(&mut self) -> Result<Option<ExitInfo>, ProcessError>;

    /// Ask the process to exit (SIGTERM on unix).
    fn terminate(&mut self) -> Result<(), ProcessError>;

    async fn wait(&mut self) -> Result<ExitInfo, ProcessError>;

    /// Force the process down and reap it.
    async fn kill(&mut self) -> Result<(), ProcessError>;
}

/// Two children joined by a one-way pipe: upstream stdout feeds downstream stdin.
pub struct PipedChildren {
    pub upstream: Box<dyn ManagedChild>,
    pub downstream: Box<dyn ManagedChild>,
}

/**
    Capability for running external tools.

    The prober and the relay only ever talk to this trait, so tests can swap
    in a scripted runner instead of spawning real binaries.
*/
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run a command to completion, killing it if `timeout` elapses first.
    async fn output(
        &self,
        command: &CommandSpec,
        timeout: Duration,
    ) -> Result<CommandOutput, ProcessError>;

    /// Spawn `upstream` with its stdout piped into the stdin of `downstream`.
    fn spawn_piped(
        &self,
        upstream: &CommandSpec,
        downstream: &CommandSpec,
    ) -> Result<PipedChildren, ProcessError>;
}

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use super::{
    CommandOutput, CommandSpec, ExitInfo, ManagedChild, PipedChildren, ProcessError, ProcessRunner,
};

/**
    Runs commands as real child processes on the tokio runtime.
*/
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn output(
        &self,
        command: &CommandSpec,
        timeout: Duration,
    ) -> Result<CommandOutput, ProcessError> {
        tracing::debug!(command = %command, "running");

        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ProcessError::Timeout {
                program: command.program.clone(),
                timeout,
            })??;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn spawn_piped(
        &self,
        upstream: &CommandSpec,
        downstream: &CommandSpec,
    ) -> Result<PipedChildren, ProcessError> {
        tracing::debug!(upstream = %upstream, downstream = %downstream, "spawning pipeline");

        let mut up = Command::new(&upstream.program)
            .args(&upstream.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: upstream.program.clone(),
                source,
            })?;

        let pipe: Stdio = match up.stdout.take() {
            Some(stdout) => stdout.try_into()?,
            None => {
                if let Err(e) = up.start_kill() {
                    tracing::debug!(error = %e, "failed to kill upstream after pipe setup failed");
                }
                return Err(ProcessError::Io(std::io::Error::other(
                    "upstream stdout was not captured",
                )));
            }
        };

        let down = Command::new(&downstream.program)
            .args(&downstream.args)
            .stdin(pipe)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let down = match down {
            Ok(child) => child,
            Err(source) => {
                if let Err(e) = up.start_kill() {
                    tracing::debug!(error = %e, "failed to kill upstream after downstream spawn failed");
                }
                return Err(ProcessError::Spawn {
                    program: downstream.program.clone(),
                    source,
                });
            }
        };

        Ok(PipedChildren {
            upstream: Box::new(SystemChild::new(up, "puller")),
            downstream: Box::new(SystemChild::new(down, "encoder")),
        })
    }
}

/// A real child process with its stderr forwarded into the log.
struct SystemChild {
    child: Child,
    pid: Option<u32>,
}

impl SystemChild {
    fn new(mut child: Child, role: &'static str) -> Self {
        let pid = child.id();
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr, role, pid));
        }
        Self { child, pid }
    }
}

#[async_trait]
impl ManagedChild for SystemChild {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn try_wait(&mut self) -> Result<Option<ExitInfo>, ProcessError> {
        Ok(self
            .child
            .try_wait()?
            .map(|status| ExitInfo { code: status.code() }))
    }

    fn terminate(&mut self) -> Result<(), ProcessError> {
        #[cfg(unix)]
        {
            // Already reaped: nothing to signal.
            let Some(pid) = self.child.id() else {
                return Ok(());
            };
            // SAFETY: plain syscall on a pid we own and have not yet reaped.
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc != 0 {
                return Err(ProcessError::Io(std::io::Error::last_os_error()));
            }
            Ok(())
        }

        #[cfg(not(unix))]
        {
            self.child.start_kill()?;
            Ok(())
        }
    }

    async fn wait(&mut self) -> Result<ExitInfo, ProcessError> {
        let status = self.child.wait().await?;
        Ok(ExitInfo {
            code: status.code(),
        })
    }

    async fn kill(&mut self) -> Result<(), ProcessError> {
        self.child.kill().await?;
        Ok(())
    }
}

async fn forward_stderr(stream: impl AsyncRead + Unpin, role: &'static str, pid: Option<u32>) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => tracing::warn!(process = role, pid, "{}", line.trim_end()),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(process = role, pid, error = %e, "stopped reading stderr");
                break;
            }
        }
    }
}

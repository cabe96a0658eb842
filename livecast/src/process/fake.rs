//! Scripted process runner for tests.
//!
//! Resolver calls pop scripted outputs in order; pipeline spawns pop scripted
//! child behaviours. Everything that happens is appended to an event log so
//! tests can assert on ordering.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

use super::{
    CommandOutput, CommandSpec, ExitInfo, ManagedChild, PipedChildren, ProcessError, ProcessRunner,
};

/// Something the fake observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Run { args: Vec<String> },
    Spawn { upstream: u32, downstream: u32, args: Vec<String> },
    SpawnFailed,
    Terminate(u32),
    Kill(u32),
}

/// Scripted reply to `output`.
#[derive(Debug, Clone)]
pub enum Reply {
    Output(CommandOutput),
    SpawnError,
    Timeout,
    /// Answer with the inner reply after this long, or time out first.
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn stdout(code: i32, stdout: &str) -> Self {
        Reply::Output(CommandOutput {
            code: Some(code),
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    pub fn after(delay: Duration, reply: Reply) -> Self {
        Reply::Delayed(delay, Box::new(reply))
    }

    pub fn stderr(code: i32, stderr: &str) -> Self {
        Reply::Output(CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        })
    }
}

/// How one leg of a spawned pipeline behaves.
#[derive(Debug, Clone, Copy)]
pub struct ChildScript {
    /// Exit on its own after this long, with the given code.
    pub exits_after: Option<(Duration, i32)>,
    /// Ignore SIGTERM; only a kill brings it down.
    pub ignores_terminate: bool,
}

impl ChildScript {
    pub fn healthy() -> Self {
        Self {
            exits_after: None,
            ignores_terminate: false,
        }
    }

    pub fn exits_after(after: Duration, code: i32) -> Self {
        Self {
            exits_after: Some((after, code)),
            ignores_terminate: false,
        }
    }

    pub fn stubborn() -> Self {
        Self {
            exits_after: None,
            ignores_terminate: true,
        }
    }
}

/// Scripted reply to `spawn_piped`.
#[derive(Debug, Clone, Copy)]
pub enum SpawnScript {
    Fail,
    Children {
        upstream: ChildScript,
        downstream: ChildScript,
    },
}

impl SpawnScript {
    pub fn healthy() -> Self {
        SpawnScript::Children {
            upstream: ChildScript::healthy(),
            downstream: ChildScript::healthy(),
        }
    }
}

#[derive(Default)]
struct State {
    replies: VecDeque<Reply>,
    spawns: VecDeque<SpawnScript>,
    events: Vec<(Instant, Event)>,
    next_pid: u32,
    shutdown_after_last_reply: Option<watch::Sender<bool>>,
}

#[derive(Clone, Default)]
pub struct FakeRunner {
    state: Arc<Mutex<State>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, reply: Reply) -> Self {
        self.state.lock().unwrap().replies.push_back(reply);
        self
    }

    pub fn spawn(self, script: SpawnScript) -> Self {
        self.state.lock().unwrap().spawns.push_back(script);
        self
    }

    /// Flip the shutdown flag as soon as the final scripted reply is handed out.
    pub fn shutdown_after_last_reply(self, tx: watch::Sender<bool>) -> Self {
        self.state.lock().unwrap().shutdown_after_last_reply = Some(tx);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.timed_events().into_iter().map(|(_, e)| e).collect()
    }

    pub fn timed_events(&self) -> Vec<(Instant, Event)> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    fn record(state: &Arc<Mutex<State>>, event: Event) {
        state.lock().unwrap().events.push((Instant::now(), event));
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn output(
        &self,
        command: &CommandSpec,
        timeout: Duration,
    ) -> Result<CommandOutput, ProcessError> {
        let mut reply = {
            let mut state = self.state.lock().unwrap();
            state.events.push((
                Instant::now(),
                Event::Run {
                    args: command.args.clone(),
                },
            ));
            let reply = state.replies.pop_front();
            if state.replies.is_empty() {
                if let Some(tx) = state.shutdown_after_last_reply.take() {
                    let _ = tx.send(true);
                }
            }
            reply
        };

        while let Some(Reply::Delayed(delay, inner)) = reply {
            if delay >= timeout {
                tokio::time::sleep(timeout).await;
                reply = Some(Reply::Timeout);
            } else {
                tokio::time::sleep(delay).await;
                reply = Some(*inner);
            }
        }

        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::Timeout) => Err(ProcessError::Timeout {
                program: command.program.clone(),
                timeout,
            }),
            Some(Reply::SpawnError) | Some(Reply::Delayed(..)) | None => Err(ProcessError::Spawn {
                program: command.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted"),
            }),
        }
    }

    fn spawn_piped(
        &self,
        upstream: &CommandSpec,
        downstream: &CommandSpec,
    ) -> Result<PipedChildren, ProcessError> {
        let mut state = self.state.lock().unwrap();
        let script = state.spawns.pop_front().unwrap_or(SpawnScript::Fail);

        let SpawnScript::Children {
            upstream: up_script,
            downstream: down_script,
        } = script
        else {
            state.events.push((Instant::now(), Event::SpawnFailed));
            return Err(ProcessError::Spawn {
                program: downstream.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted"),
            });
        };

        state.next_pid += 2;
        let up_pid = 1000 + state.next_pid - 1;
        let down_pid = 1000 + state.next_pid;

        let mut args = upstream.args.clone();
        args.extend(downstream.args.iter().cloned());
        state.events.push((
            Instant::now(),
            Event::Spawn {
                upstream: up_pid,
                downstream: down_pid,
                args,
            },
        ));

        Ok(PipedChildren {
            upstream: Box::new(FakeChild::new(up_pid, up_script, Arc::clone(&self.state))),
            downstream: Box::new(FakeChild::new(
                down_pid,
                down_script,
                Arc::clone(&self.state),
            )),
        })
    }
}

struct FakeChild {
    pid: u32,
    script: ChildScript,
    spawned_at: Instant,
    exit: Option<ExitInfo>,
    state: Arc<Mutex<State>>,
}

impl FakeChild {
    fn new(pid: u32, script: ChildScript, state: Arc<Mutex<State>>) -> Self {
        Self {
            pid,
            script,
            spawned_at: Instant::now(),
            exit: None,
            state,
        }
    }

    fn poll_exit(&mut self) -> Option<ExitInfo> {
        if self.exit.is_none() {
            if let Some((after, code)) = self.script.exits_after {
                if Instant::now() >= self.spawned_at + after {
                    self.exit = Some(ExitInfo { code: Some(code) });
                }
            }
        }
        self.exit
    }
}

#[async_trait]
impl ManagedChild for FakeChild {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn try_wait(&mut self) -> Result<Option<ExitInfo>, ProcessError> {
        Ok(self.poll_exit())
    }

    fn terminate(&mut self) -> Result<(), ProcessError> {
        FakeRunner::record(&self.state, Event::Terminate(self.pid));
        if !self.script.ignores_terminate && self.poll_exit().is_none() {
            self.exit = Some(ExitInfo { code: None });
        }
        Ok(())
    }

    async fn wait(&mut self) -> Result<ExitInfo, ProcessError> {
        loop {
            if let Some(exit) = self.poll_exit() {
                return Ok(exit);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn kill(&mut self) -> Result<(), ProcessError> {
        FakeRunner::record(&self.state, Event::Kill(self.pid));
        if self.poll_exit().is_none() {
            self.exit = Some(ExitInfo { code: None });
        }
        Ok(())
    }
}

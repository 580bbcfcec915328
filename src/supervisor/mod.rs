//! Host process supervision.
//!
//! The [`Supervisor`] owns the spawned host process. It forwards every
//! output line to the log, reports lifecycle events on a channel, and
//! performs restarts: the old process tree is terminated and reaped
//! before the replacement is spawned.
//!
//! ```text
//! Idle -> Starting -> Running -> (Stopping -> Starting -> Running)* -> Exited
//! ```

pub mod tree;

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::ProcessError;
use crate::util::process::{OutputLines, ProcessBuilder};

use self::tree::terminate_tree;

/// How long a naturally exited process gets to flush its output.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle state of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stopping,
    Exited,
}

impl SupervisorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Starting => "starting",
            SupervisorState::Running => "running",
            SupervisorState::Stopping => "stopping",
            SupervisorState::Exited => "exited",
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output stream of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Something that happened to the supervised process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SupervisorEvent {
    /// A new process was spawned.
    Spawned { generation: u64, pid: Option<u32> },

    /// One non-empty output line, without its line terminator.
    Output {
        generation: u64,
        stream: Stream,
        line: String,
    },

    /// A process exited. `requested` is set when the exit was caused by a
    /// restart or shutdown.
    Exited {
        generation: u64,
        code: Option<i32>,
        requested: bool,
    },
}

/// How a supervision run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The process exited on its own.
    Exited(Option<i32>),
    /// Shutdown was requested.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Restart,
    Shutdown,
}

/// Control handle of a running [`Supervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<SupervisorState>,
}

impl SupervisorHandle {
    /// Request a restart. Returns `false` if the supervisor is gone.
    ///
    /// A request arriving while a restart is in flight is absorbed by it.
    pub fn restart(&self) -> bool {
        self.requests.send(Request::Restart).is_ok()
    }

    /// Request termination of the process and the end of supervision.
    pub fn shutdown(&self) -> bool {
        self.requests.send(Request::Shutdown).is_ok()
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }
}

/// One spawned process.
#[derive(Debug)]
pub struct SupervisedProcess {
    child: Child,
    pid: Option<u32>,
    generation: u64,
    readers: Vec<JoinHandle<()>>,
}

impl SupervisedProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop forwarding output of this process.
    fn detach_output(&mut self) {
        for reader in self.readers.drain(..) {
            reader.abort();
        }
    }

    /// Wait for the output readers to reach end of stream.
    async fn drain_output(&mut self) {
        for reader in self.readers.drain(..) {
            if tokio::time::timeout(DRAIN_TIMEOUT, reader).await.is_err() {
                tracing::debug!("output of exited process still open");
            }
        }
    }
}

enum Step {
    Exited(std::io::Result<ExitStatus>),
    Restart,
    Shutdown,
}

/// Owner of the supervised host process.
#[derive(Debug)]
pub struct Supervisor {
    command: ProcessBuilder,
    label: String,
    timeout: Duration,
    state: SupervisorState,
    state_tx: watch::Sender<SupervisorState>,
    generation: u64,
    current: Option<SupervisedProcess>,
    requests: mpsc::UnboundedReceiver<Request>,
    events: mpsc::UnboundedSender<SupervisorEvent>,
}

impl Supervisor {
    /// Create a supervisor for `command`.
    ///
    /// `timeout` bounds the wait for a terminated process tree before it is
    /// killed.
    pub fn new(
        command: ProcessBuilder,
        label: impl Into<String>,
        timeout: Duration,
    ) -> (Self, SupervisorHandle, mpsc::UnboundedReceiver<SupervisorEvent>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SupervisorState::Idle);

        let supervisor = Supervisor {
            command: command.own_process_group(),
            label: label.into(),
            timeout,
            state: SupervisorState::Idle,
            state_tx,
            generation: 0,
            current: None,
            requests: request_rx,
            events: event_tx,
        };

        let handle = SupervisorHandle {
            requests: request_tx,
            state: state_rx,
        };

        (supervisor, handle, event_rx)
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Generation of the most recently spawned process; 0 before the first.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current(&self) -> Option<&SupervisedProcess> {
        self.current.as_ref()
    }

    fn set_state(&mut self, state: SupervisorState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: SupervisorEvent) {
        // nobody may be listening
        let _ = self.events.send(event);
    }

    /// Spawn a new process. Valid from `Idle` or during a restart.
    pub fn start(&mut self) -> Result<(), ProcessError> {
        if !matches!(self.state, SupervisorState::Idle | SupervisorState::Stopping) {
            return Err(ProcessError::InvalidState {
                action: "start",
                state: self.state.as_str(),
            });
        }

        self.set_state(SupervisorState::Starting);

        let mut cmd = self.command.command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            self.set_state(SupervisorState::Exited);
            ProcessError::Spawn {
                program: self.command.display_command(),
                message: e.to_string(),
            }
        })?;

        self.generation += 1;
        let generation = self.generation;
        let pid = child.id();

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(self.forward_lines(stdout, Stream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(self.forward_lines(stderr, Stream::Stderr));
        }

        self.current = Some(SupervisedProcess {
            child,
            pid,
            generation,
            readers,
        });

        tracing::debug!(unit = %self.label, generation, pid, "spawned");
        self.emit(SupervisorEvent::Spawned { generation, pid });
        self.set_state(SupervisorState::Running);

        Ok(())
    }

    fn forward_lines<R>(&self, reader: R, stream: Stream) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let events = self.events.clone();
        let label = self.label.clone();
        let generation = self.generation;

        tokio::spawn(async move {
            let mut lines = OutputLines::new(reader);
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!(unit = %label, stream = stream.as_str(), "{}", ProcessError::Stream {
                            message: err.to_string(),
                        });
                        break;
                    }
                };

                if line.is_empty() {
                    continue;
                }

                match stream {
                    Stream::Stdout => tracing::info!(unit = %label, stream = "stdout", "{}", line),
                    Stream::Stderr => tracing::warn!(unit = %label, stream = "stderr", "{}", line),
                }

                let _ = events.send(SupervisorEvent::Output {
                    generation,
                    stream,
                    line,
                });
            }
        })
    }

    /// Terminate the current process tree and spawn a replacement.
    ///
    /// Returns `true` when a shutdown was requested while stopping, in
    /// which case no replacement is spawned.
    pub async fn restart(&mut self) -> Result<bool, ProcessError> {
        if self.state != SupervisorState::Running {
            return Err(ProcessError::InvalidState {
                action: "restart",
                state: self.state.as_str(),
            });
        }

        tracing::info!(unit = %self.label, "Restarting...");
        self.set_state(SupervisorState::Stopping);
        self.stop().await;

        // requests that arrived while stopping
        while let Ok(request) = self.requests.try_recv() {
            match request {
                Request::Restart => {
                    tracing::debug!(unit = %self.label, "restart already in flight")
                }
                Request::Shutdown => return Ok(true),
            }
        }

        self.start()?;
        Ok(false)
    }

    async fn stop(&mut self) {
        let Some(mut process) = self.current.take() else {
            return;
        };

        process.detach_output();
        let status = terminate_tree(&mut process.child, self.timeout).await;
        let code = status.and_then(|s| s.code());

        tracing::debug!(unit = %self.label, generation = process.generation, ?code, "stopped");
        self.emit(SupervisorEvent::Exited {
            generation: process.generation,
            code,
            requested: true,
        });
    }

    /// Supervise until the process exits on its own or shutdown is
    /// requested, restarting on request in between.
    pub async fn run(mut self) -> Result<SupervisorExit, ProcessError> {
        if self.state == SupervisorState::Idle {
            self.start()?;
        }

        loop {
            let step = {
                let Some(process) = self.current.as_mut() else {
                    self.set_state(SupervisorState::Exited);
                    return Ok(SupervisorExit::Shutdown);
                };

                tokio::select! {
                    status = process.child.wait() => Step::Exited(status),
                    request = self.requests.recv() => match request {
                        Some(Request::Restart) => Step::Restart,
                        Some(Request::Shutdown) | None => Step::Shutdown,
                    },
                }
            };

            match step {
                Step::Exited(status) => {
                    let code = self.reap(status).await;
                    self.set_state(SupervisorState::Exited);
                    return Ok(SupervisorExit::Exited(code));
                }
                Step::Restart => {
                    if self.restart().await? {
                        self.set_state(SupervisorState::Exited);
                        return Ok(SupervisorExit::Shutdown);
                    }
                }
                Step::Shutdown => {
                    self.set_state(SupervisorState::Stopping);
                    self.stop().await;
                    self.set_state(SupervisorState::Exited);
                    return Ok(SupervisorExit::Shutdown);
                }
            }
        }
    }

    /// Record a natural exit of the current process.
    async fn reap(&mut self, status: std::io::Result<ExitStatus>) -> Option<i32> {
        let Some(mut process) = self.current.take() else {
            return None;
        };

        process.drain_output().await;

        let code = match status {
            Ok(status) => status.code(),
            Err(err) => {
                tracing::error!(unit = %self.label, "{}", ProcessError::Stream {
                    message: err.to_string(),
                });
                None
            }
        };

        match code {
            Some(0) => tracing::info!(unit = %self.label, "Exited with code 0"),
            Some(code) => tracing::error!(unit = %self.label, "Exited with code {}", code),
            None => tracing::error!(unit = %self.label, "Exited by signal"),
        }

        self.emit(SupervisorEvent::Exited {
            generation: process.generation,
            code,
            requested: false,
        });

        code
    }
}

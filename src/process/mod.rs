//! ACP agent process management.
//!
//! Spawns headless agent processes with piped stdio, tracks at most one
//! child per session id, watches for exits, and supports group shutdown.
//! Children are spawned with `kill_on_drop(true)` so nothing outlives the
//! gateway.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::{AppError, Result};

/// Environment variable selecting the built-in mock agent.
pub const USE_MOCK_AGENT_ENV: &str = "USE_MOCK_AGENT";

/// Hidden argv[1] that turns the gateway binary into the mock agent.
pub const MOCK_AGENT_ARG: &str = "mock-agent";

/// Poll cadence for child exit detection.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Emitted when a tracked child exits.
#[derive(Debug, Clone)]
pub struct ProcessExit {
    /// Session the process belonged to.
    pub session_id: String,
    /// Exit code; `None` when the child was killed by a signal.
    pub exit_code: Option<i32>,
}

/// Stdio handles returned to the caller on spawn.
#[derive(Debug)]
pub struct ProcessInfo {
    /// Session the process was launched for.
    pub session_id: String,
    /// OS process id, when available.
    pub pid: Option<u32>,
    /// Agent's stdin for the JSON-RPC writer.
    pub stdin: ChildStdin,
    /// Agent's stdout for the JSON-RPC reader.
    pub stdout: ChildStdout,
}

/// Owner of all agent child processes, keyed by session id.
pub struct ProcessManager {
    agent: AgentConfig,
    children: Arc<Mutex<HashMap<String, Arc<Mutex<Child>>>>>,
    exit_tx: mpsc::Sender<ProcessExit>,
}

impl ProcessManager {
    /// Create a manager; exits of tracked children are reported on the
    /// returned channel.
    #[must_use]
    pub fn new(agent: AgentConfig) -> (Self, mpsc::Receiver<ProcessExit>) {
        let (exit_tx, exit_rx) = mpsc::channel(32);
        (
            Self {
                agent,
                children: Arc::new(Mutex::new(HashMap::new())),
                exit_tx,
            },
            exit_rx,
        )
    }

    /// Spawn the configured agent for a session.
    ///
    /// The working directory is created recursively if missing. At most one
    /// process may exist per session id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the session already has a live child,
    /// the directory cannot be created, or the OS spawn fails.
    pub async fn spawn(&self, session_id: &str, working_dir: &str) -> Result<ProcessInfo> {
        if session_id.is_empty() {
            return Err(AppError::Process("session id must not be empty".into()));
        }

        {
            let children = self.children.lock().await;
            if children.contains_key(session_id) {
                return Err(AppError::Process(format!(
                    "session {session_id} already has an agent process"
                )));
            }
        }

        tokio::fs::create_dir_all(working_dir)
            .await
            .map_err(|err| AppError::Process(format!("failed to create working dir: {err}")))?;

        let (program, args) = self.resolve_command()?;
        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .current_dir(working_dir)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| AppError::Process(format!("failed to spawn agent: {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Process("failed to capture agent stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Process("failed to capture agent stdout".into()))?;

        if let Some(stderr) = child.stderr.take() {
            forward_stderr(session_id.to_owned(), stderr);
        }

        let pid = child.id();
        info!(session_id, pid = ?pid, program = %program, "agent process spawned");

        let handle = Arc::new(Mutex::new(child));
        self.children
            .lock()
            .await
            .insert(session_id.to_owned(), Arc::clone(&handle));

        self.watch_exit(session_id.to_owned(), handle);

        Ok(ProcessInfo {
            session_id: session_id.to_owned(),
            pid,
            stdin,
            stdout,
        })
    }

    /// Terminate the child for a session, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the kill syscall fails.
    pub async fn kill(&self, session_id: &str) -> Result<()> {
        let handle = self.children.lock().await.remove(session_id);
        let Some(handle) = handle else {
            return Ok(());
        };

        let mut child = handle.lock().await;
        match child.kill().await {
            Ok(()) => {
                info!(session_id, "agent process killed");
                Ok(())
            }
            Err(err) => Err(AppError::Process(format!(
                "failed to kill agent process: {err}"
            ))),
        }
    }

    /// Whether a session currently has a live child.
    pub async fn is_alive(&self, session_id: &str) -> bool {
        let handle = {
            let children = self.children.lock().await;
            children.get(session_id).cloned()
        };
        let Some(handle) = handle else {
            return false;
        };
        let mut child = handle.lock().await;
        matches!(child.try_wait(), Ok(None))
    }

    /// Shared handle to a session's child, if tracked.
    ///
    /// The child may already have exited; callers must tolerate `None`
    /// exit codes and closed pipes.
    pub async fn get_process(&self, session_id: &str) -> Option<Arc<Mutex<Child>>> {
        self.children.lock().await.get(session_id).cloned()
    }

    /// Signal every tracked child to terminate (SIGTERM, then a bounded
    /// reap with a force-kill fallback).
    pub async fn kill_all(&self) {
        let drained: Vec<(String, Arc<Mutex<Child>>)> =
            self.children.lock().await.drain().collect();

        for (session_id, handle) in drained {
            let mut child = handle.lock().await;

            #[cfg(unix)]
            if let Some(pid) = child.id() {
                #[allow(clippy::cast_possible_wrap)]
                let pid = nix::unistd::Pid::from_raw(pid as i32);
                if let Err(err) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM) {
                    debug!(session_id, %err, "SIGTERM failed (child likely exited)");
                }
            }
            #[cfg(not(unix))]
            if let Err(err) = child.start_kill() {
                debug!(session_id, %err, "start_kill failed (child likely exited)");
            }

            // Bounded reap so shutdown cannot hang on a stuck child.
            match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
                Ok(Ok(status)) => debug!(session_id, ?status, "agent process reaped"),
                Ok(Err(err)) => warn!(session_id, %err, "error reaping agent process"),
                Err(_) => {
                    warn!(session_id, "agent process ignored SIGTERM, force-killing");
                    if let Err(err) = child.start_kill() {
                        debug!(session_id, %err, "force kill failed");
                    }
                }
            }
        }
    }

    /// Resolve the command line, honoring `USE_MOCK_AGENT`.
    fn resolve_command(&self) -> Result<(String, Vec<String>)> {
        if std::env::var(USE_MOCK_AGENT_ENV).is_ok_and(|v| !v.is_empty() && v != "0") {
            let exe = std::env::current_exe()
                .map_err(|err| AppError::Process(format!("cannot locate own binary: {err}")))?;
            return Ok((
                exe.to_string_lossy().into_owned(),
                vec![MOCK_AGENT_ARG.to_owned()],
            ));
        }
        Ok((self.agent.command.clone(), self.agent.args.clone()))
    }

    /// Poll for child exit, remove the map entry, and report the exit.
    fn watch_exit(&self, session_id: String, handle: Arc<Mutex<Child>>) {
        let children = Arc::clone(&self.children);
        let exit_tx = self.exit_tx.clone();

        tokio::spawn(async move {
            let exit_code = loop {
                {
                    let mut child = handle.lock().await;
                    match child.try_wait() {
                        Ok(Some(status)) => break status.code(),
                        Ok(None) => {}
                        Err(err) => {
                            warn!(session_id, %err, "try_wait failed, stopping exit watch");
                            break None;
                        }
                    }
                }
                tokio::time::sleep(EXIT_POLL_INTERVAL).await;
            };

            // The entry may already be gone if kill()/kill_all() removed it.
            let was_tracked = children.lock().await.remove(&session_id).is_some();
            if was_tracked {
                info!(session_id, ?exit_code, "agent process exited");
                let exit = ProcessExit {
                    session_id: session_id.clone(),
                    exit_code,
                };
                if exit_tx.send(exit).await.is_err() {
                    debug!(session_id, "exit channel closed, dropping exit event");
                }
            }
        });
    }
}

/// Forward agent stderr lines into the log at DEBUG.
fn forward_stderr(session_id: String, stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => debug!(session_id, stderr = line.trim_end(), "agent stderr"),
            }
        }
    });
}

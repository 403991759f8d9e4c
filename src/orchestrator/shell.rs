//! Inline shell command execution (`!<command>`).
//!
//! Runs the command via a shell in the session's working directory and
//! streams stdout/stderr into the session's streaming card as one fenced
//! code block, with a colored footer describing the outcome. Output is
//! ANSI-stripped and capped at 100 KB.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::warn;

use crate::lark::cards;
use crate::lark::events::MessageEvent;
use crate::orchestrator::active::ActiveSession;
use crate::orchestrator::stream::StreamManager;
use crate::orchestrator::{Orchestrator, MSG_NO_SESSION};
use crate::{AppError, Result};

/// Output cap for one shell command.
pub const SHELL_OUTPUT_CAP: usize = 100 * 1024;
/// Marker appended exactly once when the cap is exceeded.
pub const TRUNCATION_MARKER: &str = "\n[Output truncated at 100KB]";
/// Grace period between SIGTERM and SIGKILL on timeout.
const KILL_GRACE: Duration = Duration::from_secs(5);
/// Poll cadence while waiting for the child.
const WAIT_POLL: Duration = Duration::from_millis(100);

/// How a shell command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellOutcome {
    /// Exited with a code.
    Exited(i32),
    /// Terminated by a signal (named, e.g. `TERM`).
    Signalled(String),
}

impl ShellOutcome {
    /// Footer color per outcome.
    #[must_use]
    pub fn color(&self) -> &'static str {
        match self {
            Self::Exited(0) => "green",
            Self::Exited(_) => "red",
            Self::Signalled(_) => "orange",
        }
    }

    /// Footer text: `Ns · Exit: 0` / `Ns · Signal: TERM`.
    #[must_use]
    pub fn footer_text(&self, seconds: u64) -> String {
        match self {
            Self::Exited(code) => format!("{seconds}s · Exit: {code}"),
            Self::Signalled(name) => format!("{seconds}s · Signal: {name}"),
        }
    }

    /// Close summary: `Completed successfully` / `Failed (exit N)` /
    /// `Terminated (X)`.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Exited(0) => "Completed successfully".to_owned(),
            Self::Exited(code) => format!("Failed (exit {code})"),
            Self::Signalled(name) => format!("Terminated ({name})"),
        }
    }
}

/// Strip ANSI escape sequences (CSI and OSC) from shell output.
#[must_use]
pub fn strip_ansi(input: &str) -> String {
    static ANSI_RE: OnceLock<Regex> = OnceLock::new();
    let re = ANSI_RE.get_or_init(|| {
        // CSI sequences, OSC sequences, and stray single-char escapes.
        #[allow(clippy::unwrap_used)] // Pattern is a compile-time constant.
        Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(\x07|\x1b\\)|\x1b.").unwrap()
    });
    re.replace_all(input, "").into_owned()
}

/// Byte budget tracker enforcing the 100 KB cap with a single marker.
#[derive(Debug, Default)]
pub struct OutputCap {
    written: usize,
    truncated: bool,
}

impl OutputCap {
    /// Admit a chunk, returning the text to append (possibly clipped, with
    /// the marker) or `None` once everything further is dropped.
    pub fn admit(&mut self, chunk: &str) -> Option<String> {
        if self.truncated {
            return None;
        }
        if self.written + chunk.len() <= SHELL_OUTPUT_CAP {
            self.written += chunk.len();
            return Some(chunk.to_owned());
        }

        let mut room = SHELL_OUTPUT_CAP - self.written;
        while room > 0 && !chunk.is_char_boundary(room) {
            room -= 1;
        }
        self.truncated = true;
        self.written = SHELL_OUTPUT_CAP;
        Some(format!("{}{TRUNCATION_MARKER}", &chunk[..room]))
    }
}

impl Orchestrator {
    /// `!<command>` — run a shell command inside the session's card.
    pub(crate) async fn handle_shell_command(
        self: &Arc<Self>,
        message: &MessageEvent,
        command_line: &str,
    ) -> Result<()> {
        if command_line.is_empty() {
            self.reply_best_effort(&message.message_id, "用法: !<命令>").await;
            return Ok(());
        }

        let Some(session) = self.resolve_session_for_message(message).await? else {
            self.reply_best_effort(&message.message_id, MSG_NO_SESSION).await;
            return Ok(());
        };

        // The streaming card machinery lives on the active session, so the
        // agent is initialized lazily even for pure shell use.
        let handle = self.ensure_active(&session).await?;

        {
            let mut active = handle.lock().await;
            active.last_prompt_message_id = message.message_id.clone();
            if let Some(message_id) = self.stream.ensure_card(&mut active, &message.message_id).await? {
                if let Err(err) = self
                    .sessions
                    .set_working_message_id(&session.id, Some(&message_id))
                    .await
                {
                    warn!(%err, "failed to persist working_message_id");
                }
            }
            self.stream.append_text(&handle, &mut active, "```\n");
        }

        let child = match spawn_shell(command_line, &session.working_dir) {
            Ok(child) => child,
            Err(err) => {
                let mut active = handle.lock().await;
                if let Err(close_err) = self
                    .stream
                    .close(&mut active, &format!("启动失败: {err}"))
                    .await
                {
                    warn!(%close_err, "failed to close card after spawn failure");
                }
                return Err(err);
            }
        };
        let child = Arc::new(Mutex::new(child));
        handle.lock().await.shell_child = Some(Arc::clone(&child));

        let outcome = self
            .pump_shell(&handle, &child, Duration::from_secs(self.config.timeouts.shell_seconds))
            .await;

        // Finalize the card under the lock.
        let started_secs = outcome.1;
        let outcome = outcome.0;
        {
            let mut active = handle.lock().await;
            active.shell_child = None;

            self.stream.append_text(&handle, &mut active, "\n```");
            if let Err(err) = self.stream.flush(&mut active).await {
                warn!(%err, "failed to flush shell output");
            }
            append_shell_footer(&self.stream, &mut active, &outcome, started_secs).await;

            if let Err(err) = self.stream.close(&mut active, &outcome.summary()).await {
                warn!(%err, "failed to close shell card");
            }
        }
        if let Err(err) = self.sessions.set_working_message_id(&session.id, None).await {
            warn!(%err, "failed to clear working_message_id");
        }

        Ok(())
    }

    /// Stream the child's output into the card and wait for it to finish,
    /// enforcing the timeout with SIGTERM then SIGKILL.
    async fn pump_shell(
        self: &Arc<Self>,
        handle: &Arc<Mutex<ActiveSession>>,
        child: &Arc<Mutex<Child>>,
        timeout: Duration,
    ) -> (ShellOutcome, u64) {
        let started = std::time::Instant::now();
        let cap = Arc::new(Mutex::new(OutputCap::default()));

        let stdout = child.lock().await.stdout.take();
        let stderr = child.lock().await.stderr.take();
        let mut readers = Vec::new();
        if let Some(stdout) = stdout {
            readers.push(spawn_output_reader(
                stdout,
                Arc::clone(&self.stream),
                Arc::clone(handle),
                Arc::clone(&cap),
            ));
        }
        if let Some(stderr) = stderr {
            readers.push(spawn_output_reader(
                stderr,
                Arc::clone(&self.stream),
                Arc::clone(handle),
                Arc::clone(&cap),
            ));
        }

        let deadline = started + timeout;
        let mut timed_out = false;
        let status = loop {
            {
                let mut guard = child.lock().await;
                match guard.try_wait() {
                    Ok(Some(status)) => break Some(status),
                    Ok(None) => {}
                    Err(err) => {
                        warn!(%err, "shell try_wait failed");
                        break None;
                    }
                }
            }

            if !timed_out && std::time::Instant::now() >= deadline {
                timed_out = true;
                terminate_gracefully(child).await;
            } else if timed_out && std::time::Instant::now() >= deadline + KILL_GRACE {
                let mut guard = child.lock().await;
                if let Err(err) = guard.start_kill() {
                    warn!(%err, "shell SIGKILL failed");
                }
            }
            tokio::time::sleep(WAIT_POLL).await;
        };

        for reader in readers {
            let _ = reader.await;
        }

        let seconds = started.elapsed().as_secs();
        let outcome = match status {
            Some(status) => status.code().map_or_else(
                || ShellOutcome::Signalled(exit_signal_name(&status)),
                ShellOutcome::Exited,
            ),
            None => ShellOutcome::Signalled("KILL".to_owned()),
        };
        let outcome = if timed_out && matches!(outcome, ShellOutcome::Signalled(_)) {
            ShellOutcome::Signalled("TERM".to_owned())
        } else {
            outcome
        };

        (outcome, seconds)
    }
}

/// Spawn `sh -c <command>` (or `cmd /C` on Windows) with piped output.
fn spawn_shell(command_line: &str, working_dir: &str) -> Result<Child> {
    #[cfg(unix)]
    let mut cmd = {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(command_line);
        cmd
    };
    #[cfg(not(unix))]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command_line);
        cmd
    };

    cmd.current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cmd.spawn()
        .map_err(|err| AppError::Shell(format!("failed to spawn shell: {err}")))
}

/// Read one output pipe, strip ANSI, enforce the cap, and append to the
/// card under the session lock.
fn spawn_output_reader<R>(
    mut pipe: R,
    stream: Arc<StreamManager>,
    handle: Arc<Mutex<ActiveSession>>,
    cap: Arc<Mutex<OutputCap>>,
) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0_u8; 8192];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let text = strip_ansi(&String::from_utf8_lossy(&buf[..n]));
                    if text.is_empty() {
                        continue;
                    }
                    let admitted = cap.lock().await.admit(&text);
                    if let Some(admitted) = admitted {
                        let mut active = handle.lock().await;
                        stream.append_text(&handle, &mut active, &admitted);
                    }
                }
            }
        }
    })
}

/// Send SIGTERM on unix; elsewhere fall straight through to kill.
async fn terminate_gracefully(child: &Arc<Mutex<Child>>) {
    #[cfg(unix)]
    {
        let pid = child.lock().await.id();
        if let Some(pid) = pid {
            #[allow(clippy::cast_possible_wrap)]
            let pid = nix::unistd::Pid::from_raw(pid as i32);
            if let Err(err) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM) {
                warn!(%err, "SIGTERM failed");
            }
            return;
        }
    }

    let mut guard = child.lock().await;
    if let Err(err) = guard.start_kill() {
        warn!(%err, "fallback kill failed");
    }
}

/// Name of the signal that terminated a child.
fn exit_signal_name(status: &std::process::ExitStatus) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return match signal {
                2 => "INT".to_owned(),
                9 => "KILL".to_owned(),
                15 => "TERM".to_owned(),
                11 => "SEGV".to_owned(),
                1 => "HUP".to_owned(),
                other => format!("SIG{other}"),
            };
        }
    }
    let _ = status;
    "UNKNOWN".to_owned()
}

/// Insert the colored footer element before the processing indicator.
async fn append_shell_footer(
    stream: &Arc<StreamManager>,
    active: &mut ActiveSession,
    outcome: &ShellOutcome,
    seconds: u64,
) {
    let color = outcome.color();
    let text = outcome.footer_text(seconds);
    if let Err(err) = stream
        .insert_element(active, |id| cards::shell_footer_element(id, color, &text))
        .await
    {
        warn!(%err, "failed to append shell footer");
    }
}

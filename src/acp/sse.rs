//! SSE transport pump for agents reached over HTTP.
//!
//! The readable side consumes an `event:`/`data:` stream; each complete
//! `data:` payload is one JSON-RPC message. Writes POST the serialized
//! message to the paired send URL.
//!
//! Per-connection rules:
//! - heartbeat watchdog: if no bytes arrive for `heartbeat_timeout`, the
//!   reader cancels the request and reconnects;
//! - on disconnect, exponential backoff `min(base * 2^attempt, 30s)`,
//!   retried forever unless `max_retries` is set;
//! - writes retry up to 3 times on network errors and 5xx responses.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Base delay for the reconnect backoff.
const BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Ceiling for the reconnect backoff.
const BACKOFF_MAX: Duration = Duration::from_secs(30);
/// Write attempts before a send fails.
const WRITE_ATTEMPTS: u32 = 3;
/// Channel depth for the outbound line queue.
const OUTBOUND_CAPACITY: usize = 64;

/// Settings for one SSE connection.
#[derive(Debug, Clone)]
pub struct SseConfig {
    /// URL of the event stream.
    pub events_url: String,
    /// URL JSON-RPC messages are POSTed to.
    pub send_url: String,
    /// Idle window before the reader reconnects.
    pub heartbeat_timeout: Duration,
    /// Maximum reconnect attempts; `None` retries forever.
    pub max_retries: Option<u32>,
}

/// Pump an SSE connection into line channels.
///
/// Returns `(line_tx, line_rx)` suitable for
/// [`super::jsonrpc::JsonRpcClient::new`]. The reader task owns the
/// reconnect loop; the writer task drains `line_tx` into POSTs against
/// `send_url`. Both exit when `cancel` fires; the reader also closes the
/// inbound channel when `max_retries` is exhausted.
#[must_use]
pub fn sse_transport(
    http: reqwest::Client,
    config: SseConfig,
    cancel: CancellationToken,
) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    let (in_tx, in_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);

    // Writer task: POST each outbound message with bounded retries.
    let writer_http = http.clone();
    let writer_config = config.clone();
    let writer_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = writer_cancel.cancelled() => break,
                line = out_rx.recv() => {
                    let Some(line) = line else { break };
                    if let Err(err) = post_message(&writer_http, &writer_config.send_url, &line).await {
                        warn!(%err, "sse write failed after retries");
                    }
                }
            }
        }
    });

    // Reader task: reconnect loop with heartbeat watchdog.
    tokio::spawn(async move {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }

            match read_stream(&http, &config, &in_tx, &cancel).await {
                Ok(StreamEnd::Cancelled) => break,
                Ok(StreamEnd::Disconnected) => {
                    // A healthy connection existed; restart the backoff.
                    attempt = 0;
                }
                Err(err) => {
                    warn!(%err, attempt, "sse connect failed");
                }
            }

            attempt = attempt.saturating_add(1);
            if let Some(max) = config.max_retries {
                if attempt > max {
                    warn!(max, "sse retries exhausted, giving up");
                    break;
                }
            }

            let delay = backoff_delay(attempt);
            debug!(?delay, attempt, "sse reconnecting after backoff");
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
        // Dropping in_tx closes the inbound channel.
    });

    (out_tx, in_rx)
}

/// Compute the reconnect delay for the given attempt.
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.min(31);
    BACKOFF_BASE
        .saturating_mul(2_u32.saturating_pow(exp))
        .min(BACKOFF_MAX)
}

enum StreamEnd {
    Cancelled,
    Disconnected,
}

async fn read_stream(
    http: &reqwest::Client,
    config: &SseConfig,
    in_tx: &mpsc::Sender<String>,
    cancel: &CancellationToken,
) -> Result<StreamEnd> {
    let response = http
        .get(&config.events_url)
        .header("Accept", "text/event-stream")
        .send()
        .await
        .map_err(|err| AppError::Acp(format!("sse connect: {err}")))?;

    if !response.status().is_success() {
        return Err(AppError::Acp(format!(
            "sse connect: status {}",
            response.status()
        )));
    }

    info!(url = %config.events_url, "sse stream connected");

    let mut stream = response.bytes_stream();
    let mut parser = SseParser::default();

    loop {
        let chunk = tokio::select! {
            () = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            chunk = tokio::time::timeout(config.heartbeat_timeout, stream.next()) => chunk,
        };

        match chunk {
            Err(_elapsed) => {
                warn!(
                    timeout = ?config.heartbeat_timeout,
                    "sse heartbeat timeout, reconnecting"
                );
                return Ok(StreamEnd::Disconnected);
            }
            Ok(None) => {
                debug!("sse stream closed by server");
                return Ok(StreamEnd::Disconnected);
            }
            Ok(Some(Err(err))) => {
                warn!(%err, "sse stream read error");
                return Ok(StreamEnd::Disconnected);
            }
            Ok(Some(Ok(bytes))) => {
                for payload in parser.push(&bytes) {
                    if in_tx.send(payload).await.is_err() {
                        return Ok(StreamEnd::Cancelled);
                    }
                }
            }
        }
    }
}

async fn post_message(http: &reqwest::Client, send_url: &str, line: &str) -> Result<()> {
    let mut last_err = String::new();

    for attempt in 1..=WRITE_ATTEMPTS {
        match http
            .post(send_url)
            .header("Content-Type", "application/json")
            .body(line.to_owned())
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) if resp.status().is_server_error() => {
                last_err = format!("status {}", resp.status());
            }
            Ok(resp) => {
                // 4xx is not retryable.
                return Err(AppError::Acp(format!(
                    "sse send rejected: status {}",
                    resp.status()
                )));
            }
            Err(err) => {
                last_err = err.to_string();
            }
        }
        debug!(attempt, %last_err, "sse send retrying");
    }

    Err(AppError::Acp(format!(
        "sse send failed after {WRITE_ATTEMPTS} attempts: {last_err}"
    )))
}

/// Incremental `event:`/`data:` stream parser.
///
/// Accumulates bytes until a blank line terminates the event, then yields
/// the joined `data:` payload. Comment lines (`:`) and `event:` names are
/// consumed but not surfaced; the payloads are complete JSON-RPC messages
/// regardless of event name.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    data_lines: Vec<String>,
}

impl SseParser {
    /// Feed raw bytes, returning every complete event payload they finish.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut complete = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data_lines.is_empty() {
                    complete.push(self.data_lines.join("\n"));
                    self.data_lines.clear();
                }
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data_lines.push(data.trim_start().to_owned());
            }
            // `event:` names, `id:` fields, and comments are skipped.
        }

        complete
    }
}

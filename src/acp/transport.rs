//! Stdio transport pump for agent child processes.
//!
//! Bridges the child's stdin/stdout byte streams to the line channels the
//! [`super::jsonrpc::JsonRpcClient`] consumes. Inbound framing goes
//! through [`LinesCodec`] with a 1 MiB cap, which bounds the decode buffer
//! incrementally — an unterminated line from a misbehaving agent fails at
//! the cap instead of growing in memory until a newline shows up.

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Maximum accepted line length on the inbound stream: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Channel depth for the outbound line queue.
const OUTBOUND_CAPACITY: usize = 64;

/// Pump a child's stdio into line channels.
///
/// Returns `(line_tx, line_rx)` suitable for
/// [`super::jsonrpc::JsonRpcClient::new`]. Two tasks are spawned:
///
/// - a writer draining `line_tx` into the child's stdin, one `\n`-terminated
///   message per line;
/// - a reader framing stdout through a capped [`LinesCodec`]; an oversized
///   line is discarded up to its next newline, and the channel closes on
///   EOF.
///
/// Both tasks exit when `cancel` fires.
#[must_use]
pub fn stdio_transport(
    stdin: ChildStdin,
    stdout: ChildStdout,
    cancel: CancellationToken,
) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    let (in_tx, in_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);

    // Writer task.
    let writer_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut stdin = stdin;
        loop {
            tokio::select! {
                () = writer_cancel.cancelled() => break,
                line = out_rx.recv() => {
                    let Some(line) = line else { break };
                    if let Err(err) = write_line(&mut stdin, &line).await {
                        warn!(%err, "agent stdin write failed, stopping writer");
                        break;
                    }
                }
            }
        }
    });

    // Reader task.
    tokio::spawn(async move {
        let mut framed = FramedRead::new(stdout, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                item = framed.next() => {
                    match item {
                        None => {
                            debug!("agent stdout EOF");
                            break;
                        }
                        Some(Ok(line)) => {
                            if in_tx.send(line).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                            // The codec discards the rest of the oversized
                            // line; framing resumes at the next newline.
                            warn!(limit = MAX_LINE_BYTES, "agent line exceeds cap, dropping");
                        }
                        Some(Err(LinesCodecError::Io(err))) => {
                            warn!(%err, "agent stdout read failed");
                            break;
                        }
                    }
                }
            }
        }
        // Dropping in_tx closes the inbound channel, failing pending calls.
    });

    (out_tx, in_rx)
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

//! Native-messaging relay between the browser and the IPC broker
//!
//! The browser spawns this process when the extension opens its native
//! port. It converts between the two frame dialects:
//!
//! - standard input carries native-dialect frames (little-endian, 1 MiB cap)
//!   from the extension; each payload is forwarded verbatim to the broker as
//!   a `response` envelope;
//! - every `command` envelope received from the broker is written to
//!   standard output as a native-dialect frame.
//!
//! Standard output belongs to the native-messaging transport, so all
//! diagnostics go to standard error. Outbound stdout writes are serialized
//! through a single writer task: under backpressure, two concurrent
//! commands must never interleave their frame bytes.
//!
//! # Failure taxonomy
//!
//! - Framing error on stdin: skip that message, keep running.
//! - Framing error on the IPC side: close the connection and exit; the
//!   browser respawns the relay on the next port open.
//! - Any stdout write failure: fatal, with a brief grace delay so stderr
//!   can flush.
//! - stdin EOF: close the IPC client and exit cleanly.
//! - IPC liveness is polled at a 1 s cadence; on loss the relay exits
//!   cleanly.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::codec::{FrameCodec, FrameDialect};
use crate::error::{AgentfoxError, Result};
use crate::protocol::IpcEnvelope;

/// Cadence of the IPC liveness poll.
const LIVENESS_POLL: Duration = Duration::from_secs(1);

/// Grace delay before exiting on a fatal stdout error, so stderr flushes.
const FATAL_EXIT_GRACE: Duration = Duration::from_millis(100);

/// Bridge the given stdio pair to the broker endpoint at `socket_path`.
///
/// Generic over the stream types so tests can drive it with in-memory
/// duplex pipes. Returns `Ok(())` on a clean exit (stdin EOF or broker
/// gone) and an error on a fatal stdout write failure.
///
/// # Errors
///
/// Returns [`AgentfoxError::BrokerUnreachable`] when the endpoint cannot be
/// reached and [`AgentfoxError::Io`] for a fatal stdout failure.
pub async fn run_relay<I, O>(stdin: I, stdout: O, socket_path: &Path) -> Result<()>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin + Send + 'static,
{
    let socket = UnixStream::connect(socket_path).await.map_err(|e| {
        AgentfoxError::BrokerUnreachable(format!("{} ({})", socket_path.display(), e))
    })?;
    tracing::info!("relay connected to {}", socket_path.display());
    run_relay_on(stdin, stdout, socket).await
}

/// The relay loop over an already-connected broker stream.
async fn run_relay_on<I, O>(mut stdin: I, stdout: O, socket: UnixStream) -> Result<()>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin + Send + 'static,
{
    let (mut sock_read, mut sock_write) = socket.into_split();

    let fatal = CancellationToken::new();

    // Single-producer queue for stdout: the writer task is the only place
    // that touches the stream, so concurrent commands cannot interleave.
    let (stdout_tx, mut stdout_rx) = mpsc::unbounded_channel::<Bytes>();
    let stdout_fatal = fatal.clone();
    let stdout_task = tokio::spawn(async move {
        let mut stdout = stdout;
        while let Some(frame) = stdout_rx.recv().await {
            if let Err(e) = stdout.write_all(&frame).await {
                tracing::error!("stdout write failed: {}", e);
                stdout_fatal.cancel();
                return Err(e);
            }
            if let Err(e) = stdout.flush().await {
                tracing::error!("stdout flush failed: {}", e);
                stdout_fatal.cancel();
                return Err(e);
            }
        }
        Ok(())
    });

    let mut stdin_codec = FrameCodec::new(FrameDialect::Native);
    let native_encoder = FrameCodec::new(FrameDialect::Native);
    let mut sock_codec = FrameCodec::new(FrameDialect::Ipc);
    let ipc_encoder = FrameCodec::new(FrameDialect::Ipc);

    let mut stdin_buf = vec![0u8; 64 * 1024];
    let mut sock_buf = vec![0u8; 64 * 1024];
    // Bytes still to discard after an oversized stdin frame was skipped.
    let mut stdin_discard: usize = 0;
    let mut liveness = tokio::time::interval(LIVENESS_POLL);
    let mut socket_alive = true;

    let exit = loop {
        tokio::select! {
            _ = fatal.cancelled() => {
                // Fatal stdout failure; give stderr a moment to flush.
                tokio::time::sleep(FATAL_EXIT_GRACE).await;
                break Err(AgentfoxError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "native-messaging stdout write failed",
                ))
                .into());
            }

            _ = liveness.tick() => {
                if !socket_alive {
                    tracing::info!("broker link lost; relay exiting");
                    break Ok(());
                }
            }

            read = stdin.read(&mut stdin_buf) => match read {
                Ok(0) => {
                    tracing::info!("stdin closed; relay exiting");
                    break Ok(());
                }
                Ok(n) => {
                    let mut chunk = &stdin_buf[..n];
                    if stdin_discard > 0 {
                        let eat = stdin_discard.min(chunk.len());
                        stdin_discard -= eat;
                        chunk = &chunk[eat..];
                        if chunk.is_empty() {
                            continue;
                        }
                    }
                    match stdin_codec.push(chunk) {
                        Ok(payloads) => {
                            for payload in payloads {
                                forward_to_broker(payload, &ipc_encoder, &mut sock_write).await;
                            }
                        }
                        Err(e) => {
                            // Skip the offending message; never crash on a
                            // bad frame from the extension.
                            if let Some(AgentfoxError::FrameTooLarge { size, .. }) =
                                e.downcast_ref::<AgentfoxError>()
                            {
                                let pending = 4 + *size;
                                stdin_discard = pending.saturating_sub(stdin_codec.buffered());
                                stdin_codec.reset();
                            }
                            tracing::warn!("skipping malformed native message: {}", e);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("stdin read failed: {}", e);
                    break Ok(());
                }
            },

            read = sock_read.read(&mut sock_buf), if socket_alive => match read {
                Ok(0) => {
                    socket_alive = false;
                }
                Ok(n) => {
                    match sock_codec.push(&sock_buf[..n]) {
                        Ok(messages) => {
                            for message in messages {
                                handle_broker_message(
                                    message,
                                    &native_encoder,
                                    &ipc_encoder,
                                    &stdout_tx,
                                    &mut sock_write,
                                )
                                .await;
                            }
                        }
                        Err(e) => {
                            // A framing violation on the IPC side kills the
                            // relay; the browser will respawn it.
                            tracing::error!("broker framing violation: {}", e);
                            break Ok(());
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("broker read failed: {}", e);
                    socket_alive = false;
                }
            },
        }
    };

    // Closing our half tells the broker we are gone; dropping the stdout
    // sender lets the writer task drain and finish.
    let _ = sock_write.shutdown().await;
    drop(stdout_tx);
    let _ = stdout_task.await;
    exit
}

/// Wrap one native payload as a `response` envelope and write it to the
/// broker.
async fn forward_to_broker(
    payload: Value,
    ipc_encoder: &FrameCodec,
    sock_write: &mut tokio::net::unix::OwnedWriteHalf,
) {
    let envelope = match payload {
        Value::Object(mut map) => {
            map.insert("type".to_string(), Value::String("response".to_string()));
            Value::Object(map)
        }
        other => {
            tracing::warn!("dropping non-object native message: {}", other);
            return;
        }
    };
    match ipc_encoder.encode_frame(&envelope) {
        Ok(frame) => {
            if let Err(e) = sock_write.write_all(&frame).await {
                tracing::warn!("broker write failed: {}", e);
            }
        }
        Err(e) => tracing::warn!("cannot encode response envelope: {}", e),
    }
}

/// Dispatch one envelope from the broker.
async fn handle_broker_message(
    message: Value,
    native_encoder: &FrameCodec,
    ipc_encoder: &FrameCodec,
    stdout_tx: &mpsc::UnboundedSender<Bytes>,
    sock_write: &mut tokio::net::unix::OwnedWriteHalf,
) {
    match serde_json::from_value::<IpcEnvelope>(message) {
        Ok(IpcEnvelope::Command(command)) => match serde_json::to_value(&command) {
            Ok(value) => match native_encoder.encode_frame(&value) {
                Ok(frame) => {
                    let _ = stdout_tx.send(frame);
                }
                Err(e) => tracing::warn!("command {} too large for native frame: {}", command.id, e),
            },
            Err(e) => tracing::warn!("cannot serialize command: {}", e),
        },
        Ok(IpcEnvelope::Ping) => {
            if let Ok(frame) = ipc_encoder.encode_frame(&serde_json::json!({"type": "pong"})) {
                if let Err(e) = sock_write.write_all(&frame).await {
                    tracing::warn!("broker write failed: {}", e);
                }
            }
        }
        Ok(IpcEnvelope::Pong) => {}
        Ok(IpcEnvelope::Response(response)) => {
            tracing::debug!("ignoring response envelope from broker: {}", response.id);
        }
        Err(e) => {
            tracing::warn!("unrecognized broker envelope: {}", e);
        }
    }
}

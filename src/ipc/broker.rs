//! Single-client stream-socket broker with correlation-ID multiplexing
//!
//! [`IpcBroker`] owns the local socket endpoint the browser relay connects
//! to. It accepts exactly one client at a time, frames every message in the
//! IPC dialect, tracks in-flight commands in a pending table keyed by
//! correlation ID, and keeps the link alive with ping/pong heartbeats.
//!
//! # Lifecycle
//!
//! - Start: unlink any stale endpoint file, bind, listen. Bind errors are
//!   fatal; everything after that is survivable.
//! - Attach: mark has-ever-connected, start a fresh frame decoder for the
//!   connection, emit [`BrokerEvent::ClientConnected`], begin heartbeats.
//! - Inbound frames: `response` fulfils the matching pending entry (late or
//!   unknown IDs are dropped with a debug log), `ping` is answered with
//!   `pong`, `pong` clears the outstanding-pong flag.
//! - Detach: heartbeats stop, every pending entry rejects with a disconnect
//!   error, [`BrokerEvent::ClientDisconnected`] is emitted.
//!
//! A framing violation (oversized or undecodable frame) kills the offending
//! connection without losing the server; the next relay the browser spawns
//! can attach cleanly.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::{FrameCodec, FrameDialect};
use crate::error::{AgentfoxError, Result};
use crate::protocol::{Command, CommandResponse, IpcEnvelope};

/// Default per-command timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between heartbeat pings.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Default grace period for the answering pong.
pub const DEFAULT_HEARTBEAT_GRACE: Duration = Duration::from_secs(5);

/// Broker tuning knobs.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Filesystem path of the stream-socket endpoint.
    pub socket_path: PathBuf,
    /// How long a submitted command may wait for its response.
    pub command_timeout: Duration,
    /// Interval between heartbeat pings while a client is attached.
    pub heartbeat_interval: Duration,
    /// How long a ping may go unanswered before the client is declared dead.
    pub heartbeat_grace: Duration,
}

impl BrokerConfig {
    /// Config with default timings for the given endpoint path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_grace: DEFAULT_HEARTBEAT_GRACE,
        }
    }
}

/// Connection lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// A relay attached to the endpoint.
    ClientConnected,
    /// The attached relay went away (EOF, error, framing violation, or
    /// heartbeat loss).
    ClientDisconnected,
    /// A survivable runtime socket error.
    Error(String),
}

type PendingMap = HashMap<String, oneshot::Sender<CommandResponse>>;

/// Handle to the single attached connection.
struct ConnHandle {
    seq: u64,
    writer: mpsc::UnboundedSender<Bytes>,
    shutdown: CancellationToken,
}

struct Shared {
    config: BrokerConfig,
    pending: Mutex<PendingMap>,
    conn: Mutex<Option<ConnHandle>>,
    conn_seq: AtomicU64,
    has_ever_connected: AtomicBool,
    connected_tx: watch::Sender<bool>,
    connected_rx: watch::Receiver<bool>,
    events: broadcast::Sender<BrokerEvent>,
}

/// Single-client stream-socket server correlating commands with responses.
///
/// # Examples
///
/// ```no_run
/// use agentfox::ipc::{BrokerConfig, IpcBroker};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let broker = IpcBroker::start(BrokerConfig::new("/tmp/agentfox-demo.sock"))?;
/// broker.wait_for_connection(Duration::from_secs(5)).await?;
/// # Ok(())
/// # }
/// ```
pub struct IpcBroker {
    shared: Arc<Shared>,
    accept_task: JoinHandle<()>,
}

impl IpcBroker {
    /// Bind the endpoint and start accepting.
    ///
    /// Any stale endpoint file left by a previous instance is unlinked
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`AgentfoxError::Socket`] when the endpoint cannot be bound;
    /// startup socket errors are fatal to start.
    pub fn start(config: BrokerConfig) -> Result<Self> {
        if let Some(parent) = config.socket_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AgentfoxError::Socket(format!(
                        "cannot create socket directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        match std::fs::remove_file(&config.socket_path) {
            Ok(()) => tracing::debug!("removed stale socket {}", config.socket_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(AgentfoxError::Socket(format!(
                    "cannot unlink stale socket {}: {}",
                    config.socket_path.display(),
                    e
                ))
                .into())
            }
        }

        let listener = UnixListener::bind(&config.socket_path).map_err(|e| {
            AgentfoxError::Socket(format!(
                "cannot bind {}: {}",
                config.socket_path.display(),
                e
            ))
        })?;
        tracing::info!("broker listening on {}", config.socket_path.display());

        let (connected_tx, connected_rx) = watch::channel(false);
        let (events, _) = broadcast::channel(32);
        let shared = Arc::new(Shared {
            config,
            pending: Mutex::new(HashMap::new()),
            conn: Mutex::new(None),
            conn_seq: AtomicU64::new(0),
            has_ever_connected: AtomicBool::new(false),
            connected_tx,
            connected_rx,
            events,
        });

        let accept_shared = Arc::clone(&shared);
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => accept_client(&accept_shared, stream).await,
                    Err(e) => {
                        tracing::warn!("accept error: {}", e);
                        let _ = accept_shared
                            .events
                            .send(BrokerEvent::Error(format!("accept error: {}", e)));
                    }
                }
            }
        });

        Ok(Self {
            shared,
            accept_task,
        })
    }

    /// Whether a relay is currently attached.
    pub async fn connected(&self) -> bool {
        self.shared.conn.lock().await.is_some()
    }

    /// Whether a relay has ever attached during this broker's lifetime.
    pub fn has_ever_connected(&self) -> bool {
        self.shared.has_ever_connected.load(Ordering::SeqCst)
    }

    /// Subscribe to connection lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<BrokerEvent> {
        self.shared.events.subscribe()
    }

    /// Await the first (or next) attachment.
    ///
    /// Resolves immediately when a client is already attached.
    ///
    /// # Errors
    ///
    /// Returns [`AgentfoxError::ExtensionNotConnected`] or
    /// [`AgentfoxError::ExtensionDisconnected`] (depending on whether a
    /// client was ever attached) when the timeout elapses.
    pub async fn wait_for_connection(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.shared.connected_rx.clone();
        let result = tokio::time::timeout(timeout, rx.wait_for(|connected| *connected)).await;
        match result {
            Ok(Ok(_)) => Ok(()),
            _ => Err(self.absence_error().into()),
        }
    }

    /// The lifecycle error describing why no client is attached.
    fn absence_error(&self) -> AgentfoxError {
        if self.has_ever_connected() {
            AgentfoxError::ExtensionDisconnected
        } else {
            AgentfoxError::ExtensionNotConnected
        }
    }

    /// Submit a command and await its correlated response.
    ///
    /// The caller supplies the correlation ID. A pending entry is installed
    /// before the frame is written so the response can never race the
    /// registration; the entry resolves exactly once, through the matching
    /// response, the per-command timeout, or a disconnect.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error when no client is attached,
    /// [`AgentfoxError::CommandTimeout`] on expiry (the pending entry is
    /// removed before the rejection, so a late reply is dropped), and
    /// [`AgentfoxError::ExtensionDisconnected`] when the client detaches
    /// while the command is in flight.
    pub async fn send_command(&self, command: Command) -> Result<CommandResponse> {
        let id = command.id.clone();
        let writer = {
            let conn = self.shared.conn.lock().await;
            match conn.as_ref() {
                Some(handle) => handle.writer.clone(),
                None => return Err(self.absence_error().into()),
            }
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().await;
            pending.insert(id.clone(), tx);
        }

        let frame = FrameCodec::new(FrameDialect::Ipc)
            .encode_frame(&serde_json::to_value(IpcEnvelope::Command(command))?)?;
        if writer.send(frame).is_err() {
            self.shared.pending.lock().await.remove(&id);
            return Err(AgentfoxError::ExtensionDisconnected.into());
        }

        let deadline = self.shared.config.command_timeout;
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(AgentfoxError::ExtensionDisconnected.into()),
            Err(_) => {
                // Remove the entry first so a late reply finds nothing to
                // fulfil and is dropped by the dispatch path.
                self.shared.pending.lock().await.remove(&id);
                Err(AgentfoxError::CommandTimeout {
                    id,
                    seconds: deadline.as_secs(),
                }
                .into())
            }
        }
    }

    /// The configured per-command timeout.
    pub fn command_timeout(&self) -> Duration {
        self.shared.config.command_timeout
    }

    /// Stop accepting, drop the current connection, reject all pending
    /// commands, and unlink the endpoint file.
    pub async fn close(&self) {
        self.accept_task.abort();
        let handle = self.shared.conn.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown.cancel();
        }
        reject_pending(&self.shared).await;
        let _ = self.shared.connected_tx.send(false);
        let _ = std::fs::remove_file(&self.shared.config.socket_path);
    }
}

impl Drop for IpcBroker {
    fn drop(&mut self) {
        self.accept_task.abort();
        let _ = std::fs::remove_file(&self.shared.config.socket_path);
    }
}

/// Drop every pending entry; receivers observe the disconnect.
async fn reject_pending(shared: &Arc<Shared>) {
    let mut pending = shared.pending.lock().await;
    if !pending.is_empty() {
        tracing::debug!("rejecting {} pending command(s)", pending.len());
    }
    pending.clear();
}

/// Handle one incoming connection attempt.
async fn accept_client(shared: &Arc<Shared>, stream: UnixStream) {
    {
        let mut conn = shared.conn.lock().await;
        if conn.is_some() {
            // Single-tenant endpoint: surplus connections are dropped
            // immediately, closing the stream.
            tracing::warn!("rejecting second concurrent client connection");
            drop(stream);
            return;
        }

        let seq = shared.conn_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let shutdown = CancellationToken::new();
        let pong_outstanding = Arc::new(AtomicBool::new(false));
        let (writer_tx, writer_rx) = mpsc::unbounded_channel::<Bytes>();

        *conn = Some(ConnHandle {
            seq,
            writer: writer_tx.clone(),
            shutdown: shutdown.clone(),
        });

        shared.has_ever_connected.store(true, Ordering::SeqCst);
        let _ = shared.connected_tx.send(true);
        let _ = shared.events.send(BrokerEvent::ClientConnected);
        tracing::info!("relay attached (connection #{})", seq);

        let (read_half, write_half) = stream.into_split();
        tokio::spawn(writer_loop(write_half, writer_rx, shutdown.clone()));
        tokio::spawn(heartbeat_loop(
            Arc::clone(shared),
            writer_tx.clone(),
            Arc::clone(&pong_outstanding),
            shutdown.clone(),
        ));
        tokio::spawn(reader_loop(
            Arc::clone(shared),
            read_half,
            writer_tx,
            pong_outstanding,
            shutdown,
            seq,
        ));
    }
}

/// Serialize all outbound frames through one writer task.
async fn writer_loop(
    mut write_half: tokio::net::unix::OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = write_half.write_all(&frame).await {
                        tracing::warn!("socket write failed: {}", e);
                        shutdown.cancel();
                        break;
                    }
                }
                None => break,
            },
        }
    }
    let _ = write_half.shutdown().await;
}

/// Emit pings on the configured cadence and enforce the pong grace period.
async fn heartbeat_loop(
    shared: Arc<Shared>,
    writer: mpsc::UnboundedSender<Bytes>,
    pong_outstanding: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    let codec = FrameCodec::new(FrameDialect::Ipc);
    let ping = match codec.encode_frame(&serde_json::json!({"type": "ping"})) {
        Ok(frame) => frame,
        Err(_) => return,
    };
    let mut interval = tokio::time::interval(shared.config.heartbeat_interval);
    interval.tick().await; // the first tick fires immediately; skip it
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }
        if pong_outstanding.load(Ordering::SeqCst) {
            continue;
        }
        pong_outstanding.store(true, Ordering::SeqCst);
        if writer.send(ping.clone()).is_err() {
            return;
        }
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(shared.config.heartbeat_grace) => {
                if pong_outstanding.load(Ordering::SeqCst) {
                    tracing::warn!("no pong within grace period; dropping client");
                    shutdown.cancel();
                    return;
                }
            }
        }
    }
}

/// Read frames, dispatch by envelope tag, and run the disconnect path on
/// exit.
async fn reader_loop(
    shared: Arc<Shared>,
    mut read_half: tokio::net::unix::OwnedReadHalf,
    writer: mpsc::UnboundedSender<Bytes>,
    pong_outstanding: Arc<AtomicBool>,
    shutdown: CancellationToken,
    seq: u64,
) {
    // One decoder per connection: attachment always starts from a clean
    // framing state.
    let mut decoder = FrameCodec::new(FrameDialect::Ipc);
    let mut chunk = vec![0u8; 64 * 1024];

    loop {
        let n = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = read_half.read(&mut chunk) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("socket read failed: {}", e);
                    let _ = shared.events.send(BrokerEvent::Error(format!("read error: {}", e)));
                    break;
                }
            },
        };

        let messages = match decoder.push(&chunk[..n]) {
            Ok(messages) => messages,
            Err(e) => {
                // Framing violation: kill this connection, keep the server.
                tracing::warn!("framing violation from relay: {}", e);
                let _ = shared
                    .events
                    .send(BrokerEvent::Error(format!("framing violation: {}", e)));
                break;
            }
        };

        for message in messages {
            match serde_json::from_value::<IpcEnvelope>(message) {
                Ok(IpcEnvelope::Response(response)) => {
                    let entry = shared.pending.lock().await.remove(&response.id);
                    match entry {
                        Some(tx) => {
                            let _ = tx.send(response);
                        }
                        None => {
                            tracing::debug!(
                                "dropping response for unknown or expired id {}",
                                response.id
                            );
                        }
                    }
                }
                Ok(IpcEnvelope::Ping) => {
                    let codec = FrameCodec::new(FrameDialect::Ipc);
                    if let Ok(frame) = codec.encode_frame(&serde_json::json!({"type": "pong"})) {
                        let _ = writer.send(frame);
                    }
                }
                Ok(IpcEnvelope::Pong) => {
                    pong_outstanding.store(false, Ordering::SeqCst);
                }
                Ok(IpcEnvelope::Command(command)) => {
                    tracing::debug!("ignoring inbound command envelope {}", command.id);
                }
                Err(e) => {
                    tracing::warn!("unrecognized envelope: {}", e);
                    let _ = shared
                        .events
                        .send(BrokerEvent::Error(format!("bad envelope: {}", e)));
                    shutdown.cancel();
                }
            }
        }
        if shutdown.is_cancelled() {
            break;
        }
    }

    shutdown.cancel();

    // Disconnect path: detach (only if we are still the current
    // connection), reject pending, notify.
    let mut conn = shared.conn.lock().await;
    if conn.as_ref().map(|h| h.seq) == Some(seq) {
        *conn = None;
        drop(conn);
        reject_pending(&shared).await;
        let _ = shared.connected_tx.send(false);
        let _ = shared.events.send(BrokerEvent::ClientDisconnected);
        tracing::info!("relay detached (connection #{})", seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Action;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    struct TestClient {
        stream: UnixStream,
        decoder: FrameCodec,
    }

    impl TestClient {
        async fn connect(path: &std::path::Path) -> Self {
            let stream = UnixStream::connect(path).await.expect("connect");
            Self {
                stream,
                decoder: FrameCodec::new(FrameDialect::Ipc),
            }
        }

        async fn send(&mut self, value: &Value) {
            let frame = FrameCodec::new(FrameDialect::Ipc).encode_frame(value).unwrap();
            self.stream.write_all(&frame).await.unwrap();
        }

        async fn recv(&mut self) -> Option<Value> {
            let mut chunk = [0u8; 4096];
            loop {
                let n = self.stream.read(&mut chunk).await.ok()?;
                if n == 0 {
                    return None;
                }
                let mut messages = self.decoder.push(&chunk[..n]).ok()?;
                let first = messages.drain(..).next();
                if let Some(first) = first {
                    return Some(first);
                }
            }
        }
    }

    fn test_config(dir: &TempDir) -> BrokerConfig {
        let mut config = BrokerConfig::new(dir.path().join("agentfox-test.sock"));
        config.command_timeout = Duration::from_millis(300);
        config.heartbeat_interval = Duration::from_secs(60);
        config.heartbeat_grace = Duration::from_secs(5);
        config
    }

    /// Verifies that wait_for_connection resolves once a client attaches
    /// and that the connected event fires.
    #[tokio::test]
    async fn test_client_attachment_resolves_waiters() {
        let dir = TempDir::new().unwrap();
        let broker = IpcBroker::start(test_config(&dir)).unwrap();
        let mut events = broker.subscribe();
        assert!(!broker.has_ever_connected());

        let _client = TestClient::connect(&dir.path().join("agentfox-test.sock")).await;
        broker
            .wait_for_connection(Duration::from_secs(2))
            .await
            .unwrap();
        assert!(broker.has_ever_connected());
        assert_eq!(events.recv().await.unwrap(), BrokerEvent::ClientConnected);
    }

    /// Verifies that a second concurrent connection is dropped immediately
    /// while the first keeps working.
    #[tokio::test]
    async fn test_second_client_rejected() {
        let dir = TempDir::new().unwrap();
        let broker = IpcBroker::start(test_config(&dir)).unwrap();
        let path = dir.path().join("agentfox-test.sock");

        let mut first = TestClient::connect(&path).await;
        broker
            .wait_for_connection(Duration::from_secs(2))
            .await
            .unwrap();

        let mut second = TestClient::connect(&path).await;
        // The surplus connection sees EOF straight away.
        assert!(second.recv().await.is_none());

        // The first connection still answers pings.
        first.send(&json!({"type": "ping"})).await;
        assert_eq!(first.recv().await.unwrap(), json!({"type": "pong"}));
    }

    /// Verifies command/response correlation, including out-of-order
    /// responses.
    #[tokio::test]
    async fn test_out_of_order_responses_correlate() {
        let dir = TempDir::new().unwrap();
        let broker = Arc::new(IpcBroker::start(test_config(&dir)).unwrap());
        let mut client = TestClient::connect(&dir.path().join("agentfox-test.sock")).await;
        broker
            .wait_for_connection(Duration::from_secs(2))
            .await
            .unwrap();

        let b1 = Arc::clone(&broker);
        let first = tokio::spawn(async move {
            b1.send_command(Command::new("c1", Action::Snapshot, json!({})))
                .await
        });
        let b2 = Arc::clone(&broker);
        let second = tokio::spawn(async move {
            b2.send_command(Command::new("c2", Action::Close, json!({})))
                .await
        });

        let m1 = client.recv().await.unwrap();
        let m2 = client.recv().await.unwrap();
        let ids: Vec<&str> = vec![m1["id"].as_str().unwrap(), m2["id"].as_str().unwrap()];
        assert!(ids.contains(&"c1") && ids.contains(&"c2"));

        // Answer in reverse order.
        client
            .send(&json!({"type": "response", "id": "c2", "success": true, "result": {"second": true}}))
            .await;
        client
            .send(&json!({"type": "response", "id": "c1", "success": true, "result": {"first": true}}))
            .await;

        let r1 = first.await.unwrap().unwrap();
        let r2 = second.await.unwrap().unwrap();
        assert_eq!(r1.id, "c1");
        assert_eq!(r1.result.unwrap()["first"], true);
        assert_eq!(r2.id, "c2");
        assert_eq!(r2.result.unwrap()["second"], true);
    }

    /// Verifies the timeout path: exactly one rejection, and a late reply
    /// for the expired ID is dropped without effect.
    #[tokio::test]
    async fn test_timeout_rejects_once_and_drops_late_reply() {
        let dir = TempDir::new().unwrap();
        let broker = IpcBroker::start(test_config(&dir)).unwrap();
        let mut client = TestClient::connect(&dir.path().join("agentfox-test.sock")).await;
        broker
            .wait_for_connection(Duration::from_secs(2))
            .await
            .unwrap();

        let err = broker
            .send_command(Command::new("slow", Action::Snapshot, json!({})))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast::<AgentfoxError>().unwrap(),
            AgentfoxError::CommandTimeout { .. }
        ));

        // Late reply: consumed and dropped; the link stays healthy.
        client
            .send(&json!({"type": "response", "id": "slow", "success": true, "result": {}}))
            .await;
        client.send(&json!({"type": "ping"})).await;
        assert_eq!(client.recv().await.unwrap(), json!({"type": "pong"}));
        assert!(broker.shared.pending.lock().await.is_empty());
    }

    /// Verifies that a client disconnect rejects every pending command with
    /// the disconnect error and emits the disconnected event.
    #[tokio::test]
    async fn test_disconnect_rejects_pending() {
        let dir = TempDir::new().unwrap();
        let broker = Arc::new(IpcBroker::start(test_config(&dir)).unwrap());
        let client = TestClient::connect(&dir.path().join("agentfox-test.sock")).await;
        broker
            .wait_for_connection(Duration::from_secs(2))
            .await
            .unwrap();
        let mut events = broker.subscribe();
        assert_eq!(events.recv().await.unwrap(), BrokerEvent::ClientConnected);

        let b = Arc::clone(&broker);
        let inflight = tokio::spawn(async move {
            b.send_command(Command::new("c9", Action::Snapshot, json!({})))
                .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        drop(client);

        let err = inflight.await.unwrap().unwrap_err();
        assert!(matches!(
            err.downcast::<AgentfoxError>().unwrap(),
            AgentfoxError::ExtensionDisconnected
        ));
        assert_eq!(
            events.recv().await.unwrap(),
            BrokerEvent::ClientDisconnected
        );
        assert!(!broker.connected().await);
    }

    /// Verifies that an unanswered heartbeat ping forces a disconnect.
    #[tokio::test]
    async fn test_heartbeat_loss_forces_disconnect() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.heartbeat_interval = Duration::from_millis(50);
        config.heartbeat_grace = Duration::from_millis(50);
        let broker = IpcBroker::start(config).unwrap();

        let mut client = TestClient::connect(&dir.path().join("agentfox-test.sock")).await;
        broker
            .wait_for_connection(Duration::from_secs(2))
            .await
            .unwrap();

        // The client reads the ping but never answers; the broker must
        // force-close the socket.
        assert_eq!(client.recv().await.unwrap(), json!({"type": "ping"}));
        assert!(client.recv().await.is_none());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!broker.connected().await);
    }

    /// Verifies that answering pings keeps the connection alive across
    /// several heartbeat cycles.
    #[tokio::test]
    async fn test_answered_heartbeats_keep_link_alive() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.heartbeat_interval = Duration::from_millis(40);
        config.heartbeat_grace = Duration::from_millis(80);
        let broker = IpcBroker::start(config).unwrap();

        let mut client = TestClient::connect(&dir.path().join("agentfox-test.sock")).await;
        broker
            .wait_for_connection(Duration::from_secs(2))
            .await
            .unwrap();

        for _ in 0..3 {
            assert_eq!(client.recv().await.unwrap(), json!({"type": "ping"}));
            client.send(&json!({"type": "pong"})).await;
        }
        assert!(broker.connected().await);
    }

    /// Verifies that a framing violation kills the connection but the
    /// broker accepts the next client.
    #[tokio::test]
    async fn test_framing_violation_kills_connection_not_server() {
        let dir = TempDir::new().unwrap();
        let broker = IpcBroker::start(test_config(&dir)).unwrap();
        let path = dir.path().join("agentfox-test.sock");

        let mut bad = TestClient::connect(&path).await;
        broker
            .wait_for_connection(Duration::from_secs(2))
            .await
            .unwrap();

        // Declare a frame bigger than the 64 MiB cap.
        let mut oversized = bytes::BytesMut::new();
        bytes::BufMut::put_u32(&mut oversized, (crate::codec::IPC_FRAME_LIMIT + 1) as u32);
        bad.stream.write_all(&oversized).await.unwrap();
        assert!(bad.recv().await.is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut next = TestClient::connect(&path).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        next.send(&json!({"type": "ping"})).await;
        assert_eq!(next.recv().await.unwrap(), json!({"type": "pong"}));
    }

    /// Verifies that send_command without an attached client reports the
    /// never-connected lifecycle error.
    #[tokio::test]
    async fn test_send_without_client_reports_not_connected() {
        let dir = TempDir::new().unwrap();
        let broker = IpcBroker::start(test_config(&dir)).unwrap();
        let err = broker
            .send_command(Command::new("c1", Action::Snapshot, json!({})))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast::<AgentfoxError>().unwrap(),
            AgentfoxError::ExtensionNotConnected
        ));
    }

    /// Verifies that a stale endpoint file from a dead instance is unlinked
    /// on start.
    #[tokio::test]
    async fn test_stale_socket_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agentfox-test.sock");
        std::fs::write(&path, b"stale").unwrap();
        let broker = IpcBroker::start(test_config(&dir)).unwrap();
        let _client = TestClient::connect(&path).await;
        broker
            .wait_for_connection(Duration::from_secs(2))
            .await
            .unwrap();
    }
}

//! StreamingClient - Persistent Duplex Connection to the Analysis Service
//!
//! ## Responsibilities
//!
//! - Newline-delimited JSON framing over one TCP connection
//! - Frame transmission (`send_frame`) gated on connected state; frames are
//!   dropped while not connected, never queued
//! - Response decode and delivery to a single registered observer
//! - Fixed-delay reconnect after every unplanned close; `disconnect()` is the
//!   only path that permanently stops retrying
//!
//! ## State machine
//!
//! ```text
//! disconnected --connect()--> connecting --open--> connected
//! connected --close/error--> disconnected (reconnect after fixed delay)
//! connecting --error--> error --(after delay)--> connecting
//! ```

use crate::error::Result;
use crate::models::StillImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Default delay between reconnect attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Connection state, written only by the StreamingClient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Decoded analysis result delivered to the observer
#[derive(Debug, Clone)]
pub enum StreamResponse {
    /// Frame analyzed; snapshots are raw JSON owned by the analysis service
    Success {
        game_state: Option<serde_json::Value>,
        recommendations: Option<serde_json::Value>,
    },
    /// Capture succeeded but no recognizable table was found
    NoSignal,
    /// Analysis-side error
    Error { message: String },
}

/// Outbound frame envelope
#[derive(Serialize)]
struct FrameEnvelope {
    #[serde(rename = "type")]
    kind: &'static str,
    data: String,
}

/// Inbound wire shape
#[derive(Deserialize)]
struct RawResponse {
    status: String,
    #[serde(default, alias = "gameState")]
    game_state: Option<serde_json::Value>,
    #[serde(default)]
    recommendations: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

struct Inner {
    state: ConnectionState,
    writer: Option<OwnedWriteHalf>,
    /// Bumped by connect()/disconnect(); stale tasks check it and bail
    epoch: u64,
    /// Set by disconnect(); blocks all further retry scheduling
    stopped: bool,
    retry_timer: Option<JoinHandle<()>>,
    conn_task: Option<JoinHandle<()>>,
}

type Shared = Arc<Mutex<Inner>>;
type Observer = Arc<RwLock<Option<mpsc::UnboundedSender<StreamResponse>>>>;

/// StreamingClient instance
pub struct StreamingClient {
    endpoint: String,
    reconnect_delay: Duration,
    inner: Shared,
    observer: Observer,
}

impl StreamingClient {
    /// Create a client for the given host:port endpoint
    pub fn new(endpoint: String) -> Self {
        Self::with_reconnect_delay(endpoint, DEFAULT_RECONNECT_DELAY)
    }

    /// Create a client with a custom reconnect delay
    pub fn with_reconnect_delay(endpoint: String, reconnect_delay: Duration) -> Self {
        Self {
            endpoint,
            reconnect_delay,
            inner: Arc::new(Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                writer: None,
                epoch: 0,
                stopped: false,
                retry_timer: None,
                conn_task: None,
            })),
            observer: Arc::new(RwLock::new(None)),
        }
    }

    /// Register the observer channel, replacing any prior registration
    pub async fn register_observer(&self) -> mpsc::UnboundedReceiver<StreamResponse> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.observer.write().await = Some(tx);
        rx
    }

    /// Open the duplex connection if none is open or pending
    ///
    /// Idempotent while connecting/connected.
    pub async fn connect(&self) {
        let mut g = self.inner.lock().await;
        g.stopped = false;
        if matches!(
            g.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return;
        }
        if let Some(t) = g.retry_timer.take() {
            t.abort();
        }
        g.epoch += 1;
        g.state = ConnectionState::Connecting;
        g.conn_task = Some(spawn_attempt(
            self.endpoint.clone(),
            self.reconnect_delay,
            self.inner.clone(),
            self.observer.clone(),
            g.epoch,
        ));
    }

    /// Close the connection and cancel any pending reconnect
    pub async fn disconnect(&self) {
        let mut g = self.inner.lock().await;
        g.stopped = true;
        g.epoch += 1;
        if let Some(t) = g.retry_timer.take() {
            t.abort();
        }
        if let Some(t) = g.conn_task.take() {
            t.abort();
        }
        g.writer = None;
        g.state = ConnectionState::Disconnected;
        tracing::info!(endpoint = %self.endpoint, "Analysis stream disconnected");
    }

    /// Transmit one frame if connected; otherwise the frame is dropped
    pub async fn send_frame(&self, image: &StillImage) -> Result<()> {
        let mut g = self.inner.lock().await;
        if g.state != ConnectionState::Connected {
            tracing::trace!("Frame dropped (stream not connected)");
            return Ok(());
        }

        let mut payload = serde_json::to_vec(&FrameEnvelope {
            kind: "frame",
            data: image.encode_base64(),
        })?;
        payload.push(b'\n');

        let epoch = g.epoch;
        if let Some(writer) = g.writer.as_mut() {
            if let Err(e) = writer.write_all(&payload).await {
                tracing::warn!(error = %e, "Frame send failed, scheduling reconnect");
                g.state = ConnectionState::Disconnected;
                g.writer = None;
                schedule_retry(
                    &mut g,
                    self.endpoint.clone(),
                    self.reconnect_delay,
                    self.inner.clone(),
                    self.observer.clone(),
                    epoch,
                );
            }
        }
        Ok(())
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Whether the connection is currently open
    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.state == ConnectionState::Connected
    }

    /// Configured endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Spawn one connection attempt plus its read loop
fn spawn_attempt(
    endpoint: String,
    delay: Duration,
    inner: Shared,
    observer: Observer,
    epoch: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!(endpoint = %endpoint, "Connecting to analysis stream");
        match TcpStream::connect(&endpoint).await {
            Ok(stream) => {
                let (read_half, write_half) = stream.into_split();
                {
                    let mut g = inner.lock().await;
                    if g.epoch != epoch || g.stopped {
                        return;
                    }
                    g.state = ConnectionState::Connected;
                    g.writer = Some(write_half);
                }
                tracing::info!(endpoint = %endpoint, "Analysis stream connected");

                let mut lines = BufReader::new(read_half).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => deliver(&observer, &line).await,
                        Ok(None) => {
                            tracing::warn!("Analysis stream closed by peer");
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Analysis stream read error");
                            break;
                        }
                    }
                }

                let mut g = inner.lock().await;
                if g.epoch != epoch || g.stopped {
                    return;
                }
                g.state = ConnectionState::Disconnected;
                g.writer = None;
                schedule_retry(&mut g, endpoint, delay, inner.clone(), observer, epoch);
            }
            Err(e) => {
                let mut g = inner.lock().await;
                if g.epoch != epoch || g.stopped {
                    return;
                }
                tracing::warn!(endpoint = %endpoint, error = %e, "Analysis stream connect failed");
                g.state = ConnectionState::Error;
                schedule_retry(&mut g, endpoint, delay, inner.clone(), observer, epoch);
            }
        }
    })
}

/// Arm the fixed-delay reconnect timer (caller holds the lock)
fn schedule_retry(
    g: &mut Inner,
    endpoint: String,
    delay: Duration,
    inner: Shared,
    observer: Observer,
    epoch: u64,
) {
    if let Some(t) = g.retry_timer.take() {
        t.abort();
    }
    g.retry_timer = Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let mut g = inner.lock().await;
        if g.epoch != epoch || g.stopped {
            return;
        }
        g.state = ConnectionState::Connecting;
        g.conn_task = Some(spawn_attempt(
            endpoint,
            delay,
            inner.clone(),
            observer,
            epoch,
        ));
    }));
}

/// Decode one wire line and hand it to the observer
///
/// Malformed payloads are logged and dropped, never propagated.
async fn deliver(observer: &Observer, line: &str) {
    let raw: RawResponse = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed stream payload dropped");
            return;
        }
    };

    let response = match raw.status.as_str() {
        "success" => StreamResponse::Success {
            game_state: raw.game_state,
            recommendations: raw.recommendations,
        },
        "no_table_detected" => StreamResponse::NoSignal,
        "error" => StreamResponse::Error {
            message: raw.error.unwrap_or_else(|| "unknown error".to_string()),
        },
        other => {
            tracing::warn!(status = %other, "Unknown stream status dropped");
            return;
        }
    };

    if let Some(tx) = observer.read().await.as_ref() {
        if tx.send(response).is_err() {
            tracing::debug!("Stream observer dropped, response discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::TcpListener;

    async fn wait_for_connected(client: &StreamingClient) {
        for _ in 0..100 {
            if client.is_connected().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("client never reached connected state");
    }

    #[tokio::test]
    async fn test_send_while_disconnected_is_silent_drop() {
        let client = StreamingClient::new("127.0.0.1:1".to_string());
        let image = StillImage::new(vec![1, 2, 3], 4, 4);
        client.send_frame(&image).await.unwrap();
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_responses_delivered_in_order_malformed_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(
                    concat!(
                        "{\"status\":\"success\",\"game_state\":{\"pot\":12}}\n",
                        "this is not json\n",
                        "{\"status\":\"no_table_detected\"}\n",
                        "{\"status\":\"error\",\"error\":\"boom\"}\n",
                    )
                    .as_bytes(),
                )
                .await
                .unwrap();
            // Keep the socket open long enough for the client to read
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let client =
            StreamingClient::with_reconnect_delay(addr.to_string(), Duration::from_millis(50));
        let mut rx = client.register_observer().await;
        client.connect().await;
        wait_for_connected(&client).await;

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, StreamResponse::Success { ref game_state, .. }
            if game_state.as_ref().unwrap()["pot"] == 12));
        assert!(matches!(rx.recv().await.unwrap(), StreamResponse::NoSignal));
        assert!(
            matches!(rx.recv().await.unwrap(), StreamResponse::Error { ref message } if message == "boom")
        );

        client.disconnect().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_frame_envelope_reaches_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(socket).lines();
            lines.next_line().await.unwrap().unwrap()
        });

        let client = StreamingClient::new(addr.to_string());
        client.connect().await;
        wait_for_connected(&client).await;

        let image = StillImage::new(vec![0xFF, 0xD8, 0xFF], 2, 2);
        client.send_frame(&image).await.unwrap();

        let line = server.await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "frame");
        assert_eq!(value["data"], image.encode_base64());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_fixed_delay_reconnect_until_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));

        let server_accepts = accepts.clone();
        let server = tokio::spawn(async move {
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                server_accepts.fetch_add(1, Ordering::SeqCst);
                // Unplanned close: drop immediately
                drop(socket);
            }
        });

        let delay = Duration::from_millis(50);
        let client = StreamingClient::with_reconnect_delay(addr.to_string(), delay);
        client.connect().await;

        tokio::time::sleep(Duration::from_millis(400)).await;
        let seen = accepts.load(Ordering::SeqCst);
        // One initial attempt plus reconnects, each separated by the fixed delay
        assert!(seen >= 3, "expected at least 3 attempts, saw {seen}");
        assert!(seen <= 10, "reconnects fired faster than the fixed delay: {seen}");

        client.disconnect().await;
        let at_disconnect = accepts.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(
            accepts.load(Ordering::SeqCst),
            at_disconnect,
            "reconnect attempts continued after disconnect()"
        );
        server.abort();
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_while_connected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));

        let server_accepts = accepts.clone();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                server_accepts.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });

        let client = StreamingClient::new(addr.to_string());
        client.connect().await;
        wait_for_connected(&client).await;
        client.connect().await;
        client.connect().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(accepts.load(Ordering::SeqCst), 1);

        client.disconnect().await;
        server.abort();
    }
}

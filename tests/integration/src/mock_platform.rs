//! In-process mock of the platform's realtime endpoint.
//!
//! Speaks the same wire dialect as the real thing: a polling GET answers
//! the handshake with an open frame, a polling POST accepts join frames,
//! and the websocket route answers the probe, acknowledges heartbeats, and
//! pushes scripted event frames to upgraded connections.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use arena_transport::codec::{self, Frame};

/// Counter for unique test ports
static PORT_COUNTER: AtomicU16 = AtomicU16::new(19400);

fn get_test_port() -> u16 {
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Knobs for one mock instance.
#[derive(Debug, Clone)]
pub struct MockOptions {
    /// Heartbeat cadence handed out in the handshake, in milliseconds.
    pub ping_interval_ms: u64,
    /// Close the first websocket connection right after its upgrade, to
    /// force one reconnect.
    pub drop_first_connection: bool,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            ping_interval_ms: 25_000,
            drop_first_connection: false,
        }
    }
}

/// Counters and recordings shared with the test body.
pub struct MockState {
    options: MockOptions,
    sid_counter: AtomicUsize,
    handshakes: AtomicUsize,
    ws_connections: AtomicUsize,
    heartbeats: AtomicUsize,
    subscribed_channels: Mutex<Vec<String>>,
    subscribe_bodies: Mutex<Vec<String>>,
    event_tx: broadcast::Sender<Frame>,
}

impl MockState {
    pub fn handshake_count(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    pub fn heartbeat_count(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }

    pub fn subscribed_channels(&self) -> Vec<String> {
        self.subscribed_channels.lock().clone()
    }

    /// Raw bodies of the subscription POSTs, in arrival order.
    pub fn subscribe_bodies(&self) -> Vec<String> {
        self.subscribe_bodies.lock().clone()
    }
}

/// Running mock server.
pub struct MockPlatform {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
    _handle: JoinHandle<()>,
}

impl MockPlatform {
    pub async fn start() -> Result<Self> {
        Self::start_with(MockOptions::default()).await
    }

    pub async fn start_with(options: MockOptions) -> Result<Self> {
        let (event_tx, _) = broadcast::channel(64);
        let state = Arc::new(MockState {
            options,
            sid_counter: AtomicUsize::new(0),
            handshakes: AtomicUsize::new(0),
            ws_connections: AtomicUsize::new(0),
            heartbeats: AtomicUsize::new(0),
            subscribed_channels: Mutex::new(Vec::new()),
            subscribe_bodies: Mutex::new(Vec::new()),
            event_tx,
        });

        let app = Router::new()
            .route("/r/", get(realtime_get).post(realtime_post))
            .with_state(Arc::clone(&state));

        let port = get_test_port();
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Push one notification envelope to every upgraded websocket client.
    pub fn send_notification(&self, channel: &str, packet_id: u64, data: Value) {
        let body = json!({
            "channel": channel,
            "packet_id": packet_id,
            "data": data,
        });
        let frame = Frame::new(42, json!(["bgamsg", body]));
        let _ = self.state.event_tx.send(frame);
    }
}

async fn realtime_get(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    if params.get("transport").map(String::as_str) == Some("websocket") {
        if let Some(ws) = ws {
            return ws
                .on_upgrade(move |socket| handle_ws(state, socket))
                .into_response();
        }
    }

    state.handshakes.fetch_add(1, Ordering::SeqCst);
    let sid = format!("sid-{}", state.sid_counter.fetch_add(1, Ordering::SeqCst));
    let open = Frame::new(
        0,
        json!({
            "sid": sid,
            "upgrades": ["websocket"],
            "pingInterval": state.options.ping_interval_ms,
            "pingTimeout": 5000,
        }),
    );
    let connect = Frame::bare(40);
    codec::encode(&[open, connect]).into_response()
}

async fn realtime_post(State(state): State<Arc<MockState>>, body: String) -> &'static str {
    state.subscribe_bodies.lock().push(body.clone());
    if let Ok(frames) = codec::decode(&body) {
        let mut channels = state.subscribed_channels.lock();
        for frame in frames {
            if frame.id != 42 {
                continue;
            }
            let Some(Value::Array(parts)) = frame.payload else {
                continue;
            };
            if parts.first().and_then(Value::as_str) == Some("join") {
                if let Some(channel) = parts.get(1).and_then(Value::as_str) {
                    channels.push(channel.to_string());
                }
            }
        }
    }
    "ok"
}

async fn handle_ws(state: Arc<MockState>, mut socket: WebSocket) {
    let connection = state.ws_connections.fetch_add(1, Ordering::SeqCst);
    let drop_after_upgrade = connection == 0 && state.options.drop_first_connection;
    let mut event_rx = state.event_tx.subscribe();
    let mut upgraded = false;
    let mut pending: Vec<Frame> = Vec::new();

    loop {
        tokio::select! {
            message = socket.recv() => {
                let Some(Ok(message)) = message else { return };
                let WsMessage::Text(text) = message else { continue };
                let Ok(frames) = codec::decode(&text) else { continue };
                for frame in frames {
                    match frame.id {
                        2 => {
                            if frame.payload.as_ref().and_then(Value::as_str) == Some("probe") {
                                let pong = Frame::new(3, json!("probe"));
                                if send(&mut socket, &pong).await.is_err() {
                                    return;
                                }
                            } else {
                                state.heartbeats.fetch_add(1, Ordering::SeqCst);
                                if send(&mut socket, &Frame::bare(3)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        5 => {
                            upgraded = true;
                            if drop_after_upgrade {
                                let _ = socket.send(WsMessage::Close(None)).await;
                                return;
                            }
                            for frame in pending.drain(..) {
                                if send(&mut socket, &frame).await.is_err() {
                                    return;
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            event = event_rx.recv() => {
                let Ok(frame) = event else { continue };
                if upgraded {
                    if send(&mut socket, &frame).await.is_err() {
                        return;
                    }
                } else {
                    pending.push(frame);
                }
            }
        }
    }
}

async fn send(socket: &mut WebSocket, frame: &Frame) -> Result<()> {
    socket
        .send(WsMessage::Text(codec::encode_one(frame)))
        .await?;
    Ok(())
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

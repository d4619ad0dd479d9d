//! One logical connection to a realtime notification endpoint.
//!
//! A session performs the polling handshake, upgrades to a websocket,
//! keeps the connection alive with heartbeats, and feeds decoded
//! notifications into the shared [`NotificationQueue`]. When the
//! connection drops and auto-restart is enabled, the session reconnects
//! with backoff and replays its channel subscriptions.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use url::Url;
use uuid::Uuid;

use arena_core::ChannelName;

use crate::codec::{self, CodecError, Frame, FrameKind};
use crate::queue::{NotificationQueue, NotificationSink, QueueEntry};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

const ENGINE_VERSION: &str = "3";
const CACHE_BUSTER_LEN: usize = 8;
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_NAP: Duration = Duration::from_millis(500);

/// Transport-level errors surfaced by a session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("not connected")]
    NotConnected,

    #[error("subscription failed: {0}")]
    Subscription(String),

    #[error("session closed")]
    Closed,
}

/// Values returned by the server's handshake open frame.
#[derive(Debug, Clone, Deserialize)]
pub struct Handshake {
    pub sid: String,
    /// Heartbeat cadence in milliseconds.
    #[serde(rename = "pingInterval")]
    pub ping_interval: u64,
    /// Server-side liveness window in milliseconds.
    #[serde(rename = "pingTimeout")]
    pub ping_timeout: u64,
}

/// Observable lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Handshaking,
    Connected,
    Closing,
    Closed,
}

/// Where a session connects: base URL plus the engine mount path.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub base_url: String,
    pub path: String,
}

impl EndpointConfig {
    pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
        }
    }

    /// HTTP URL used for the handshake GET and subscription POSTs.
    #[must_use]
    pub fn polling_url(&self) -> String {
        format!(
            "{}/{}/",
            self.base_url.trim_end_matches('/'),
            self.path.trim_matches('/')
        )
    }

    /// Websocket URL for the upgraded connection.
    #[must_use]
    pub fn ws_url(&self) -> String {
        let polling = self.polling_url();
        if let Some(rest) = polling.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = polling.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            polling
        }
    }
}

/// Full configuration for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: EndpointConfig,
    /// Extra query parameters sent on every handshake and subscribe request.
    pub auth: Vec<(String, String)>,
    pub auto_restart: bool,
    pub reconnect_delay: Duration,
    pub probe_timeout: Duration,
    /// Channels carried over from a prior incarnation of this session.
    pub initial_channels: HashSet<ChannelName>,
}

impl SessionConfig {
    pub fn new(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint,
            auth: Vec::new(),
            auto_restart: true,
            reconnect_delay: Duration::from_secs(3),
            probe_timeout: Duration::from_secs(10),
            initial_channels: HashSet::new(),
        }
    }

    #[must_use]
    pub fn with_auth(mut self, auth: Vec<(String, String)>) -> Self {
        self.auth = auth;
        self
    }

    #[must_use]
    pub fn with_auto_restart(mut self, auto_restart: bool) -> Self {
        self.auto_restart = auto_restart;
        self
    }
}

/// State shared between the session handle and its background tasks.
struct SessionShared {
    config: SessionConfig,
    http: reqwest::Client,
    queue: Arc<NotificationQueue>,
    sink: NotificationSink,
    state: RwLock<SessionState>,
    handshake: RwLock<Option<Handshake>>,
    channels: RwLock<HashSet<ChannelName>>,
    outbound: RwLock<Option<mpsc::UnboundedSender<Frame>>>,
    // Serializes connect attempts against subscribe calls.
    connect_lock: tokio::sync::Mutex<()>,
    closing: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

/// Handle to one running session.
pub struct TransportSession {
    id: Uuid,
    shared: Arc<SessionShared>,
    runner: Mutex<Option<JoinHandle<()>>>,
}

impl TransportSession {
    #[must_use]
    pub fn new(
        config: SessionConfig,
        queue: Arc<NotificationQueue>,
        sink: NotificationSink,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let channels = config.initial_channels.clone();
        Self {
            id: Uuid::new_v4(),
            shared: Arc::new(SessionShared {
                config,
                http: reqwest::Client::new(),
                queue,
                sink,
                state: RwLock::new(SessionState::Idle),
                handshake: RwLock::new(None),
                channels: RwLock::new(channels),
                outbound: RwLock::new(None),
                connect_lock: tokio::sync::Mutex::new(()),
                closing: AtomicBool::new(false),
                shutdown_tx,
            }),
            runner: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.shared.state.read()
    }

    /// Spawn the connect/reconnect loop. Idempotent only in the sense that
    /// a second call replaces the stored handle; call once.
    pub fn start(&self) {
        let shared = Arc::clone(&self.shared);
        let session_id = self.id;
        let handle = tokio::spawn(async move {
            run_loop(session_id, shared).await;
        });
        *self.runner.lock() = Some(handle);
    }

    /// Record channels and, when connected, post the join immediately.
    ///
    /// Before the first handshake the channels are only recorded; the
    /// connect path replays them. A concurrent reconnect may invalidate the
    /// captured sid between the check and the POST, in which case the
    /// subscription error is transient and the reconnect replays anyway.
    pub async fn subscribe(&self, channels: &[ChannelName]) -> Result<(), TransportError> {
        {
            let mut known = self.shared.channels.write();
            for channel in channels {
                known.insert(channel.clone());
            }
        }

        let _guard = self.shared.connect_lock.lock().await;
        let sid = match self.shared.handshake.read().as_ref() {
            Some(handshake) => handshake.sid.clone(),
            None => {
                debug!(session_id = %self.id, "not connected; join deferred to next connect");
                return Ok(());
            }
        };
        post_join(&self.shared, &sid, channels).await
    }

    /// Write one frame to the live websocket.
    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let outbound = self.shared.outbound.read();
        match outbound.as_ref() {
            Some(tx) => tx.send(frame).map_err(|_| TransportError::NotConnected),
            None => Err(TransportError::NotConnected),
        }
    }

    /// Channels this session is (or will be) subscribed to.
    #[must_use]
    pub fn channels(&self) -> HashSet<ChannelName> {
        self.shared.channels.read().clone()
    }

    /// Disable auto-restart, tear the connection down, and join the runner.
    pub async fn close(&self) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.shared.state.write() = SessionState::Closing;
        let _ = self.shared.shutdown_tx.send(true);

        let runner = self.runner.lock().take();
        if let Some(handle) = runner {
            if tokio::time::timeout(JOIN_TIMEOUT, handle).await.is_err() {
                warn!(session_id = %self.id, "session task did not stop within timeout");
            }
        }
        *self.shared.state.write() = SessionState::Closed;
        info!(session_id = %self.id, "session closed");
    }
}

async fn run_loop(session_id: Uuid, shared: Arc<SessionShared>) {
    let mut shutdown_rx = shared.shutdown_tx.subscribe();
    loop {
        if shared.closing.load(Ordering::SeqCst) {
            break;
        }

        match run_connection(&shared, &mut shutdown_rx).await {
            Ok(()) => info!(session_id = %session_id, "connection ended"),
            Err(err) => warn!(session_id = %session_id, error = %err, "connection failed"),
        }

        *shared.handshake.write() = None;
        *shared.outbound.write() = None;

        if shared.closing.load(Ordering::SeqCst) || !shared.config.auto_restart {
            break;
        }

        *shared.state.write() = SessionState::Idle;
        let delay = shared.config.reconnect_delay;
        info!(session_id = %session_id, delay_ms = delay.as_millis() as u64, "reconnecting");
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    *shared.state.write() = SessionState::Closed;
}

/// One full connection: handshake, upgrade, resubscribe, then the
/// read/write loop until the socket drops or shutdown is signalled.
async fn run_connection(
    shared: &Arc<SessionShared>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<(), TransportError> {
    let guard = shared.connect_lock.lock().await;
    *shared.state.write() = SessionState::Handshaking;

    let handshake = perform_handshake(shared).await?;
    let sid = handshake.sid.clone();
    let ping_interval = Duration::from_millis(handshake.ping_interval);
    debug!(sid = %sid, ping_interval_ms = handshake.ping_interval, "handshake complete");
    *shared.handshake.write() = Some(handshake);

    let ws_url = build_ws_url(shared, &sid)?;
    let (ws, _response) = connect_async(ws_url.as_str()).await?;
    let (mut ws_sink, mut ws_stream) = ws.split();

    // Engine probe: ping "probe", expect pong "probe", confirm the upgrade.
    send_frame(&mut ws_sink, &Frame::probe()).await?;
    await_probe_ack(&mut ws_stream, shared.config.probe_timeout).await?;
    send_frame(&mut ws_sink, &Frame::upgrade()).await?;

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Frame>();
    *shared.outbound.write() = Some(out_tx.clone());
    *shared.state.write() = SessionState::Connected;
    info!(sid = %sid, "session connected");

    let heartbeat = tokio::spawn(heartbeat_loop(
        out_tx,
        ping_interval,
        shared.shutdown_tx.subscribe(),
    ));

    // Replay known channels before releasing the connect lock so a
    // concurrent subscribe cannot interleave with the replay.
    let known: Vec<ChannelName> = shared.channels.read().iter().cloned().collect();
    let resubscribe = post_join(shared, &sid, &known).await;
    drop(guard);
    if let Err(err) = resubscribe {
        stop_heartbeat(heartbeat, &mut out_rx).await;
        return Err(err);
    }

    let result = loop {
        tokio::select! {
            message = ws_stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Err(err) = handle_inbound(shared, &text, &mut ws_sink).await {
                        break Err(err);
                    }
                }
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(err)) => break Err(TransportError::WebSocket(err)),
            },
            frame = out_rx.recv() => match frame {
                Some(frame) => {
                    if let Err(err) = send_frame(&mut ws_sink, &frame).await {
                        break Err(err);
                    }
                }
                None => break Ok(()),
            },
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    let _ = ws_sink.close().await;
                    break Ok(());
                }
            }
        }
    };

    *shared.outbound.write() = None;
    stop_heartbeat(heartbeat, &mut out_rx).await;
    result
}

async fn stop_heartbeat(heartbeat: JoinHandle<()>, out_rx: &mut mpsc::UnboundedReceiver<Frame>) {
    out_rx.close();
    if tokio::time::timeout(JOIN_TIMEOUT, heartbeat).await.is_err() {
        warn!("heartbeat task did not stop within timeout");
    }
}

async fn perform_handshake(shared: &SessionShared) -> Result<Handshake, TransportError> {
    let url = shared.config.endpoint.polling_url();
    let mut request = shared.http.get(&url).query(&[
        ("EIO", ENGINE_VERSION),
        ("transport", "polling"),
        ("t", cache_buster().as_str()),
    ]);
    for (key, value) in &shared.config.auth {
        request = request.query(&[(key.as_str(), value.as_str())]);
    }

    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(TransportError::Handshake(format!(
            "handshake returned {}",
            response.status()
        )));
    }

    let body = response.text().await?;
    let frames = codec::decode(&body)?;
    let open = frames
        .into_iter()
        .find(|frame| frame.kind() == Some(FrameKind::Open))
        .ok_or_else(|| TransportError::Handshake("no open frame in response".to_string()))?;
    let payload = open
        .payload
        .ok_or_else(|| TransportError::Handshake("open frame has no payload".to_string()))?;
    serde_json::from_value(payload)
        .map_err(|err| TransportError::Handshake(format!("invalid handshake payload: {err}")))
}

fn build_ws_url(shared: &SessionShared, sid: &str) -> Result<Url, TransportError> {
    let mut url = Url::parse(&shared.config.endpoint.ws_url())
        .map_err(|err| TransportError::Handshake(format!("invalid endpoint url: {err}")))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("EIO", ENGINE_VERSION);
        pairs.append_pair("transport", "websocket");
        pairs.append_pair("sid", sid);
        for (key, value) in &shared.config.auth {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

/// POST one join frame per channel over the polling endpoint.
async fn post_join(
    shared: &SessionShared,
    sid: &str,
    channels: &[ChannelName],
) -> Result<(), TransportError> {
    if channels.is_empty() {
        return Ok(());
    }

    let frames: Vec<Frame> = channels
        .iter()
        .map(|channel| Frame::join(channel.as_str()))
        .collect();
    let body = codec::encode(&frames);

    let url = shared.config.endpoint.polling_url();
    let mut request = shared
        .http
        .post(&url)
        .query(&[
            ("EIO", ENGINE_VERSION),
            ("transport", "polling"),
            ("t", cache_buster().as_str()),
            ("sid", sid),
        ])
        .body(body);
    for (key, value) in &shared.config.auth {
        request = request.query(&[(key.as_str(), value.as_str())]);
    }

    let response = request
        .send()
        .await
        .map_err(|err| TransportError::Subscription(err.to_string()))?;
    if !response.status().is_success() {
        return Err(TransportError::Subscription(format!(
            "join returned {}",
            response.status()
        )));
    }
    debug!(count = channels.len(), "channels joined");
    Ok(())
}

async fn await_probe_ack(
    ws_stream: &mut WsStream,
    timeout: Duration,
) -> Result<(), TransportError> {
    let ack = tokio::time::timeout(timeout, async {
        while let Some(message) = ws_stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let frames = codec::decode(&text)?;
                    if frames.iter().any(Frame::is_probe_ack) {
                        return Ok(true);
                    }
                }
                Ok(Message::Close(_)) => return Ok(false),
                Ok(_) => {}
                Err(err) => return Err(TransportError::WebSocket(err)),
            }
        }
        Ok(false)
    })
    .await;

    match ack {
        Ok(Ok(true)) => Ok(()),
        Ok(Ok(false)) => Err(TransportError::Handshake(
            "socket closed during probe".to_string(),
        )),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(TransportError::Handshake("probe ack timed out".to_string())),
    }
}

async fn send_frame(ws_sink: &mut WsSink, frame: &Frame) -> Result<(), TransportError> {
    let text = codec::encode_one(frame);
    ws_sink.send(Message::Text(text)).await?;
    Ok(())
}

/// Decode one inbound websocket text message and react to its frames.
///
/// A malformed frame tears the connection down; a frame whose JSON payload
/// is broken is logged and dropped on its own.
async fn handle_inbound(
    shared: &Arc<SessionShared>,
    text: &str,
    ws_sink: &mut WsSink,
) -> Result<(), TransportError> {
    let frames = match codec::decode(text) {
        Ok(frames) => frames,
        Err(err @ CodecError::MalformedFrame { .. }) => return Err(err.into()),
        Err(err @ CodecError::ProtocolJson { .. }) => {
            warn!(error = %err, "dropping frame with invalid payload");
            return Ok(());
        }
    };

    for frame in frames {
        match frame.kind() {
            Some(FrameKind::Pong) => {
                if frame.is_probe_ack() {
                    // Late probe ack after an upgrade race; confirm again.
                    send_frame(ws_sink, &Frame::upgrade()).await?;
                } else {
                    trace!("heartbeat acknowledged");
                }
            }
            Some(FrameKind::Event) => handle_event(shared, frame),
            Some(kind) => debug!(%kind, "ignoring frame"),
            None => debug!(id = frame.id, "ignoring frame with unknown id"),
        }
    }
    Ok(())
}

/// An event frame carries `[type, body]`; only `bgamsg` bodies become
/// notifications. The body arrives either as an object or as a
/// JSON-string-encoded object.
fn handle_event(shared: &Arc<SessionShared>, frame: Frame) {
    let Some(Value::Array(parts)) = frame.payload else {
        debug!("event frame without array payload");
        return;
    };
    let Some(kind) = parts.first().and_then(Value::as_str) else {
        debug!("event frame without type");
        return;
    };
    if kind != "bgamsg" {
        debug!(event = kind, "ignoring event");
        return;
    }

    let body = match parts.into_iter().nth(1) {
        Some(Value::String(inner)) => match serde_json::from_str::<Value>(&inner) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "dropping notification with unparseable body");
                return;
            }
        },
        Some(value) => value,
        None => {
            debug!("event frame without body");
            return;
        }
    };

    let Some(channel) = body.get("channel").and_then(Value::as_str) else {
        warn!("dropping notification without channel");
        return;
    };

    shared.queue.push(QueueEntry {
        sink: Arc::clone(&shared.sink),
        channel: ChannelName::new(channel),
        payload: body,
        live: true,
    });
}

/// Send a bare ping every `interval`, waking in short naps so shutdown is
/// observed promptly. Exits when the outbound channel closes.
async fn heartbeat_loop(
    out_tx: mpsc::UnboundedSender<Frame>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let deadline = tokio::time::Instant::now() + interval;
        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            let nap = (deadline - now).min(SHUTDOWN_NAP);
            tokio::select! {
                () = tokio::time::sleep(nap) => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
            }
        }
        if out_tx.send(Frame::ping()).is_err() {
            return;
        }
        trace!("heartbeat sent");
    }
}

fn cache_buster() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CACHE_BUSTER_LEN)
        .map(char::from)
        .collect()
}

//! WebSocket protocol client.
//!
//! [`MuxClient`] owns the connection to the local input-mux server: it
//! performs the login handshake, answers keep-alive pings, enforces the
//! frame policy (text only, bounded size), and turns decoded notifications
//! into [`MuxEvent`] values on a bounded channel for the controller task.
//!
//! Frame-level violations (binary frames, oversized payloads) and a
//! rejected login are fatal and close the connection; everything else —
//! malformed JSON, unknown types, missing fields — drops the single
//! offending message and keeps the session alive.

use std::ops::ControlFlow;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use mux_core::domain::roster::UserInfo;
use mux_core::protocol::codec::{decode_server_message, encode_request, Inbound};
use mux_core::protocol::messages::{
    ClientRequest, ServerMessage, MAX_INBOUND_MESSAGE_SIZE, TYPE_LOGIN,
};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Default server endpoint: the mux server only listens on the loopback
/// interface.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:41001";

/// Default bound of the event channel between the client and the
/// controller task.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Identity strings carried in the login and logout handshakes.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub app_name: String,
    pub app_version: String,
    pub app_build_date: String,
    pub sdk_version: String,
    pub sdk_build_date: String,
}

#[derive(Debug, Clone)]
pub struct MuxClientConfig {
    pub server_url: String,
    pub identity: ClientIdentity,
    pub event_buffer: usize,
}

// ── Events ────────────────────────────────────────────────────────────────────

/// Everything the client reports upward to the controller task.
///
/// Wire-level details (acks, pings, frame policy) are handled inside the
/// client and never surface here.
#[derive(Debug, Clone, PartialEq)]
pub enum MuxEvent {
    /// The connection opened or closed.
    ConnectionChanged(bool),
    MouseMotion {
        hwid: i32,
        x: f64,
        y: f64,
    },
    MouseButton {
        hwid: i32,
        x: f64,
        y: f64,
        mask: u32,
    },
    MouseWheel {
        hwid: i32,
        x: f64,
        y: f64,
        delta: i32,
        horizontal: bool,
    },
    KeyboardKey {
        hwid: i32,
        vkey: u16,
        message: u32,
        scan: u32,
        flags: u32,
    },
    /// Full roster replacement.
    UserList(Vec<UserInfo>),
    UserCreated(UserInfo),
    UserDisposed {
        hwid_mouse: i32,
        hwid_keyboard: i32,
    },
    TimeoutWarning {
        minutes: i32,
    },
    TimeoutStopped {
        reason: String,
    },
}

/// Errors surfaced by [`MuxClient::connect`].
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("websocket connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Connection lifecycle, visible for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, never connected.
    Initialized,
    Connecting,
    Open,
    Disconnected,
}

enum WriterCmd {
    Request(ClientRequest),
    Close,
}

struct Inner {
    state: ConnectionState,
    writer: Option<mpsc::UnboundedSender<WriterCmd>>,
    /// Bumped on every successful connect. Each read task carries the value
    /// it was spawned under, so a task outliving its own connection cannot
    /// tear down a newer one.
    generation: u64,
}

/// The protocol client. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct MuxClient {
    config: Arc<MuxClientConfig>,
    inner: Arc<Mutex<Inner>>,
    events: mpsc::Sender<MuxEvent>,
}

impl MuxClient {
    /// Creates a client and the receiving end of its event channel.
    pub fn new(config: MuxClientConfig) -> (Self, mpsc::Receiver<MuxEvent>) {
        let (events, event_rx) = mpsc::channel(config.event_buffer);
        let client = Self {
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(Inner {
                state: ConnectionState::Initialized,
                writer: None,
                generation: 0,
            })),
            events,
        };
        (client, event_rx)
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Establishes the connection and performs the login handshake.
    ///
    /// A failed transport connect leaves the client `Disconnected` and
    /// returns the error; the caller may simply retry later. Calling while
    /// already connecting or connected is a no-op.
    pub async fn connect(&self) -> Result<(), NetworkError> {
        {
            let mut inner = self.inner.lock().await;
            match inner.state {
                ConnectionState::Connecting | ConnectionState::Open => return Ok(()),
                _ => inner.state = ConnectionState::Connecting,
            }
        }

        info!(url = %self.config.server_url, "connecting to mux server");
        let ws = match connect_async(self.config.server_url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                warn!(error = %e, "connect failed");
                self.inner.lock().await.state = ConnectionState::Disconnected;
                return Err(e.into());
            }
        };

        let (ws_sink, ws_stream) = ws.split();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let generation = {
            let mut inner = self.inner.lock().await;
            inner.state = ConnectionState::Open;
            inner.writer = Some(writer_tx.clone());
            inner.generation += 1;
            inner.generation
        };

        tokio::spawn(write_loop(ws_sink, writer_rx));

        // Login goes out first, before any event reaches the controller.
        let _ = writer_tx.send(WriterCmd::Request(login_request(&self.config.identity)));
        let _ = self.events.send(MuxEvent::ConnectionChanged(true)).await;

        tokio::spawn(read_loop(
            ws_stream,
            self.inner.clone(),
            self.events.clone(),
            writer_tx,
            self.config.identity.clone(),
            generation,
        ));

        info!("connection open, login sent");
        Ok(())
    }

    /// Closes the connection, sending a best-effort logout first.
    /// Idempotent: disconnecting an already-closed client does nothing.
    pub async fn disconnect(&self) {
        let writer = {
            let mut inner = self.inner.lock().await;
            if matches!(
                inner.state,
                ConnectionState::Disconnected | ConnectionState::Initialized
            ) {
                inner.state = ConnectionState::Disconnected;
                return;
            }
            inner.state = ConnectionState::Disconnected;
            inner.writer.take()
        };

        if let Some(writer) = writer {
            let _ = writer.send(WriterCmd::Request(logout_request(
                &self.config.identity,
                "client disconnect",
            )));
            let _ = writer.send(WriterCmd::Close);
        }
        info!("disconnected");
        let _ = self.events.send(MuxEvent::ConnectionChanged(false)).await;
    }

    /// Sends a request over the open connection. Requests made while not
    /// connected are dropped with a log line, never queued.
    pub async fn send_request(&self, request: ClientRequest) {
        let inner = self.inner.lock().await;
        match (&inner.state, &inner.writer) {
            (ConnectionState::Open, Some(writer)) => {
                let _ = writer.send(WriterCmd::Request(request));
            }
            _ => debug!("not connected, dropping outbound request"),
        }
    }
}

fn login_request(identity: &ClientIdentity) -> ClientRequest {
    ClientRequest::Login {
        app_name: identity.app_name.clone(),
        app_version: identity.app_version.clone(),
        app_build_date: identity.app_build_date.clone(),
        sdk_version: identity.sdk_version.clone(),
        sdk_build_date: identity.sdk_build_date.clone(),
    }
}

fn logout_request(identity: &ClientIdentity, reason: &str) -> ClientRequest {
    ClientRequest::Logout {
        app_name: identity.app_name.clone(),
        app_version: identity.app_version.clone(),
        sdk_version: identity.sdk_version.clone(),
        reason: reason.to_string(),
    }
}

// ── Connection tasks ──────────────────────────────────────────────────────────

async fn write_loop(mut sink: WsSink, mut rx: mpsc::UnboundedReceiver<WriterCmd>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WriterCmd::Request(request) => {
                let text = encode_request(&request);
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    debug!(error = %e, "write failed, stopping writer");
                    break;
                }
            }
            WriterCmd::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

async fn read_loop(
    mut stream: WsStream,
    inner: Arc<Mutex<Inner>>,
    events: mpsc::Sender<MuxEvent>,
    writer: mpsc::UnboundedSender<WriterCmd>,
    identity: ClientIdentity,
    generation: u64,
) {
    while let Some(frame) = stream.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "read failed, closing");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                if text.len() > MAX_INBOUND_MESSAGE_SIZE {
                    error!(size = text.len(), "oversized message, closing connection");
                    break;
                }
                match decode_server_message(text.as_bytes()) {
                    Ok(Inbound::Ack { request_type, ok }) => {
                        if handle_ack(&request_type, ok, &writer).is_break() {
                            break;
                        }
                    }
                    Ok(Inbound::Notify(notify)) => {
                        if dispatch_notify(notify, &events, &writer).await.is_break() {
                            break;
                        }
                    }
                    Err(e) => debug!(error = %e, "dropping undecodable message"),
                }
            }
            // The protocol is text-only; a binary frame means the peer is
            // not a mux server.
            Message::Binary(_) => {
                error!("binary frame on text protocol, closing connection");
                break;
            }
            Message::Close(_) => {
                info!("server closed the connection");
                break;
            }
            // tungstenite answers pings at the transport layer itself.
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    finish_connection(&inner, &events, &writer, &identity, generation).await;
}

/// Acknowledgment handling. Only a rejected login is fatal; any other
/// rejection is logged and the session continues.
///
/// The roster request is issued here, on the login ack, rather than by the
/// controller when it sees the connection open: the server rejects requests
/// from clients that have not completed the login handshake, so the ack is
/// the earliest moment a roster request can succeed.
fn handle_ack(
    request_type: &str,
    ok: bool,
    writer: &mpsc::UnboundedSender<WriterCmd>,
) -> ControlFlow<()> {
    if !ok {
        warn!(request_type, "server rejected request");
        if request_type == TYPE_LOGIN {
            error!("login rejected, closing connection");
            return ControlFlow::Break(());
        }
        return ControlFlow::Continue(());
    }
    if request_type == TYPE_LOGIN {
        debug!("login accepted, requesting roster");
        let _ = writer.send(WriterCmd::Request(ClientRequest::UserList));
    }
    ControlFlow::Continue(())
}

async fn dispatch_notify(
    notify: ServerMessage,
    events: &mpsc::Sender<MuxEvent>,
    writer: &mpsc::UnboundedSender<WriterCmd>,
) -> ControlFlow<()> {
    let event = match notify {
        ServerMessage::Ping => {
            let _ = writer.send(WriterCmd::Request(ClientRequest::Pong));
            return ControlFlow::Continue(());
        }
        ServerMessage::Shutdown { reason } => {
            info!(%reason, "server shutting down, closing connection");
            return ControlFlow::Break(());
        }
        ServerMessage::TimeoutWarning { minutes } => MuxEvent::TimeoutWarning { minutes },
        ServerMessage::TimeoutStopped { reason } => {
            let _ = events.send(MuxEvent::TimeoutStopped { reason }).await;
            return ControlFlow::Break(());
        }
        ServerMessage::Motion { hwid, x, y } => MuxEvent::MouseMotion { hwid, x, y },
        ServerMessage::Button { hwid, x, y, button } => MuxEvent::MouseButton {
            hwid,
            x,
            y,
            mask: button,
        },
        ServerMessage::Wheel {
            hwid,
            x,
            y,
            delta,
            horizontal,
        } => MuxEvent::MouseWheel {
            hwid,
            x,
            y,
            delta,
            horizontal,
        },
        ServerMessage::KeyboardKey {
            hwid,
            vkey,
            message,
            scan,
            flags,
        } => MuxEvent::KeyboardKey {
            hwid,
            vkey,
            message,
            scan,
            flags,
        },
        ServerMessage::UserList { users } => {
            MuxEvent::UserList(users.iter().map(UserInfo::from).collect())
        }
        ServerMessage::UserCreate {
            hwid_ms,
            hwid_kb,
            name,
            user_id,
        } => MuxEvent::UserCreated(UserInfo {
            user_id,
            name,
            hwid_mouse: hwid_ms,
            hwid_keyboard: hwid_kb,
        }),
        ServerMessage::UserDispose { hwid_ms, hwid_kb } => MuxEvent::UserDisposed {
            hwid_mouse: hwid_ms,
            hwid_keyboard: hwid_kb,
        },
        ServerMessage::UserChanged {
            action,
            hwid_ms,
            hwid_kb,
            name,
            user_id,
        } => match action.as_str() {
            "create" => MuxEvent::UserCreated(UserInfo {
                user_id,
                name,
                hwid_mouse: hwid_ms,
                hwid_keyboard: hwid_kb,
            }),
            "dispose" => MuxEvent::UserDisposed {
                hwid_mouse: hwid_ms,
                hwid_keyboard: hwid_kb,
            },
            // A remap carries no usable payload; ask for a fresh roster.
            "map" => {
                debug!("keyboard remap, requesting fresh roster");
                let _ = writer.send(WriterCmd::Request(ClientRequest::UserList));
                return ControlFlow::Continue(());
            }
            other => {
                warn!(action = other, "unknown user.changed action, ignoring");
                return ControlFlow::Continue(());
            }
        },
    };

    let _ = events.send(event).await;
    ControlFlow::Continue(())
}

/// Marks the connection closed and tells the controller, exactly once.
/// Both the read task and an explicit `disconnect` funnel through the same
/// state check, so whichever runs second is a no-op. The generation check
/// covers disconnect-then-reconnect: a read task whose own connection was
/// already replaced must not touch the newer one's state or writer. The
/// logout is best effort: if the transport already died, the write fails
/// silently.
async fn finish_connection(
    inner: &Arc<Mutex<Inner>>,
    events: &mpsc::Sender<MuxEvent>,
    writer: &mpsc::UnboundedSender<WriterCmd>,
    identity: &ClientIdentity,
    generation: u64,
) {
    {
        let mut inner = inner.lock().await;
        if inner.generation != generation || inner.state == ConnectionState::Disconnected {
            return;
        }
        inner.state = ConnectionState::Disconnected;
        inner.writer = None;
    }
    let _ = writer.send(WriterCmd::Request(logout_request(
        identity,
        "connection closed",
    )));
    let _ = writer.send(WriterCmd::Close);
    let _ = events.send(MuxEvent::ConnectionChanged(false)).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

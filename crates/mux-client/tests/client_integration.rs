//! Integration tests for the WebSocket protocol client.
//!
//! # Purpose
//!
//! Each test stands up a real WebSocket server on an ephemeral loopback
//! port, scripts the server side of one protocol exchange, and asserts on
//! the [`MuxEvent`]s the client reports. This exercises the pieces the
//! unit tests cannot: the login-first ordering, keep-alive, frame policy,
//! and close behaviour, over an actual socket.
//!
//! # Protocol recap
//!
//! ```text
//! client                                server
//! ──────                                ──────
//! (tcp + websocket upgrade)
//! client.login.request.A2M ───────────▶
//! ◀─────────── {type: …login…, ok:true}    ack
//! user.list.request.A2M ──────────────▶    roster request after login
//! ◀─────────────── user.list.notify.M2A
//! ◀────────────── server.ping.notify.M2A
//! client.pong.request.A2M ────────────▶
//! ```
//!
//! Fatal for the connection: a rejected login, a binary frame, an
//! oversized text frame. Merely dropped: malformed JSON, unknown types,
//! known types with missing fields.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use mux_client::infrastructure::network::{
    ClientIdentity, ConnectionState, MuxClient, MuxClientConfig, MuxEvent,
};
use mux_core::domain::roster::UserInfo;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

// ── Harness ───────────────────────────────────────────────────────────────────

fn test_config(port: u16) -> MuxClientConfig {
    MuxClientConfig {
        server_url: format!("ws://127.0.0.1:{port}"),
        identity: ClientIdentity {
            app_name: "TestApp".into(),
            app_version: "2.2.46".into(),
            app_build_date: "2026-02-05".into(),
            sdk_version: "2.2.35".into(),
            sdk_build_date: "2026-02-05".into(),
        },
        event_buffer: 64,
    }
}

/// Binds an ephemeral port and accepts exactly one WebSocket connection.
async fn one_shot_server() -> (u16, tokio::task::JoinHandle<WebSocketStream<TcpStream>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let accept = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        accept_async(stream).await.expect("websocket handshake")
    });
    (port, accept)
}

/// Reads the next text frame from the server side and parses it as JSON.
async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> serde_json::Value {
    loop {
        let frame = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .expect("frame ok");
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).expect("valid json"),
            Message::Close(_) => panic!("connection closed while expecting a frame"),
            _ => continue,
        }
    }
}

async fn next_event(events: &mut tokio::sync::mpsc::Receiver<MuxEvent>) -> MuxEvent {
    timeout(RECV_TIMEOUT, events.recv())
        .await
        .expect("event within timeout")
        .expect("event channel open")
}

// ── Handshake & keep-alive ────────────────────────────────────────────────────

/// The login request must be the first frame on the wire, and an accepted
/// login is followed by a roster request.
#[tokio::test]
async fn test_login_first_then_roster_request_after_ack() {
    let (port, accept) = one_shot_server().await;
    let (client, mut events) = MuxClient::new(test_config(port));

    client.connect().await.expect("connect");
    assert_eq!(next_event(&mut events).await, MuxEvent::ConnectionChanged(true));

    let mut ws = accept.await.expect("server task");

    // First frame: the login with the configured identity, camelCase keys.
    let login = next_json(&mut ws).await;
    assert_eq!(login["type"], "client.login.request.A2M");
    assert_eq!(login["appName"], "TestApp");
    assert_eq!(login["sdkVersion"], "2.2.35");

    // Ack it; the client follows up with a roster request.
    ws.send(Message::Text(
        r#"{"type":"client.login.request.A2M","ok":true}"#.into(),
    ))
    .await
    .expect("send ack");
    let roster_req = next_json(&mut ws).await;
    assert_eq!(roster_req["type"], "user.list.request.A2M");

    client.disconnect().await;
}

/// Keep-alive: a server ping is answered with a pong request without
/// anything surfacing on the event channel.
#[tokio::test]
async fn test_ping_is_answered_with_pong() {
    let (port, accept) = one_shot_server().await;
    let (client, mut events) = MuxClient::new(test_config(port));
    client.connect().await.expect("connect");
    let mut ws = accept.await.expect("server task");
    let _login = next_json(&mut ws).await;
    assert_eq!(next_event(&mut events).await, MuxEvent::ConnectionChanged(true));

    ws.send(Message::Text(r#"{"type":"server.ping.notify.M2A"}"#.into()))
        .await
        .expect("send ping");

    let pong = next_json(&mut ws).await;
    assert_eq!(pong["type"], "client.pong.request.A2M");
    client.disconnect().await;
}

/// A rejected login closes the connection; any other rejected request is
/// tolerated.
#[tokio::test]
async fn test_rejected_login_closes_the_connection() {
    let (port, accept) = one_shot_server().await;
    let (client, mut events) = MuxClient::new(test_config(port));
    client.connect().await.expect("connect");
    let mut ws = accept.await.expect("server task");
    let _login = next_json(&mut ws).await;
    assert_eq!(next_event(&mut events).await, MuxEvent::ConnectionChanged(true));

    ws.send(Message::Text(
        r#"{"type":"client.login.request.A2M","ok":false}"#.into(),
    ))
    .await
    .expect("send rejection");

    assert_eq!(
        next_event(&mut events).await,
        MuxEvent::ConnectionChanged(false)
    );
    assert_eq!(client.state().await, ConnectionState::Disconnected);
}

// ── Notification delivery ─────────────────────────────────────────────────────

/// Pointer and roster notifications come through as typed events, with the
/// wire's `user.list` records mapped into `UserInfo` values.
#[tokio::test]
async fn test_notifications_become_typed_events() {
    let (port, accept) = one_shot_server().await;
    let (client, mut events) = MuxClient::new(test_config(port));
    client.connect().await.expect("connect");
    let mut ws = accept.await.expect("server task");
    let _login = next_json(&mut ws).await;
    assert_eq!(next_event(&mut events).await, MuxEvent::ConnectionChanged(true));

    // Motion with integer coordinates, a button mask, and a roster.
    for frame in [
        r#"{"type":"pointer.motion.notify.M2A","hwid":16,"x":412,"y":96}"#,
        r#"{"type":"pointer.button.notify.M2A","hwid":16,"x":412.5,"y":96.5,"button":1}"#,
        r#"{"type":"user.list.notify.M2A","users":[{"id":1,"name":"alice","devices":[{"hwid":16,"type":"pointer"},{"hwid":32,"type":"keyboard"}]}]}"#,
    ] {
        ws.send(Message::Text(frame.into())).await.expect("send");
    }

    assert_eq!(
        next_event(&mut events).await,
        MuxEvent::MouseMotion {
            hwid: 16,
            x: 412.0,
            y: 96.0
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        MuxEvent::MouseButton {
            hwid: 16,
            x: 412.5,
            y: 96.5,
            mask: 1
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        MuxEvent::UserList(vec![UserInfo {
            user_id: 1,
            name: "alice".into(),
            hwid_mouse: 16,
            hwid_keyboard: 32,
        }])
    );
    client.disconnect().await;
}

/// A `user.changed` with the `map` action carries no payload; the client
/// responds by requesting a fresh roster instead of emitting an event.
#[tokio::test]
async fn test_user_changed_map_requests_fresh_roster() {
    let (port, accept) = one_shot_server().await;
    let (client, mut events) = MuxClient::new(test_config(port));
    client.connect().await.expect("connect");
    let mut ws = accept.await.expect("server task");
    let _login = next_json(&mut ws).await;
    assert_eq!(next_event(&mut events).await, MuxEvent::ConnectionChanged(true));

    ws.send(Message::Text(
        r#"{"type":"user.changed.notify.M2A","action":"map"}"#.into(),
    ))
    .await
    .expect("send");

    let refresh = next_json(&mut ws).await;
    assert_eq!(refresh["type"], "user.list.request.A2M");

    // A `dispose` action does surface, with absent hwids defaulting to -1.
    ws.send(Message::Text(
        r#"{"type":"user.changed.notify.M2A","action":"dispose","hwid_ms":16}"#.into(),
    ))
    .await
    .expect("send");
    assert_eq!(
        next_event(&mut events).await,
        MuxEvent::UserDisposed {
            hwid_mouse: 16,
            hwid_keyboard: -1
        }
    );
    client.disconnect().await;
}

// ── Frame policy ──────────────────────────────────────────────────────────────

/// Malformed JSON drops the single message; the session survives and the
/// next valid frame is delivered normally.
#[tokio::test]
async fn test_malformed_message_is_dropped_not_fatal() {
    let (port, accept) = one_shot_server().await;
    let (client, mut events) = MuxClient::new(test_config(port));
    client.connect().await.expect("connect");
    let mut ws = accept.await.expect("server task");
    let _login = next_json(&mut ws).await;
    assert_eq!(next_event(&mut events).await, MuxEvent::ConnectionChanged(true));

    for frame in [
        "{this is not json",
        r#"{"hwid":16,"x":1,"y":2}"#,
        r#"{"type":"pointer.teleport.notify.M2A"}"#,
        r#"{"type":"pointer.motion.notify.M2A","hwid":16}"#,
        r#"{"type":"pointer.motion.notify.M2A","hwid":16,"x":1,"y":2}"#,
    ] {
        ws.send(Message::Text(frame.into())).await.expect("send");
    }

    // Only the final, valid motion arrives.
    assert_eq!(
        next_event(&mut events).await,
        MuxEvent::MouseMotion {
            hwid: 16,
            x: 1.0,
            y: 2.0
        }
    );
    client.disconnect().await;
}

/// A binary frame violates the text-only protocol and closes the
/// connection.
#[tokio::test]
async fn test_binary_frame_is_fatal() {
    let (port, accept) = one_shot_server().await;
    let (client, mut events) = MuxClient::new(test_config(port));
    client.connect().await.expect("connect");
    let mut ws = accept.await.expect("server task");
    let _login = next_json(&mut ws).await;
    assert_eq!(next_event(&mut events).await, MuxEvent::ConnectionChanged(true));

    ws.send(Message::Binary(vec![0x01, 0x02, 0x03].into()))
        .await
        .expect("send binary");

    assert_eq!(
        next_event(&mut events).await,
        MuxEvent::ConnectionChanged(false)
    );
    assert_eq!(client.state().await, ConnectionState::Disconnected);
}

/// A text frame past the 64 KiB bound is fatal.
#[tokio::test]
async fn test_oversized_message_is_fatal() {
    let (port, accept) = one_shot_server().await;
    let (client, mut events) = MuxClient::new(test_config(port));
    client.connect().await.expect("connect");
    let mut ws = accept.await.expect("server task");
    let _login = next_json(&mut ws).await;
    assert_eq!(next_event(&mut events).await, MuxEvent::ConnectionChanged(true));

    // 70000 bytes of valid JSON, comfortably past the bound.
    let padding = "x".repeat(70_000);
    let oversized = format!(r#"{{"type":"pointer.motion.notify.M2A","pad":"{padding}"}}"#);
    ws.send(Message::Text(oversized.into()))
        .await
        .expect("send oversized");

    assert_eq!(
        next_event(&mut events).await,
        MuxEvent::ConnectionChanged(false)
    );
}

// ── Close behaviour ───────────────────────────────────────────────────────────

/// An explicit disconnect sends a best-effort logout before closing, and a
/// second disconnect is a silent no-op.
#[tokio::test]
async fn test_disconnect_sends_logout_and_is_idempotent() {
    let (port, accept) = one_shot_server().await;
    let (client, mut events) = MuxClient::new(test_config(port));
    client.connect().await.expect("connect");
    let mut ws = accept.await.expect("server task");
    let _login = next_json(&mut ws).await;
    assert_eq!(next_event(&mut events).await, MuxEvent::ConnectionChanged(true));

    client.disconnect().await;

    let logout = next_json(&mut ws).await;
    assert_eq!(logout["type"], "client.logout.request.A2M");
    assert_eq!(logout["appName"], "TestApp");
    assert_eq!(
        next_event(&mut events).await,
        MuxEvent::ConnectionChanged(false)
    );

    // Second disconnect: no second event.
    client.disconnect().await;
    assert!(events.try_recv().is_err());
}

/// A read task left over from a closed connection must not tear down a
/// newer one. The old server socket is held open across a disconnect and
/// reconnect, then dropped; the fresh connection has to stay `Open`, keep
/// its writer, and see no spurious close event.
#[tokio::test]
async fn test_lingering_reader_does_not_tear_down_reconnect() {
    // One listener, two sequential connections on the same port.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let (client, mut events) = MuxClient::new(test_config(port));

    let (connected, ws1) = timeout(
        RECV_TIMEOUT,
        futures_util::future::join(client.connect(), async {
            let (stream, _) = listener.accept().await.expect("accept first");
            accept_async(stream).await.expect("handshake first")
        }),
    )
    .await
    .expect("first connection within timeout");
    connected.expect("connect");
    let mut ws1 = ws1;
    let _login = next_json(&mut ws1).await;
    assert_eq!(next_event(&mut events).await, MuxEvent::ConnectionChanged(true));

    // Disconnect, but have the server sit on the old socket instead of
    // answering the close, so the first read task stays alive.
    client.disconnect().await;
    assert_eq!(
        next_event(&mut events).await,
        MuxEvent::ConnectionChanged(false)
    );

    let (reconnected, ws2) = timeout(
        RECV_TIMEOUT,
        futures_util::future::join(client.connect(), async {
            let (stream, _) = listener.accept().await.expect("accept second");
            accept_async(stream).await.expect("handshake second")
        }),
    )
    .await
    .expect("second connection within timeout");
    reconnected.expect("reconnect");
    let mut ws2 = ws2;
    let _login = next_json(&mut ws2).await;
    assert_eq!(next_event(&mut events).await, MuxEvent::ConnectionChanged(true));

    // Now let the first socket die and give its read task time to finish.
    drop(ws1);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(client.state().await, ConnectionState::Open);
    assert!(
        events.try_recv().is_err(),
        "stale reader must not emit a close event"
    );

    // The second connection's writer is still wired up: a ping round-trips.
    ws2.send(Message::Text(r#"{"type":"server.ping.notify.M2A"}"#.into()))
        .await
        .expect("send ping");
    let pong = next_json(&mut ws2).await;
    assert_eq!(pong["type"], "client.pong.request.A2M");

    client.disconnect().await;
}

/// A server-initiated shutdown notification closes the connection from the
/// client side.
#[tokio::test]
async fn test_server_shutdown_closes_the_connection() {
    let (port, accept) = one_shot_server().await;
    let (client, mut events) = MuxClient::new(test_config(port));
    client.connect().await.expect("connect");
    let mut ws = accept.await.expect("server task");
    let _login = next_json(&mut ws).await;
    assert_eq!(next_event(&mut events).await, MuxEvent::ConnectionChanged(true));

    ws.send(Message::Text(
        r#"{"type":"server.shutdown.notify.M2A","reason":"maintenance"}"#.into(),
    ))
    .await
    .expect("send shutdown");

    assert_eq!(
        next_event(&mut events).await,
        MuxEvent::ConnectionChanged(false)
    );
    assert_eq!(client.state().await, ConnectionState::Disconnected);
}

/// A session timeout surfaces the stop event before the close event.
#[tokio::test]
async fn test_timeout_stop_surfaces_then_closes() {
    let (port, accept) = one_shot_server().await;
    let (client, mut events) = MuxClient::new(test_config(port));
    client.connect().await.expect("connect");
    let mut ws = accept.await.expect("server task");
    let _login = next_json(&mut ws).await;
    assert_eq!(next_event(&mut events).await, MuxEvent::ConnectionChanged(true));

    ws.send(Message::Text(
        r#"{"type":"server.timeout.warning.notify.M2A","minutes":5}"#.into(),
    ))
    .await
    .expect("send warning");
    ws.send(Message::Text(
        r#"{"type":"server.timeout.stopped.notify.M2A"}"#.into(),
    ))
    .await
    .expect("send stop");

    assert_eq!(
        next_event(&mut events).await,
        MuxEvent::TimeoutWarning { minutes: 5 }
    );
    assert_eq!(
        next_event(&mut events).await,
        MuxEvent::TimeoutStopped {
            reason: "timeout".into()
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        MuxEvent::ConnectionChanged(false)
    );
}

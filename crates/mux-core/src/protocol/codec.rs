//! Decoding and encoding of protocol payloads.
//!
//! # Two-stage decode
//!
//! Inbound payloads are parsed to a `serde_json::Value` first, then into a
//! typed message. The intermediate stage exists because two checks must
//! happen before variant decoding:
//!
//! 1. The required `"type"` field — a payload without one is dropped as a
//!    unit, regardless of its other content.
//! 2. Acknowledgment detection — the server acks an app request by echoing
//!    the request's own type string (ending in `.A2M`) with an `ok` boolean.
//!    Ack payloads never match a [`ServerMessage`] variant, so they are
//!    peeled off here into [`Inbound::Ack`].
//!
//! Every error in this module is non-fatal to the connection: the transport
//! layer logs the failure and drops the single offending message. Fatal
//! conditions (oversized frames, wrong frame kind) are enforced at the frame
//! layer before bytes ever reach this codec.

use thiserror::Error;

use crate::protocol::messages::{ClientRequest, ServerMessage, REQUEST_SUFFIX};

/// Errors produced while decoding a single inbound payload.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload was not valid JSON, or not a JSON object.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The payload had no `type` string field.
    #[error("message has no 'type' field")]
    MissingType,

    /// The `type` string matched no known notification.
    #[error("unknown message type '{message_type}'")]
    UnknownType { message_type: String },

    /// The `type` was recognised but a required field was absent or of the
    /// wrong shape.
    #[error("message '{message_type}' is missing a required field: {detail}")]
    MissingField {
        message_type: String,
        detail: String,
    },
}

/// One decoded inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Acknowledgment of an app-initiated request: the echoed request type
    /// plus the server's verdict.
    Ack { request_type: String, ok: bool },
    /// A server-pushed notification.
    Notify(ServerMessage),
}

/// Wire type strings of every known notification, used to distinguish an
/// unknown type from a known type with missing fields.
const KNOWN_NOTIFY_TYPES: &[&str] = &[
    "pointer.motion.notify.M2A",
    "pointer.button.notify.M2A",
    "pointer.wheel.notify.M2A",
    "user.list.notify.M2A",
    "user.create.notify.M2A",
    "user.dispose.notify.M2A",
    "user.changed.notify.M2A",
    "keyboard.key.notify.M2A",
    "server.ping.notify.M2A",
    "server.shutdown.notify.M2A",
    "server.timeout.warning.notify.M2A",
    "server.timeout.stopped.notify.M2A",
];

/// Decodes one complete message payload into an [`Inbound`] value.
///
/// # Errors
///
/// All errors are per-message and non-fatal; see [`ProtocolError`].
pub fn decode_server_message(payload: &[u8]) -> Result<Inbound, ProtocolError> {
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    if !value.is_object() {
        return Err(ProtocolError::Malformed("payload is not an object".into()));
    }

    let message_type = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(ProtocolError::MissingType)?
        .to_string();

    // An echoed request type with an `ok` verdict is an acknowledgment.
    // An echoed request type *without* `ok` falls through and is reported
    // as unknown.
    if message_type.ends_with(REQUEST_SUFFIX) {
        if let Some(ok) = value.get("ok").and_then(|v| v.as_bool()) {
            return Ok(Inbound::Ack {
                request_type: message_type,
                ok,
            });
        }
    }

    if !KNOWN_NOTIFY_TYPES.contains(&message_type.as_str()) {
        return Err(ProtocolError::UnknownType { message_type });
    }

    match serde_json::from_value::<ServerMessage>(value) {
        Ok(msg) => Ok(Inbound::Notify(msg)),
        Err(e) => Err(ProtocolError::MissingField {
            message_type,
            detail: e.to_string(),
        }),
    }
}

/// Encodes an outbound request to its JSON text representation.
///
/// Serialization of these enums cannot fail (no non-string map keys, no
/// non-finite floats), so this returns `String` directly.
pub fn encode_request(request: &ClientRequest) -> String {
    serde_json::to_string(request).expect("ClientRequest serialization is infallible")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

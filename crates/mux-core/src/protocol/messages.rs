//! Typed message definitions for the input-mux JSON protocol.
//!
//! # JSON discriminant
//!
//! Every message is a JSON object with a `"type"` field that identifies the
//! variant. All other fields are flattened into the same object:
//!
//! ```json
//! {"type":"pointer.motion.notify.M2A","hwid":16,"x":412.0,"y":96}
//! ```
//!
//! Serde's `#[serde(tag = "type")]` attribute handles the tagging; the
//! variant renames carry the exact dotted type strings the server speaks.
//!
//! # Why separate inbound and outbound enums?
//!
//! The two directions carry different information: the server *pushes*
//! notifications (`.M2A`), the app *sends* requests (`.A2M`). Two distinct
//! enums make it a compile-time error to send a notification back to the
//! server or to decode a request as a notification.
//!
//! # Numeric coordinate fields
//!
//! Pointer coordinates arrive as either integers or reals depending on the
//! server build. They are declared as `f64` here; `serde_json` accepts both
//! JSON representations into an `f64` field.

use serde::{Deserialize, Serialize};

/// Upper bound on a single inbound message payload.
///
/// A frame that would grow the pending message past this bound is a fatal
/// protocol violation and closes the connection.
pub const MAX_INBOUND_MESSAGE_SIZE: usize = 64 * 1024;

/// Suffix shared by every app-initiated request type.
///
/// The server acknowledges a request by echoing the request's type string
/// (ending in this suffix) with an `ok` boolean added.
pub const REQUEST_SUFFIX: &str = ".A2M";

/// Wire type string of the login request, used to detect a rejected login
/// in the acknowledgment path.
pub const TYPE_LOGIN: &str = "client.login.request.A2M";

// ── Server → app notifications ────────────────────────────────────────────────

/// All notification messages the server can push to the app.
///
/// Acknowledgments of app-initiated requests are *not* represented here;
/// they are peeled off earlier in the decode path (see
/// [`crate::protocol::codec::Inbound::Ack`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// A pointer moved. Coordinates are physical screen pixels.
    #[serde(rename = "pointer.motion.notify.M2A")]
    Motion { hwid: i32, x: f64, y: f64 },

    /// A pointer button changed state.
    ///
    /// `button` is the six-bit transition mask defined in
    /// [`crate::domain::buttons`]: independent down/up bits for the left,
    /// right, and middle buttons.
    #[serde(rename = "pointer.button.notify.M2A")]
    Button {
        hwid: i32,
        x: f64,
        y: f64,
        button: u32,
    },

    /// A pointer wheel turned.
    ///
    /// `delta` is in raw wheel units (typically 120 per notch). `horizontal`
    /// is absent on older servers and defaults to vertical.
    #[serde(rename = "pointer.wheel.notify.M2A")]
    Wheel {
        hwid: i32,
        x: f64,
        y: f64,
        delta: i32,
        #[serde(default)]
        horizontal: bool,
    },

    /// Full roster of known users and their device associations.
    ///
    /// Delivered in response to a `user.list.request.A2M` and whenever the
    /// server decides to push a refresh. The receiver rebuilds its roster
    /// wholesale from this message.
    #[serde(rename = "user.list.notify.M2A")]
    UserList {
        #[serde(default)]
        users: Vec<UserRecord>,
    },

    /// A new user joined.
    #[serde(rename = "user.create.notify.M2A")]
    UserCreate {
        #[serde(default)]
        hwid_ms: i32,
        #[serde(default)]
        hwid_kb: i32,
        #[serde(default)]
        name: String,
        #[serde(rename = "userId", default)]
        user_id: i32,
    },

    /// A user left. Hardware ids default to -1 when absent.
    #[serde(rename = "user.dispose.notify.M2A")]
    UserDispose {
        #[serde(default = "absent_hwid")]
        hwid_ms: i32,
        #[serde(default = "absent_hwid")]
        hwid_kb: i32,
    },

    /// Incremental roster change carrying an `action` discriminant.
    ///
    /// `action` is one of `create`, `dispose`, or `map`. A `map` action
    /// (keyboard remapped between users) carries no usable payload; the
    /// receiver is expected to request a fresh roster instead of patching.
    #[serde(rename = "user.changed.notify.M2A")]
    UserChanged {
        action: String,
        #[serde(default = "absent_hwid")]
        hwid_ms: i32,
        #[serde(default = "absent_hwid")]
        hwid_kb: i32,
        #[serde(default)]
        name: String,
        #[serde(rename = "userId", default)]
        user_id: i32,
    },

    /// A keyboard key event.
    ///
    /// `vkey` is an opaque platform virtual-key value; `message` is the
    /// platform message kind from which down/up is derived (see
    /// [`crate::keymap::KeyAction::from_message`]).
    #[serde(rename = "keyboard.key.notify.M2A")]
    KeyboardKey {
        hwid: i32,
        vkey: u16,
        message: u32,
        scan: u32,
        flags: u32,
    },

    /// Server keep-alive probe. Must be answered immediately with
    /// [`ClientRequest::Pong`].
    #[serde(rename = "server.ping.notify.M2A")]
    Ping,

    /// The server is shutting down; the connection will not survive.
    #[serde(rename = "server.shutdown.notify.M2A")]
    Shutdown {
        #[serde(default)]
        reason: String,
    },

    /// The server session will time out soon.
    #[serde(rename = "server.timeout.warning.notify.M2A")]
    TimeoutWarning {
        #[serde(default)]
        minutes: i32,
    },

    /// The server session ended on a timeout. Closes the connection.
    #[serde(rename = "server.timeout.stopped.notify.M2A")]
    TimeoutStopped {
        #[serde(default = "default_timeout_reason")]
        reason: String,
    },
}

fn absent_hwid() -> i32 {
    -1
}

fn default_timeout_reason() -> String {
    "timeout".to_string()
}

/// One user entry inside a [`ServerMessage::UserList`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub devices: Vec<DeviceRecord>,
}

/// One device entry inside a [`UserRecord`].
///
/// `kind` is the wire `type` string: `"pointer"` or `"keyboard"`. Unknown
/// kinds are tolerated and ignored by the roster builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub hwid: i32,
    #[serde(rename = "type")]
    pub kind: String,
}

// ── App → server requests ─────────────────────────────────────────────────────

/// All requests the app can send to the server.
///
/// Each is acknowledged by the server echoing the request type with an `ok`
/// boolean; see [`crate::protocol::codec::Inbound::Ack`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientRequest {
    /// Handshake sent immediately after transport establishment.
    ///
    /// Carries app and companion-library identity; the field names are
    /// camelCase on the wire, as the server expects.
    #[serde(rename = "client.login.request.A2M")]
    Login {
        #[serde(rename = "appName")]
        app_name: String,
        #[serde(rename = "appVersion")]
        app_version: String,
        #[serde(rename = "appBuildDate")]
        app_build_date: String,
        #[serde(rename = "sdkVersion")]
        sdk_version: String,
        #[serde(rename = "sdkBuildDate")]
        sdk_build_date: String,
    },

    /// Best-effort goodbye sent before closing an `Open` connection.
    #[serde(rename = "client.logout.request.A2M")]
    Logout {
        #[serde(rename = "appName")]
        app_name: String,
        #[serde(rename = "appVersion")]
        app_version: String,
        #[serde(rename = "sdkVersion")]
        sdk_version: String,
        reason: String,
    },

    /// Reply to [`ServerMessage::Ping`].
    #[serde(rename = "client.pong.request.A2M")]
    Pong,

    /// Ask the server for a fresh [`ServerMessage::UserList`].
    #[serde(rename = "user.list.request.A2M")]
    UserList,

    /// Capture a pointer device: its events stop reaching the OS cursor and
    /// are delivered only over this connection.
    #[serde(rename = "pointer.capture.request.A2M")]
    Capture { hwid: i32 },

    /// Release a previous capture of a pointer device.
    #[serde(rename = "pointer.capture.release.request.A2M")]
    CaptureRelease { hwid: i32 },
}

impl ClientRequest {
    /// Returns the wire `type` string of this request, for matching against
    /// acknowledgment messages.
    pub fn wire_type(&self) -> &'static str {
        match self {
            ClientRequest::Login { .. } => TYPE_LOGIN,
            ClientRequest::Logout { .. } => "client.logout.request.A2M",
            ClientRequest::Pong => "client.pong.request.A2M",
            ClientRequest::UserList => "user.list.request.A2M",
            ClientRequest::Capture { .. } => "pointer.capture.request.A2M",
            ClientRequest::CaptureRelease { .. } => "pointer.capture.release.request.A2M",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! # mux-core
//!
//! Shared library for the input-mux client containing the JSON wire protocol,
//! domain entities, and key-code translation seams.
//!
//! This crate has zero dependencies on OS APIs, sockets, or async runtimes.
//! Everything here is pure data and pure functions, which keeps the protocol
//! and ownership logic unit-testable without a running server.
//!
//! # System overview
//!
//! An input-multiplexing server runs on the local machine and fans out events
//! from several physical mice and keyboards, each driven by a different
//! remote user. A host application connects to that server as a *client*,
//! arbitrates which device currently "owns" the application, and re-injects
//! the owner's events into its own windows.
//!
//! This crate defines:
//!
//! - **`protocol`** – The message-based wire format: JSON objects tagged by a
//!   `"type"` string, decoded into typed Rust enums, plus the codec that
//!   separates acknowledgment messages from server notifications.
//!
//! - **`domain`** – Pure business entities: the user roster (which mouse and
//!   keyboard belong to which user) and the button bitmask carried by
//!   pointer button events.
//!
//! - **`keymap`** – The opaque key-code value used on the wire and the
//!   host-supplied modifier classification seam. The core only ever needs
//!   down/up, modifier bits, and the opaque code.

pub mod domain;
pub mod keymap;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `mux_core::ServerMessage` instead of the full path.
pub use domain::buttons::{button_transitions, ButtonTransition, HeldButtons, MouseButton};
pub use domain::roster::{Roster, UserInfo, NO_DEVICE};
pub use keymap::{KeyAction, KeyCode, Modifier, ModifierMap, ModifierState, WindowsVkModifierMap};
pub use protocol::codec::{decode_server_message, encode_request, Inbound, ProtocolError};
pub use protocol::messages::{ClientRequest, ServerMessage, MAX_INBOUND_MESSAGE_SIZE};

//! Wire protocol for the input-mux server connection.
//!
//! Every message travelling in either direction is a single JSON object with
//! a required `"type"` string field. Server→app notification types end in
//! `.M2A`; app→server request types end in `.A2M`. The server acknowledges
//! each request by echoing the request's own type string back with an added
//! `ok` boolean.
//!
//! - [`messages`] defines the typed message enums and the wire type strings.
//! - [`codec`] decodes raw frame payloads into [`codec::Inbound`] values and
//!   encodes outbound requests.

pub mod codec;
pub mod messages;

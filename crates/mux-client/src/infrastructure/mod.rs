//! Infrastructure layer: the WebSocket protocol client and TOML
//! configuration.

pub mod config;
pub mod network;

//! Client for a local input-multiplexing server.
//!
//! The server multiplexes several physical mice and keyboards on one
//! machine and streams their events to interested apps over a local
//! WebSocket. This crate connects to it, arbitrates which remote device
//! currently *owns* the app's surfaces (first left click wins, explicit
//! release or departure gives it up), and injects the owner's events into
//! registered [`InjectionTarget`]s.
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//! use mux_client::application::controller::Tuning;
//! use mux_client::application::service::ControllerService;
//! use mux_client::application::targets::{mock::MockTarget, Rect};
//! use mux_client::infrastructure::config::AppConfig;
//! use mux_client::infrastructure::network::MuxClient;
//!
//! # async fn wire() -> anyhow::Result<()> {
//! let config = AppConfig::default();
//! let (client, events) = MuxClient::new(config.client_config());
//! let (service, handle, _notices) =
//!     ControllerService::new(client, events, config.controller.tuning());
//! tokio::spawn(service.run());
//!
//! let target = Arc::new(MockTarget::new(Rect::new(0.0, 0.0, 800.0, 600.0)));
//! handle.register_target(target).await?;
//! handle.set_enabled(true).await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`InjectionTarget`]: application::targets::InjectionTarget

pub mod application;
pub mod infrastructure;

pub use application::controller::{ControllerNotice, Tuning};
pub use application::hotkey::{ChordDetector, HotkeyDetector, ReleaseHotkey};
pub use application::service::{ControllerHandle, ControllerService};
pub use application::targets::{
    InjectionTarget, KeyEvent, PointerEvent, PointerEventKind, Rect, TargetId, WheelEvent,
};
pub use infrastructure::config::AppConfig;
pub use infrastructure::network::{ConnectionState, MuxClient, MuxEvent};

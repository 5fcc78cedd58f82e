//! Input-mux client entry point.
//!
//! Wires together the WebSocket protocol client and the controller task,
//! registers a pair of demo targets, then prints state changes until
//! Ctrl-C.
//!
//! # Demo targets
//!
//! The `MockTarget` instances registered here record injected events
//! instead of delivering them anywhere. A real host embeds this crate and
//! registers its own [`InjectionTarget`] implementations backed by actual
//! windows or views.
//!
//! [`InjectionTarget`]: mux_client::InjectionTarget

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mux_client::application::service::ControllerService;
use mux_client::application::targets::mock::MockTarget;
use mux_client::infrastructure::config::AppConfig;
use mux_client::infrastructure::network::MuxClient;
use mux_client::{ChordDetector, ControllerNotice, Rect};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // First CLI argument names the config file; defaults beside the binary.
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("mux-client.toml"));
    let config = AppConfig::load(&config_path)?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log.level.clone())),
        )
        .init();

    info!(config = %config_path.display(), "input-mux client starting");

    // ── Controller task ───────────────────────────────────────────────────────
    let (client, events) = MuxClient::new(config.client_config());
    let (service, handle, mut notices) =
        ControllerService::new(client, events, config.controller.tuning());
    tokio::spawn(service.run());

    handle
        .set_hotkey_detector(Box::new(ChordDetector::new(config.controller.release_hotkey)))
        .await?;
    if config.controller.block_native_input {
        handle.set_native_input_blocked(true).await?;
    }

    // ── Demo targets ──────────────────────────────────────────────────────────
    let primary = Arc::new(MockTarget::new(Rect::new(0.0, 0.0, 1280.0, 720.0)));
    let sidebar = Arc::new(MockTarget::new(Rect::new(1280.0, 0.0, 320.0, 720.0)));
    handle.register_target(primary.clone()).await?;
    handle.register_target(sidebar).await?;

    if let Err(e) = handle.set_enabled(true).await {
        error!(error = %e, "initial enable failed");
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_handle.shutdown().await;
        }
    });

    // ── Notice loop ───────────────────────────────────────────────────────────
    info!("input-mux client ready");

    while let Some(notice) = notices.recv().await {
        match notice {
            ControllerNotice::ConnectionChanged(connected) => {
                info!(connected, "server connection changed");
            }
            ControllerNotice::OwnershipChanged { hwid, name } => {
                if hwid < 0 {
                    info!("surface released");
                } else if name.is_empty() {
                    info!(hwid, "surface owned by unnamed device");
                } else {
                    info!(hwid, %name, "surface owned");
                }
                info!(
                    injected = primary.pointer_events().len(),
                    "events recorded by primary target so far"
                );
            }
            ControllerNotice::CaptureChanged(captured) => {
                info!(captured, "pointer capture changed");
            }
            ControllerNotice::HotkeyTriggered => {
                info!("release hotkey pressed, dropping ownership");
                handle.release_ownership().await?;
            }
            ControllerNotice::TimeoutWarning { minutes } => {
                warn!(minutes, "server session times out soon");
            }
            ControllerNotice::TimeoutStopped { reason } => {
                warn!(%reason, "server session stopped");
            }
        }
    }

    info!("input-mux client stopped");
    Ok(())
}

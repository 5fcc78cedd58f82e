//! The coordinating controller task.
//!
//! All controller state lives inside one task that owns the
//! [`ControllerCore`]; network events, host commands, and outbound requests
//! meet in its select loop, so no lock ever guards controller state. Hosts
//! talk to the task through a cloneable [`ControllerHandle`].

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use mux_core::protocol::messages::ClientRequest;

use crate::application::controller::{ControllerCore, ControllerNotice, Tuning};
use crate::application::hotkey::HotkeyDetector;
use crate::application::targets::{InjectionTarget, TargetId};
use crate::infrastructure::network::{MuxClient, MuxEvent};

const COMMAND_BUFFER: usize = 32;

/// Commands a host can send to the controller task.
pub enum ControllerCommand {
    /// Connect to (`true`) or disconnect from (`false`) the server.
    SetEnabled(bool),
    SetNativeInputBlocked(bool),
    RegisterTarget(Arc<dyn InjectionTarget>, oneshot::Sender<TargetId>),
    UnregisterTarget(TargetId),
    CaptureOwner(oneshot::Sender<bool>),
    ReleaseCapture(oneshot::Sender<bool>),
    ReleaseOwnership,
    SetHotkeyDetector(Box<dyn HotkeyDetector>),
    QueryOwner(oneshot::Sender<Option<i32>>),
    Shutdown,
}

/// Cloneable host-side handle to the controller task.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<ControllerCommand>,
}

impl ControllerHandle {
    pub async fn set_enabled(&self, enabled: bool) -> anyhow::Result<()> {
        self.send(ControllerCommand::SetEnabled(enabled)).await
    }

    pub async fn set_native_input_blocked(&self, blocked: bool) -> anyhow::Result<()> {
        self.send(ControllerCommand::SetNativeInputBlocked(blocked))
            .await
    }

    pub async fn register_target(
        &self,
        target: Arc<dyn InjectionTarget>,
    ) -> anyhow::Result<TargetId> {
        let (tx, rx) = oneshot::channel();
        self.send(ControllerCommand::RegisterTarget(target, tx))
            .await?;
        rx.await.context("controller task stopped")
    }

    pub async fn unregister_target(&self, id: TargetId) -> anyhow::Result<()> {
        self.send(ControllerCommand::UnregisterTarget(id)).await
    }

    /// Engages server-side capture of the current owner's pointer.
    pub async fn capture_owner(&self) -> anyhow::Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(ControllerCommand::CaptureOwner(tx)).await?;
        rx.await.context("controller task stopped")
    }

    pub async fn release_capture(&self) -> anyhow::Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(ControllerCommand::ReleaseCapture(tx)).await?;
        rx.await.context("controller task stopped")
    }

    pub async fn release_ownership(&self) -> anyhow::Result<()> {
        self.send(ControllerCommand::ReleaseOwnership).await
    }

    pub async fn set_hotkey_detector(
        &self,
        detector: Box<dyn HotkeyDetector>,
    ) -> anyhow::Result<()> {
        self.send(ControllerCommand::SetHotkeyDetector(detector))
            .await
    }

    pub async fn owner_hwid(&self) -> anyhow::Result<Option<i32>> {
        let (tx, rx) = oneshot::channel();
        self.send(ControllerCommand::QueryOwner(tx)).await?;
        rx.await.context("controller task stopped")
    }

    /// Stops the controller task, disconnecting first.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.send(ControllerCommand::Shutdown).await
    }

    async fn send(&self, command: ControllerCommand) -> anyhow::Result<()> {
        self.commands
            .send(command)
            .await
            .ok()
            .context("controller task stopped")
    }
}

/// The controller task itself. Construct it, keep the handle and notice
/// receiver, and `tokio::spawn(service.run())`.
pub struct ControllerService {
    core: ControllerCore,
    client: MuxClient,
    events: mpsc::Receiver<MuxEvent>,
    commands: mpsc::Receiver<ControllerCommand>,
    requests: mpsc::UnboundedReceiver<ClientRequest>,
}

impl ControllerService {
    pub fn new(
        client: MuxClient,
        events: mpsc::Receiver<MuxEvent>,
        tuning: Tuning,
    ) -> (
        Self,
        ControllerHandle,
        mpsc::UnboundedReceiver<ControllerNotice>,
    ) {
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (request_tx, requests) = mpsc::unbounded_channel();
        let (notice_tx, notices) = mpsc::unbounded_channel();
        let core = ControllerCore::new(request_tx, notice_tx, tuning);
        (
            Self {
                core,
                client,
                events,
                commands,
                requests,
            },
            ControllerHandle {
                commands: command_tx,
            },
            notices,
        )
    }

    /// Runs until [`ControllerCommand::Shutdown`] arrives or every handle
    /// is dropped.
    pub async fn run(mut self) {
        info!("controller task started");
        loop {
            tokio::select! {
                Some(request) = self.requests.recv() => {
                    self.client.send_request(request).await;
                }
                Some(event) = self.events.recv() => {
                    self.handle_event(event);
                }
                command = self.commands.recv() => {
                    match command {
                        Some(ControllerCommand::Shutdown) | None => break,
                        Some(command) => self.handle_command(command).await,
                    }
                }
            }
        }
        self.client.disconnect().await;
        info!("controller task stopped");
    }

    fn handle_event(&mut self, event: MuxEvent) {
        let now = Instant::now();
        match event {
            MuxEvent::ConnectionChanged(connected) => {
                self.core.handle_connection_changed(connected);
            }
            MuxEvent::MouseMotion { hwid, x, y } => self.core.handle_motion(hwid, x, y, now),
            MuxEvent::MouseButton { hwid, x, y, mask } => {
                self.core.handle_button(hwid, x, y, mask, now);
            }
            MuxEvent::MouseWheel {
                hwid,
                x,
                y,
                delta,
                horizontal,
            } => self.core.handle_wheel(hwid, x, y, delta, horizontal, now),
            MuxEvent::KeyboardKey {
                hwid,
                vkey,
                message,
                scan,
                flags,
            } => self.core.handle_keyboard(hwid, vkey, message, scan, flags, now),
            MuxEvent::UserList(users) => self.core.handle_user_list(users),
            MuxEvent::UserCreated(user) => self.core.handle_user_created(user),
            MuxEvent::UserDisposed {
                hwid_mouse,
                hwid_keyboard,
            } => self.core.handle_user_disposed(hwid_mouse, hwid_keyboard),
            MuxEvent::TimeoutWarning { minutes } => self.core.handle_timeout_warning(minutes),
            MuxEvent::TimeoutStopped { reason } => self.core.handle_timeout_stopped(reason),
        }
    }

    async fn handle_command(&mut self, command: ControllerCommand) {
        match command {
            ControllerCommand::SetEnabled(true) => {
                if let Err(e) = self.client.connect().await {
                    warn!(error = %e, "enable failed, staying disconnected");
                }
            }
            ControllerCommand::SetEnabled(false) => self.client.disconnect().await,
            ControllerCommand::SetNativeInputBlocked(blocked) => {
                self.core.set_native_input_blocked(blocked);
            }
            ControllerCommand::RegisterTarget(target, reply) => {
                let id = self.core.register_target(target);
                let _ = reply.send(id);
            }
            ControllerCommand::UnregisterTarget(id) => {
                if !self.core.unregister_target(id) {
                    debug!("unregister of stale target id ignored");
                }
            }
            ControllerCommand::CaptureOwner(reply) => {
                let _ = reply.send(self.core.capture_owner());
            }
            ControllerCommand::ReleaseCapture(reply) => {
                let _ = reply.send(self.core.release_capture());
            }
            ControllerCommand::ReleaseOwnership => self.core.release_ownership(),
            ControllerCommand::SetHotkeyDetector(detector) => {
                self.core.set_hotkey_detector(detector);
            }
            ControllerCommand::QueryOwner(reply) => {
                let _ = reply.send(self.core.owner_hwid());
            }
            ControllerCommand::Shutdown => unreachable!("handled in run loop"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::targets::{mock::MockTarget, Rect};
    use crate::infrastructure::network::{ClientIdentity, MuxClientConfig};
    use mux_core::domain::buttons::LEFT_DOWN;

    fn unconnected_client() -> MuxClient {
        let (client, _events) = MuxClient::new(MuxClientConfig {
            server_url: "ws://localhost:41001".to_string(),
            identity: ClientIdentity {
                app_name: "test".into(),
                app_version: "0".into(),
                app_build_date: "-".into(),
                sdk_version: "0".into(),
                sdk_build_date: "-".into(),
            },
            event_buffer: 16,
        });
        client
    }

    #[tokio::test]
    async fn test_events_drive_core_through_the_task() {
        // Arrange: service fed from a hand-held event channel
        let (event_tx, event_rx) = mpsc::channel(16);
        let (service, handle, mut notices) =
            ControllerService::new(unconnected_client(), event_rx, Tuning::default());
        tokio::spawn(service.run());

        let target = Arc::new(MockTarget::new(Rect::new(0.0, 0.0, 800.0, 600.0)));
        let id = handle.register_target(target.clone()).await.unwrap();

        // Act: a remote left click arrives
        event_tx
            .send(MuxEvent::MouseButton {
                hwid: 0x10,
                x: 100.0,
                y: 100.0,
                mask: LEFT_DOWN,
            })
            .await
            .unwrap();

        // Assert: ownership claimed and the click injected
        let notice = notices.recv().await.unwrap();
        assert!(matches!(
            notice,
            ControllerNotice::OwnershipChanged { hwid: 0x10, .. }
        ));
        assert_eq!(handle.owner_hwid().await.unwrap(), Some(0x10));
        assert_eq!(target.pointer_events().len(), 1);

        handle.unregister_target(id).await.unwrap();
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_fails_after_shutdown() {
        let (_event_tx, event_rx) = mpsc::channel(16);
        let (service, handle, _notices) =
            ControllerService::new(unconnected_client(), event_rx, Tuning::default());
        let task = tokio::spawn(service.run());

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(handle.owner_hwid().await.is_err());
    }

    #[tokio::test]
    async fn test_capture_without_owner_reports_false() {
        let (_event_tx, event_rx) = mpsc::channel(16);
        let (service, handle, _notices) =
            ControllerService::new(unconnected_client(), event_rx, Tuning::default());
        tokio::spawn(service.run());

        assert!(!handle.capture_owner().await.unwrap());
    }
}

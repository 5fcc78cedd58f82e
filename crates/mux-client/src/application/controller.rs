//! Ownership arbitration and event injection.
//!
//! [`ControllerCore`] is the heart of the client: it decides which remote
//! pointer owns the local input surface, throttles and coalesces motion,
//! routes keyboard events through the roster, and injects the resulting
//! synthesized events into registered targets.
//!
//! The core is deliberately synchronous and free of clocks: every
//! time-sensitive entry point takes `now: Instant` from the caller, so the
//! async service passes `Instant::now()` while tests drive synthetic time.
//! Outbound protocol requests and state-change notices leave through
//! channels handed in at construction; the core never touches the network.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use mux_core::domain::buttons::{self, button_transitions, HeldButtons, MouseButton};
use mux_core::domain::roster::{Roster, UserInfo, NO_DEVICE};
use mux_core::keymap::{KeyAction, KeyCode, ModifierMap, ModifierState, WindowsVkModifierMap};
use mux_core::protocol::messages::ClientRequest;

use crate::application::hotkey::HotkeyDetector;
use crate::application::targets::{
    InjectionTarget, KeyEvent, PointerEvent, PointerEventKind, TargetId, TargetRegistry,
    WheelEvent,
};

// ── Tuning ────────────────────────────────────────────────────────────────────

/// Timing and scaling knobs of the controller.
///
/// The defaults reproduce the behaviour of the original servers' companion
/// apps; configuration may override any of them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    /// Minimum interval between injected motion events per owner. Motion
    /// arriving faster is coalesced into a single pending position.
    pub motion_throttle: Duration,

    /// Minimum interval between roster refresh requests triggered by
    /// keyboard events from unknown devices.
    pub roster_refresh_min_interval: Duration,

    /// How long a target's pipeline must continuously report pending events
    /// before it is reset.
    pub stuck_pipeline_dwell: Duration,

    /// Host scroll units per raw wheel unit (raw units are 120 per notch).
    pub wheel_scale: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            motion_throttle: Duration::from_millis(16),
            roster_refresh_min_interval: Duration::from_secs(2),
            stuck_pipeline_dwell: Duration::from_millis(300),
            wheel_scale: 40.0 / 120.0,
        }
    }
}

// ── Notices ───────────────────────────────────────────────────────────────────

/// State changes the controller reports to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerNotice {
    /// The protocol connection opened or closed. Always followed by the
    /// capture/ownership notices of the accompanying state reset, in that
    /// order.
    ConnectionChanged(bool),

    /// The owning device changed. `hwid` is [`NO_DEVICE`] and `name` empty
    /// when ownership was cleared.
    OwnershipChanged { hwid: i32, name: String },

    /// Pointer capture was engaged or released.
    CaptureChanged(bool),

    /// The release hotkey chord completed; the event was consumed instead
    /// of injected.
    HotkeyTriggered,

    /// The server announced the session will time out soon.
    TimeoutWarning { minutes: i32 },

    /// The server ended the session on a timeout.
    TimeoutStopped { reason: String },
}

// ── Core ──────────────────────────────────────────────────────────────────────

/// Coalesced motion waiting for the throttle window to pass.
#[derive(Debug, Clone, Copy)]
struct PendingMotion {
    x: f64,
    y: f64,
}

/// The ownership and injection state machine.
pub struct ControllerCore {
    registry: TargetRegistry,
    roster: Roster,

    /// Mouse hwid of the current owner, if any.
    owner: Option<i32>,
    /// Whether the owner's pointer is captured server-side.
    captured: bool,
    held: HeldButtons,
    pressed_keys: HashSet<KeyCode>,
    /// Last known physical screen position per mouse hwid, owners and
    /// bystanders alike.
    positions: HashMap<i32, (f64, f64)>,

    pending_motion: Option<PendingMotion>,
    last_motion_inject: Option<Instant>,
    last_roster_request: Option<Instant>,
    /// Target whose pipeline reported pending events, and since when.
    stuck_since: Option<(TargetId, Instant)>,

    native_blocked: bool,
    tuning: Tuning,
    modifier_map: Box<dyn ModifierMap>,
    hotkey: Option<Box<dyn HotkeyDetector>>,

    requests: mpsc::UnboundedSender<ClientRequest>,
    notices: mpsc::UnboundedSender<ControllerNotice>,
}

impl ControllerCore {
    pub fn new(
        requests: mpsc::UnboundedSender<ClientRequest>,
        notices: mpsc::UnboundedSender<ControllerNotice>,
        tuning: Tuning,
    ) -> Self {
        Self {
            registry: TargetRegistry::new(),
            roster: Roster::new(),
            owner: None,
            captured: false,
            held: HeldButtons::default(),
            pressed_keys: HashSet::new(),
            positions: HashMap::new(),
            pending_motion: None,
            last_motion_inject: None,
            last_roster_request: None,
            stuck_since: None,
            native_blocked: false,
            tuning,
            modifier_map: Box::new(WindowsVkModifierMap),
            hotkey: None,
            requests,
            notices,
        }
    }

    /// Replaces the modifier classification table (platform seam).
    pub fn set_modifier_map(&mut self, map: Box<dyn ModifierMap>) {
        self.modifier_map = map;
    }

    pub fn set_hotkey_detector(&mut self, detector: Box<dyn HotkeyDetector>) {
        self.hotkey = Some(detector);
    }

    pub fn owner_hwid(&self) -> Option<i32> {
        self.owner
    }

    pub fn is_captured(&self) -> bool {
        self.captured
    }

    pub fn held_buttons(&self) -> HeldButtons {
        self.held
    }

    // ── Target management ─────────────────────────────────────────────────

    pub fn register_target(&mut self, target: Arc<dyn InjectionTarget>) -> TargetId {
        if self.native_blocked {
            target.set_native_input_blocked(true);
        }
        self.registry.register(target)
    }

    /// Unregisters a target; stale ids are tolerated.
    pub fn unregister_target(&mut self, id: TargetId) -> bool {
        if matches!(self.stuck_since, Some((stuck, _)) if stuck == id) {
            self.stuck_since = None;
        }
        self.registry.unregister(id)
    }

    /// Toggles native-input suppression on every registered target and on
    /// targets registered later.
    pub fn set_native_input_blocked(&mut self, blocked: bool) {
        self.native_blocked = blocked;
        for (_, target) in self.registry.iter() {
            target.set_native_input_blocked(blocked);
        }
    }

    // ── Ownership & capture ───────────────────────────────────────────────

    /// Captures the current owner's pointer server-side. Returns `false`
    /// when there is no owner or capture is already engaged.
    pub fn capture_owner(&mut self) -> bool {
        let Some(owner) = self.owner else {
            debug!("capture requested with no owner");
            return false;
        };
        if self.captured {
            return false;
        }
        self.send(ClientRequest::Capture { hwid: owner });
        self.captured = true;
        self.notify(ControllerNotice::CaptureChanged(true));
        true
    }

    /// Releases a previously engaged capture. Returns `false` when no
    /// capture was engaged or the owner vanished before release.
    pub fn release_capture(&mut self) -> bool {
        if !self.captured {
            return false;
        }
        self.captured = false;
        let released = if let Some(owner) = self.owner {
            self.send(ClientRequest::CaptureRelease { hwid: owner });
            true
        } else {
            false
        };
        self.notify(ControllerNotice::CaptureChanged(false));
        released
    }

    /// Explicitly drops ownership, releasing capture first when engaged.
    pub fn release_ownership(&mut self) {
        if self.captured {
            self.release_capture();
        }
        if self.owner.take().is_some() {
            self.held.clear();
            self.pending_motion = None;
            self.notify_ownership();
        }
    }

    // ── Connection lifecycle ──────────────────────────────────────────────

    /// Resets all per-connection state. Runs on both connect and disconnect
    /// so a reconnect never inherits stale ownership, capture, or roster.
    pub fn handle_connection_changed(&mut self, connected: bool) {
        info!(connected, "connection state changed, resetting");
        let had_capture = self.captured;
        let had_owner = self.owner.is_some();

        self.owner = None;
        self.captured = false;
        self.held.clear();
        self.pressed_keys.clear();
        self.positions.clear();
        self.pending_motion = None;
        self.last_motion_inject = None;
        self.last_roster_request = None;
        self.stuck_since = None;
        self.roster.clear();

        self.notify(ControllerNotice::ConnectionChanged(connected));
        if had_capture {
            self.notify(ControllerNotice::CaptureChanged(false));
        }
        if had_owner {
            self.notify_ownership();
        }
    }

    // ── Pointer events ────────────────────────────────────────────────────

    /// Remote pointer motion. Non-owner motion only updates bookkeeping;
    /// owner motion is throttled and coalesced before injection.
    pub fn handle_motion(&mut self, hwid: i32, x: f64, y: f64, now: Instant) {
        self.positions.insert(hwid, (x, y));
        let Some(owner) = self.owner else { return };
        if hwid != owner {
            return;
        }

        if let Some(last) = self.last_motion_inject {
            if now.duration_since(last) < self.tuning.motion_throttle {
                self.pending_motion = Some(PendingMotion { x, y });
                return;
            }
        }
        self.pending_motion = None;
        self.last_motion_inject = Some(now);
        self.inject_pointer(PointerEventKind::Move, None, x, y, now);
    }

    /// Remote button transition mask.
    ///
    /// A left-button-down from a bystander while no one owns the surface
    /// claims ownership — optimistically even when the click misses every
    /// visible target, as long as at least one target is registered. Other
    /// transitions from non-owners are ignored beyond position bookkeeping.
    pub fn handle_button(&mut self, hwid: i32, x: f64, y: f64, mask: u32, now: Instant) {
        // Coalesced motion must land before the click so the button event
        // arrives at the position the remote user last saw.
        if self.owner == Some(hwid) {
            self.flush_pending_motion(now);
        }
        self.positions.insert(hwid, (x, y));

        if self.owner.is_none() && mask & buttons::LEFT_DOWN != 0 {
            if self.registry.is_empty() {
                debug!(hwid, "click with no registered targets, ignoring");
                return;
            }
            if self.hit_test(x, y).is_none() {
                debug!(hwid, x, y, "click missed every visible target, claiming optimistically");
            }
            self.owner = Some(hwid);
            self.notify_ownership();
        }

        let Some(owner) = self.owner else { return };
        if hwid != owner {
            return;
        }

        for transition in button_transitions(mask) {
            self.held.apply(transition);
            let kind = if transition.pressed {
                PointerEventKind::ButtonDown
            } else {
                PointerEventKind::ButtonUp
            };
            self.inject_pointer(kind, Some(transition.button), x, y, now);
        }
    }

    /// Remote wheel turn. Owner-only; raw delta is scaled to host scroll
    /// units and split into the axis the `horizontal` flag selects.
    pub fn handle_wheel(&mut self, hwid: i32, x: f64, y: f64, delta: i32, horizontal: bool, now: Instant) {
        self.positions.insert(hwid, (x, y));
        let Some(owner) = self.owner else { return };
        if hwid != owner {
            return;
        }

        let Some(id) = self.pointer_target(x, y) else {
            debug!("wheel event with no target to receive it");
            return;
        };
        let Some(target) = self.registry.get(id).cloned() else {
            return;
        };
        self.maybe_reset_pipeline(id, target.as_ref(), now);

        let scale = target.scale_factor();
        let (sx, sy) = (x / scale, y / scale);
        let bounds = target.bounds();
        let scroll = delta as f32 * self.tuning.wheel_scale;
        let (delta_x, delta_y) = if horizontal { (scroll, 0.0) } else { (0.0, scroll) };

        target.forward_wheel(WheelEvent {
            local_x: sx - bounds.x,
            local_y: sy - bounds.y,
            screen_x: sx,
            screen_y: sy,
            delta_x,
            delta_y,
            held: self.held,
        });
    }

    // ── Keyboard events ───────────────────────────────────────────────────

    /// Remote keyboard event.
    ///
    /// The keyboard hwid is resolved to its user's mouse hwid through the
    /// roster; only the owner's keyboard is injected. An unknown keyboard
    /// triggers a rate-limited roster refresh and the event is dropped.
    /// Repeat key-downs (key already in the pressed set) are accepted and
    /// injected like any other down.
    pub fn handle_keyboard(
        &mut self,
        hwid: i32,
        vkey: u16,
        message: u32,
        scan: u32,
        flags: u32,
        now: Instant,
    ) {
        let Some(owner) = self.owner else {
            debug!(hwid, "keyboard event with no owner, dropping");
            return;
        };
        let Some(mouse_hwid) = self.roster.mouse_for_keyboard(hwid) else {
            debug!(hwid, "keyboard hwid not in roster, requesting refresh");
            self.request_roster_refresh(now);
            return;
        };
        if mouse_hwid != owner {
            return;
        }
        let Some(action) = KeyAction::from_message(message) else {
            debug!(message, "unhandled keyboard message kind, dropping");
            return;
        };

        let key = KeyCode(vkey);
        match action {
            KeyAction::Down => {
                if !self.pressed_keys.insert(key) {
                    debug!(vkey, "repeat key-down accepted");
                }
            }
            KeyAction::Up => {
                self.pressed_keys.remove(&key);
            }
        }

        let modifiers = ModifierState::from_pressed(&self.pressed_keys, self.modifier_map.as_ref());
        if let Some(detector) = self.hotkey.as_mut() {
            if detector.on_key(key, modifiers, action) {
                info!("hotkey chord consumed keyboard event");
                self.notify(ControllerNotice::HotkeyTriggered);
                return;
            }
        }

        // Keyboard has no position to hit-test; any registered target will do.
        let Some((_, target)) = self.registry.first() else {
            debug!("keyboard event with no registered target");
            return;
        };
        let target = target.clone();
        target.focus();
        target.forward_key(KeyEvent {
            key,
            action,
            modifiers,
            scan,
            flags,
        });
    }

    // ── Roster events ─────────────────────────────────────────────────────

    /// Full roster replacement. Re-announces ownership so listeners pick up
    /// a name that may have been unknown when ownership was claimed.
    pub fn handle_user_list(&mut self, users: Vec<UserInfo>) {
        debug!(count = users.len(), "roster replaced");
        self.roster.replace(users);
        if self.owner.is_some() {
            self.notify_ownership();
        }
    }

    pub fn handle_user_created(&mut self, user: UserInfo) {
        let affects_owner = self.owner == Some(user.hwid_mouse);
        self.roster.insert(user);
        if affects_owner {
            self.notify_ownership();
        }
    }

    /// A user left. When the departing user owned the surface, ownership
    /// and capture are torn down locally; no release request is sent for a
    /// device that no longer exists.
    pub fn handle_user_disposed(&mut self, hwid_mouse: i32, hwid_keyboard: i32) {
        self.roster.remove(hwid_mouse, hwid_keyboard);
        self.positions.remove(&hwid_mouse);

        if self.owner == Some(hwid_mouse) {
            info!(hwid_mouse, "owner disposed, releasing ownership");
            if self.captured {
                self.captured = false;
                self.notify(ControllerNotice::CaptureChanged(false));
            }
            self.owner = None;
            self.held.clear();
            self.pressed_keys.clear();
            self.pending_motion = None;
            self.notify_ownership();
        }
    }

    // ── Session events ────────────────────────────────────────────────────

    pub fn handle_timeout_warning(&mut self, minutes: i32) {
        warn!(minutes, "server session timeout warning");
        self.notify(ControllerNotice::TimeoutWarning { minutes });
    }

    pub fn handle_timeout_stopped(&mut self, reason: String) {
        warn!(%reason, "server session stopped");
        self.notify(ControllerNotice::TimeoutStopped { reason });
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn send(&self, request: ClientRequest) {
        if self.requests.send(request).is_err() {
            debug!("request channel closed, dropping outbound request");
        }
    }

    fn notify(&self, notice: ControllerNotice) {
        if self.notices.send(notice).is_err() {
            debug!("notice channel closed, dropping notice");
        }
    }

    fn notify_ownership(&self) {
        let (hwid, name) = match self.owner {
            Some(hwid) => (hwid, self.roster.name_for_mouse(hwid)),
            None => (NO_DEVICE, String::new()),
        };
        info!(hwid, %name, "ownership changed");
        self.notify(ControllerNotice::OwnershipChanged { hwid, name });
    }

    fn request_roster_refresh(&mut self, now: Instant) {
        let due = self
            .last_roster_request
            .map_or(true, |last| now.duration_since(last) >= self.tuning.roster_refresh_min_interval);
        if due {
            self.last_roster_request = Some(now);
            self.send(ClientRequest::UserList);
        } else {
            debug!("roster refresh suppressed by rate limit");
        }
    }

    /// Finds the visible target whose bounds contain the physical screen
    /// point. The point is converted once, through the first visible
    /// target's scale factor; with mismatched per-monitor scales the
    /// conversion can be wrong for the other targets, which is what makes
    /// the optimistic claim fallback necessary.
    fn hit_test(&self, x: f64, y: f64) -> Option<TargetId> {
        let (_, first) = self.registry.first_visible()?;
        let scale = first.scale_factor();
        let (dx, dy) = (x / scale, y / scale);
        self.registry
            .iter()
            .find(|(_, target)| target.is_visible() && target.bounds().contains(dx, dy))
            .map(|(id, _)| id)
    }

    /// Target selection for positioned events: hit-test first, then the
    /// first visible target, then any registered target at all.
    fn pointer_target(&self, x: f64, y: f64) -> Option<TargetId> {
        self.hit_test(x, y)
            .or_else(|| self.registry.first_visible().map(|(id, _)| id))
            .or_else(|| self.registry.first().map(|(id, _)| id))
    }

    fn flush_pending_motion(&mut self, now: Instant) {
        if let Some(pending) = self.pending_motion.take() {
            self.last_motion_inject = Some(now);
            self.inject_pointer(PointerEventKind::Move, None, pending.x, pending.y, now);
        }
    }

    fn inject_pointer(
        &mut self,
        kind: PointerEventKind,
        button: Option<MouseButton>,
        x: f64,
        y: f64,
        now: Instant,
    ) {
        let Some(id) = self.pointer_target(x, y) else {
            debug!("pointer event with no target to receive it");
            return;
        };
        let Some(target) = self.registry.get(id).cloned() else {
            return;
        };
        self.maybe_reset_pipeline(id, target.as_ref(), now);

        let scale = target.scale_factor();
        let (sx, sy) = (x / scale, y / scale);
        let bounds = target.bounds();

        target.focus();
        target.forward_pointer(PointerEvent {
            kind,
            button,
            local_x: sx - bounds.x,
            local_y: sy - bounds.y,
            screen_x: sx,
            screen_y: sy,
            held: self.held,
        });
    }

    /// Stuck-pipeline watchdog. A target continuously reporting pending
    /// events for the dwell interval gets its pipeline reset; the dwell
    /// clock restarts whenever the pipeline drains or another target is
    /// observed instead.
    fn maybe_reset_pipeline(&mut self, id: TargetId, target: &dyn InjectionTarget, now: Instant) {
        if target.has_pending_events() {
            match self.stuck_since {
                Some((stuck_id, since)) if stuck_id == id => {
                    if now.duration_since(since) >= self.tuning.stuck_pipeline_dwell {
                        warn!("target input pipeline stuck, resetting");
                        target.reset_pipeline();
                        self.stuck_since = None;
                    }
                }
                _ => self.stuck_since = Some((id, now)),
            }
        } else if matches!(self.stuck_since, Some((stuck_id, _)) if stuck_id == id) {
            self.stuck_since = None;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Injection targets and their registry.
//!
//! A *target* is a rectangular host surface (a view, window, or embedded
//! frame) that registered itself to receive injected input. The controller
//! hit-tests pointer events against target bounds and forwards synthesized
//! events through the [`InjectionTarget`] trait; the trait is the only seam
//! between the controller and the host application's UI layer.
//!
//! Targets are addressed by [`TargetId`], a generation-stamped arena handle.
//! A handle held after its target was unregistered resolves to `None`
//! instead of aliasing whatever reuses the slot, so a stale id is always a
//! harmless no-op.

pub mod mock;

use std::sync::Arc;

use mux_core::domain::buttons::{HeldButtons, MouseButton};
use mux_core::keymap::{KeyAction, KeyCode, ModifierState};

// ── Geometry ──────────────────────────────────────────────────────────────────

/// An axis-aligned rectangle in device-independent screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Containment test matching hit-testing semantics: the left/top edge is
    /// inside, the right/bottom edge is outside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

// ── Synthesized events ────────────────────────────────────────────────────────

/// What kind of pointer event is being injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEventKind {
    Move,
    ButtonDown,
    ButtonUp,
}

/// A synthesized pointer event, positioned both in target-local and
/// device-independent screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerEventKind,
    /// The transitioning button for `ButtonDown`/`ButtonUp`, `None` for moves.
    pub button: Option<MouseButton>,
    pub local_x: f64,
    pub local_y: f64,
    pub screen_x: f64,
    pub screen_y: f64,
    /// Buttons held at the time of the event, so moves carry drag semantics.
    pub held: HeldButtons,
}

/// A synthesized wheel event. Deltas are already scaled to host scroll units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEvent {
    pub local_x: f64,
    pub local_y: f64,
    pub screen_x: f64,
    pub screen_y: f64,
    pub delta_x: f32,
    pub delta_y: f32,
    pub held: HeldButtons,
}

/// A synthesized keyboard event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyEvent {
    pub key: KeyCode,
    pub action: KeyAction,
    pub modifiers: ModifierState,
    pub scan: u32,
    /// Platform flag bits (extended-key etc.) passed through untouched.
    pub flags: u32,
}

// ── The injection seam ────────────────────────────────────────────────────────

/// A host surface willing to receive injected input.
///
/// Implementations are queried synchronously from the controller task, so
/// every method must be cheap and non-blocking. Geometry is reported in
/// device-independent coordinates; the controller converts incoming physical
/// screen coordinates using [`scale_factor`](InjectionTarget::scale_factor).
pub trait InjectionTarget: Send + Sync {
    /// Current bounds in device-independent screen coordinates.
    fn bounds(&self) -> Rect;

    /// Whether the surface is currently visible. Invisible targets are
    /// skipped by hit-testing but still count as registered.
    fn is_visible(&self) -> bool;

    /// Physical-to-device-independent scale of the display the surface
    /// lives on.
    fn scale_factor(&self) -> f64;

    /// Asks the host to focus the surface before an event is delivered.
    fn focus(&self);

    /// Tells the surface to start or stop suppressing native OS input while
    /// injected input is active.
    fn set_native_input_blocked(&self, blocked: bool);

    /// Whether the surface's input pipeline still has events it has not yet
    /// processed. Used for stuck-pipeline detection.
    fn has_pending_events(&self) -> bool;

    /// Discards the surface's queued input. Called when the pipeline has
    /// been observed stuck past the dwell threshold.
    fn reset_pipeline(&self);

    fn forward_pointer(&self, event: PointerEvent);

    fn forward_wheel(&self, event: WheelEvent);

    fn forward_key(&self, event: KeyEvent);
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Generation-stamped handle to a registered target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId {
    index: u32,
    generation: u32,
}

struct Slot {
    generation: u32,
    target: Option<Arc<dyn InjectionTarget>>,
}

/// Arena of registered targets.
///
/// Slots are reused after unregistration, with the generation bumped so a
/// stale [`TargetId`] can never resolve to the slot's new occupant.
/// Iteration order is slot order, which for targets registered into fresh
/// slots equals registration order.
#[derive(Default)]
pub struct TargetRegistry {
    slots: Vec<Slot>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a target and returns its handle.
    pub fn register(&mut self, target: Arc<dyn InjectionTarget>) -> TargetId {
        if let Some(index) = self.slots.iter().position(|s| s.target.is_none()) {
            let slot = &mut self.slots[index];
            slot.generation += 1;
            slot.target = Some(target);
            return TargetId {
                index: index as u32,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            target: Some(target),
        });
        TargetId {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    /// Unregisters a target. A stale or repeated id is a no-op and returns
    /// `false`.
    pub fn unregister(&mut self, id: TargetId) -> bool {
        match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation && slot.target.is_some() => {
                slot.target = None;
                true
            }
            _ => false,
        }
    }

    /// Resolves a handle, returning `None` for stale ids.
    pub fn get(&self, id: TargetId) -> Option<&Arc<dyn InjectionTarget>> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.target.as_ref())
    }

    /// Iterates over live targets in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (TargetId, &Arc<dyn InjectionTarget>)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.target.as_ref().map(|target| {
                (
                    TargetId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    target,
                )
            })
        })
    }

    /// First visible target in slot order.
    pub fn first_visible(&self) -> Option<(TargetId, &Arc<dyn InjectionTarget>)> {
        self.iter().find(|(_, t)| t.is_visible())
    }

    /// First live target in slot order, visible or not.
    pub fn first(&self) -> Option<(TargetId, &Arc<dyn InjectionTarget>)> {
        self.iter().next()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.target.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

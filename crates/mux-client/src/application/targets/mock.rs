//! Recording injection target for tests and the demo binary.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{InjectionTarget, KeyEvent, PointerEvent, Rect, WheelEvent};

/// An [`InjectionTarget`] that records every call for later inspection.
///
/// Geometry and visibility are mutable from the outside so tests can move or
/// hide the surface mid-scenario; the pending flag simulates a stuck input
/// pipeline.
pub struct MockTarget {
    bounds: Mutex<Rect>,
    visible: AtomicBool,
    scale: Mutex<f64>,
    pending: AtomicBool,
    focus_count: AtomicUsize,
    reset_count: AtomicUsize,
    blocked_calls: Mutex<Vec<bool>>,
    pointer_events: Mutex<Vec<PointerEvent>>,
    wheel_events: Mutex<Vec<WheelEvent>>,
    key_events: Mutex<Vec<KeyEvent>>,
}

impl MockTarget {
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds: Mutex::new(bounds),
            visible: AtomicBool::new(true),
            scale: Mutex::new(1.0),
            pending: AtomicBool::new(false),
            focus_count: AtomicUsize::new(0),
            reset_count: AtomicUsize::new(0),
            blocked_calls: Mutex::new(Vec::new()),
            pointer_events: Mutex::new(Vec::new()),
            wheel_events: Mutex::new(Vec::new()),
            key_events: Mutex::new(Vec::new()),
        }
    }

    pub fn with_scale(bounds: Rect, scale: f64) -> Self {
        let target = Self::new(bounds);
        *target.scale.lock().unwrap() = scale;
        target
    }

    // ── Test controls ─────────────────────────────────────────────────────

    pub fn set_bounds(&self, bounds: Rect) {
        *self.bounds.lock().unwrap() = bounds;
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    /// Simulates a pipeline that has (or has not) unprocessed events.
    pub fn set_pending(&self, pending: bool) {
        self.pending.store(pending, Ordering::SeqCst);
    }

    // ── Recorded observations ─────────────────────────────────────────────

    pub fn pointer_events(&self) -> Vec<PointerEvent> {
        self.pointer_events.lock().unwrap().clone()
    }

    pub fn wheel_events(&self) -> Vec<WheelEvent> {
        self.wheel_events.lock().unwrap().clone()
    }

    pub fn key_events(&self) -> Vec<KeyEvent> {
        self.key_events.lock().unwrap().clone()
    }

    pub fn focus_count(&self) -> usize {
        self.focus_count.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) -> usize {
        self.reset_count.load(Ordering::SeqCst)
    }

    pub fn blocked_calls(&self) -> Vec<bool> {
        self.blocked_calls.lock().unwrap().clone()
    }

    pub fn clear_recordings(&self) {
        self.pointer_events.lock().unwrap().clear();
        self.wheel_events.lock().unwrap().clear();
        self.key_events.lock().unwrap().clear();
    }
}

impl InjectionTarget for MockTarget {
    fn bounds(&self) -> Rect {
        *self.bounds.lock().unwrap()
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn scale_factor(&self) -> f64 {
        *self.scale.lock().unwrap()
    }

    fn focus(&self) {
        self.focus_count.fetch_add(1, Ordering::SeqCst);
    }

    fn set_native_input_blocked(&self, blocked: bool) {
        self.blocked_calls.lock().unwrap().push(blocked);
    }

    fn has_pending_events(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    fn reset_pipeline(&self) {
        self.reset_count.fetch_add(1, Ordering::SeqCst);
        self.pending.store(false, Ordering::SeqCst);
    }

    fn forward_pointer(&self, event: PointerEvent) {
        self.pointer_events.lock().unwrap().push(event);
    }

    fn forward_wheel(&self, event: WheelEvent) {
        self.wheel_events.lock().unwrap().push(event);
    }

    fn forward_key(&self, event: KeyEvent) {
        self.key_events.lock().unwrap().push(event);
    }
}

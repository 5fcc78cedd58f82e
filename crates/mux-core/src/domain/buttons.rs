//! The pointer button transition bitmask.
//!
//! A single `pointer.button.notify` message may assert several transition
//! bits at once: the mask carries independent down and up bits for the
//! left, right, and middle buttons. Each asserted bit corresponds to one
//! synthesized button event on the receiving side.

/// Left button pressed.
pub const LEFT_DOWN: u32 = 0x01;
/// Left button released.
pub const LEFT_UP: u32 = 0x02;
/// Right button pressed.
pub const RIGHT_DOWN: u32 = 0x04;
/// Right button released.
pub const RIGHT_UP: u32 = 0x08;
/// Middle button pressed.
pub const MIDDLE_DOWN: u32 = 0x10;
/// Middle button released.
pub const MIDDLE_UP: u32 = 0x20;

/// A physical pointer button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// One button state change extracted from a transition mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonTransition {
    pub button: MouseButton,
    pub pressed: bool,
}

/// Expands a transition mask into individual transitions.
///
/// Order is fixed: left, right, middle, down before up for each button —
/// the order in which the bits are applied on the wire.
pub fn button_transitions(mask: u32) -> Vec<ButtonTransition> {
    let table = [
        (LEFT_DOWN, MouseButton::Left, true),
        (LEFT_UP, MouseButton::Left, false),
        (RIGHT_DOWN, MouseButton::Right, true),
        (RIGHT_UP, MouseButton::Right, false),
        (MIDDLE_DOWN, MouseButton::Middle, true),
        (MIDDLE_UP, MouseButton::Middle, false),
    ];
    table
        .iter()
        .filter(|(bit, _, _)| mask & bit != 0)
        .map(|&(_, button, pressed)| ButtonTransition { button, pressed })
        .collect()
}

/// The set of buttons currently held by the owner.
///
/// Motion events injected while a button is held carry this set so the
/// receiving application sees drag semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeldButtons {
    pub left: bool,
    pub right: bool,
    pub middle: bool,
}

impl HeldButtons {
    /// Applies one transition to the held set.
    pub fn apply(&mut self, transition: ButtonTransition) {
        let slot = match transition.button {
            MouseButton::Left => &mut self.left,
            MouseButton::Right => &mut self.right,
            MouseButton::Middle => &mut self.middle,
        };
        *slot = transition.pressed;
    }

    /// Drops every held button (ownership reset).
    pub fn clear(&mut self) {
        *self = HeldButtons::default();
    }

    pub fn any(&self) -> bool {
        self.left || self.right || self.middle
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

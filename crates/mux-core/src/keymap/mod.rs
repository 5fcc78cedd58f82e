//! Key-code abstraction between the wire protocol and the host application.
//!
//! The wire carries platform virtual-key values as opaque integers, plus a
//! platform message kind from which down/up is derived. The controller never
//! interprets key values itself except to maintain modifier state; that
//! classification is behind the [`ModifierMap`] trait so a host on a
//! different platform can supply its own table.

use std::collections::HashSet;

/// An opaque key code as carried on the wire.
///
/// The core never assigns meaning to the numeric value beyond equality and
/// modifier classification via a host-supplied [`ModifierMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u16);

/// Key press direction, derived from the platform message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

impl KeyAction {
    /// Derives the action from a platform keyboard message kind.
    ///
    /// The known kinds are the Windows messages the original servers emit:
    /// `0x100`/`0x104` (key down, sys key down) and `0x101`/`0x105`
    /// (key up, sys key up). Anything else returns `None` and the event is
    /// dropped by the caller.
    pub fn from_message(message: u32) -> Option<Self> {
        match message {
            0x100 | 0x104 => Some(KeyAction::Down),
            0x101 | 0x105 => Some(KeyAction::Up),
            _ => None,
        }
    }

    pub fn is_down(self) -> bool {
        matches!(self, KeyAction::Down)
    }
}

/// A modifier key class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Shift,
    Ctrl,
    Alt,
}

/// Host-supplied classification of opaque key codes into modifier classes.
pub trait ModifierMap: Send + Sync {
    /// Returns the modifier class of `key`, or `None` for ordinary keys.
    fn classify(&self, key: KeyCode) -> Option<Modifier>;
}

/// Windows virtual-key modifier table.
///
/// Covers the generic and left/right-specific codes; either form counts
/// toward the modifier being held.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsVkModifierMap;

impl ModifierMap for WindowsVkModifierMap {
    fn classify(&self, key: KeyCode) -> Option<Modifier> {
        match key.0 {
            // VK_SHIFT, VK_LSHIFT, VK_RSHIFT
            0x10 | 0xA0 | 0xA1 => Some(Modifier::Shift),
            // VK_CONTROL, VK_LCONTROL, VK_RCONTROL
            0x11 | 0xA2 | 0xA3 => Some(Modifier::Ctrl),
            // VK_MENU, VK_LMENU, VK_RMENU
            0x12 | 0xA4 | 0xA5 => Some(Modifier::Alt),
            _ => None,
        }
    }
}

/// Live modifier state derived from the pressed-key set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl ModifierState {
    /// Computes the modifier state from the set of currently pressed keys.
    pub fn from_pressed(pressed: &HashSet<KeyCode>, map: &dyn ModifierMap) -> Self {
        let mut state = ModifierState::default();
        for key in pressed {
            match map.classify(*key) {
                Some(Modifier::Shift) => state.shift = true,
                Some(Modifier::Ctrl) => state.ctrl = true,
                Some(Modifier::Alt) => state.alt = true,
                None => {}
            }
        }
        state
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

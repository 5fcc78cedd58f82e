//! Release-hotkey detection.
//!
//! Keyboard events routed to the owner are offered to a hotkey detector
//! before injection; a consumed event is dropped instead of forwarded, and
//! the controller reports the trigger so the host can release ownership (or
//! do whatever else the chord means to it).

use serde::{Deserialize, Serialize};

use mux_core::keymap::{KeyAction, KeyCode, ModifierState};

/// Decides whether a keyboard event is a hotkey and should be consumed.
pub trait HotkeyDetector: Send {
    /// Returns `true` when the event completed a hotkey chord. A consumed
    /// event is not injected into any target.
    fn on_key(&mut self, key: KeyCode, modifiers: ModifierState, action: KeyAction) -> bool;
}

/// The configurable ownership-release chords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReleaseHotkey {
    #[default]
    #[serde(rename = "ctrl+alt+r")]
    CtrlAltR,
    #[serde(rename = "ctrl+shift+q")]
    CtrlShiftQ,
    #[serde(rename = "alt+f12")]
    AltF12,
}

impl ReleaseHotkey {
    /// The chord's non-modifier key, as a Windows virtual-key code.
    fn key(self) -> KeyCode {
        match self {
            ReleaseHotkey::CtrlAltR => KeyCode(0x52),  // 'R'
            ReleaseHotkey::CtrlShiftQ => KeyCode(0x51), // 'Q'
            ReleaseHotkey::AltF12 => KeyCode(0x7B),     // VK_F12
        }
    }

    /// The exact modifier set the chord requires.
    fn modifiers(self) -> ModifierState {
        match self {
            ReleaseHotkey::CtrlAltR => ModifierState {
                ctrl: true,
                alt: true,
                shift: false,
            },
            ReleaseHotkey::CtrlShiftQ => ModifierState {
                ctrl: true,
                shift: true,
                alt: false,
            },
            ReleaseHotkey::AltF12 => ModifierState {
                alt: true,
                ctrl: false,
                shift: false,
            },
        }
    }
}

/// Detector matching a single [`ReleaseHotkey`] chord.
///
/// Only key-down events complete a chord, and the modifier state must match
/// the chord exactly; extra modifiers held keep the event an ordinary key.
#[derive(Debug, Clone)]
pub struct ChordDetector {
    hotkey: ReleaseHotkey,
}

impl ChordDetector {
    pub fn new(hotkey: ReleaseHotkey) -> Self {
        Self { hotkey }
    }
}

impl HotkeyDetector for ChordDetector {
    fn on_key(&mut self, key: KeyCode, modifiers: ModifierState, action: KeyAction) -> bool {
        action.is_down() && key == self.hotkey.key() && modifiers == self.hotkey.modifiers()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! The user roster: which mouse and keyboard belong to which remote user.
//!
//! The server identifies physical devices by integer hardware ids (hwids)
//! that are *not* globally unique across device kinds — a mouse and a
//! keyboard may carry the same numeric id. A user couples one mouse hwid
//! with (at most) one keyboard hwid.
//!
//! The roster is rebuilt wholesale whenever a full user list arrives and
//! patched incrementally on create/dispose notifications. Keyboard events
//! carry the *keyboard's* hwid, while ownership is tracked by the *mouse*
//! hwid, so the roster also maintains the keyboard→mouse mapping used to
//! resolve keyboard events to their owning user.

use std::collections::HashMap;

use crate::protocol::messages::UserRecord;

/// Sentinel hwid meaning "no device" / "no owner".
pub const NO_DEVICE: i32 = -1;

/// One known user and their device associations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserInfo {
    pub user_id: i32,
    pub name: String,
    pub hwid_mouse: i32,
    pub hwid_keyboard: i32,
}

impl From<&UserRecord> for UserInfo {
    /// Builds a `UserInfo` from a wire record, picking the mouse and
    /// keyboard hwids out of the device array. Devices of unknown kind are
    /// ignored; a user may legitimately have no keyboard (hwid 0).
    fn from(record: &UserRecord) -> Self {
        let mut info = UserInfo {
            user_id: record.id,
            name: record.name.clone(),
            hwid_mouse: 0,
            hwid_keyboard: 0,
        };
        for device in &record.devices {
            match device.kind.as_str() {
                "pointer" => info.hwid_mouse = device.hwid,
                "keyboard" => info.hwid_keyboard = device.hwid,
                _ => {}
            }
        }
        info
    }
}

/// The current set of known users, indexed for the two lookups the
/// controller needs: user by mouse hwid, and mouse hwid by keyboard hwid.
#[derive(Debug, Default)]
pub struct Roster {
    by_mouse: HashMap<i32, UserInfo>,
    keyboard_to_mouse: HashMap<i32, i32>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the roster wholesale from a full user list.
    pub fn replace(&mut self, users: Vec<UserInfo>) {
        self.by_mouse.clear();
        self.keyboard_to_mouse.clear();
        for user in users {
            self.insert(user);
        }
    }

    /// Adds or updates a single user.
    ///
    /// A keyboard hwid of 0 means the user has no keyboard and is never
    /// inserted into the keyboard mapping.
    pub fn insert(&mut self, user: UserInfo) {
        if user.hwid_keyboard != 0 {
            self.keyboard_to_mouse
                .insert(user.hwid_keyboard, user.hwid_mouse);
        }
        self.by_mouse.insert(user.hwid_mouse, user);
    }

    /// Removes a user by their device ids (dispose notification).
    pub fn remove(&mut self, hwid_mouse: i32, hwid_keyboard: i32) {
        self.by_mouse.remove(&hwid_mouse);
        self.keyboard_to_mouse.remove(&hwid_keyboard);
    }

    /// Drops every entry (connection reset).
    pub fn clear(&mut self) {
        self.by_mouse.clear();
        self.keyboard_to_mouse.clear();
    }

    /// Looks up a user by their mouse hwid.
    pub fn user_by_mouse(&self, hwid_mouse: i32) -> Option<&UserInfo> {
        self.by_mouse.get(&hwid_mouse)
    }

    /// Resolves a keyboard hwid to the owning user's mouse hwid.
    pub fn mouse_for_keyboard(&self, hwid_keyboard: i32) -> Option<i32> {
        self.keyboard_to_mouse.get(&hwid_keyboard).copied()
    }

    /// Returns the display name for a mouse hwid, or `""` when unknown.
    pub fn name_for_mouse(&self, hwid_mouse: i32) -> String {
        self.by_mouse
            .get(&hwid_mouse)
            .map(|u| u.name.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_mouse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_mouse.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::DeviceRecord;

    fn user(id: i32, name: &str, mouse: i32, keyboard: i32) -> UserInfo {
        UserInfo {
            user_id: id,
            name: name.to_string(),
            hwid_mouse: mouse,
            hwid_keyboard: keyboard,
        }
    }

    #[test]
    fn test_from_record_picks_devices_by_kind() {
        // Arrange
        let record = UserRecord {
            id: 1,
            name: "alice".to_string(),
            devices: vec![
                DeviceRecord {
                    hwid: 0x10,
                    kind: "pointer".to_string(),
                },
                DeviceRecord {
                    hwid: 0x20,
                    kind: "keyboard".to_string(),
                },
                DeviceRecord {
                    hwid: 0x99,
                    kind: "pedal".to_string(),
                },
            ],
        };

        // Act
        let info = UserInfo::from(&record);

        // Assert: unknown device kinds are ignored
        assert_eq!(info.hwid_mouse, 0x10);
        assert_eq!(info.hwid_keyboard, 0x20);
        assert_eq!(info.name, "alice");
    }

    #[test]
    fn test_replace_rebuilds_wholesale() {
        // Arrange
        let mut roster = Roster::new();
        roster.insert(user(1, "old", 0x10, 0x20));

        // Act
        roster.replace(vec![user(2, "new", 0x30, 0x40)]);

        // Assert: the old user and its keyboard mapping are gone
        assert!(roster.user_by_mouse(0x10).is_none());
        assert!(roster.mouse_for_keyboard(0x20).is_none());
        assert_eq!(roster.mouse_for_keyboard(0x40), Some(0x30));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_insert_skips_keyboard_mapping_for_zero_hwid() {
        let mut roster = Roster::new();
        roster.insert(user(1, "mouse-only", 0x10, 0));
        assert!(roster.mouse_for_keyboard(0).is_none());
        assert_eq!(roster.user_by_mouse(0x10).unwrap().name, "mouse-only");
    }

    #[test]
    fn test_remove_clears_both_indexes() {
        let mut roster = Roster::new();
        roster.insert(user(1, "alice", 0x10, 0x20));

        roster.remove(0x10, 0x20);

        assert!(roster.user_by_mouse(0x10).is_none());
        assert!(roster.mouse_for_keyboard(0x20).is_none());
        assert!(roster.is_empty());
    }

    #[test]
    fn test_name_for_unknown_mouse_is_empty() {
        let roster = Roster::new();
        assert_eq!(roster.name_for_mouse(0x10), "");
    }

    #[test]
    fn test_same_numeric_hwid_for_mouse_and_keyboard_of_different_users() {
        // hwids are not globally unique across kinds: user A's keyboard may
        // carry the same number as user B's mouse.
        let mut roster = Roster::new();
        roster.insert(user(1, "a", 0x10, 0x30));
        roster.insert(user(2, "b", 0x30, 0x40));

        assert_eq!(roster.mouse_for_keyboard(0x30), Some(0x10));
        assert_eq!(roster.user_by_mouse(0x30).unwrap().name, "b");
    }
}

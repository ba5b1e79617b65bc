//! Key definitions for the Command remap
//!
//! Fixed keycodes, flag masks and the side-to-substitute mapping.
//! Values are raw macOS virtual keycodes and `CGEventFlags` bits so this
//! module stays free of platform bindings.

use std::time::Duration;

/// Press-to-release window below which a lone press counts as a tap
pub const TAP_THRESHOLD: Duration = Duration::from_millis(300);

/// Raw macOS virtual keycode
pub type KeyCode = u16;

/// Raw flag masks from the event flag word
pub mod flags {
    /// Device-dependent bit for the left Command key
    pub const LEFT_COMMAND: u64 = 0x0000_0008;
    /// Device-dependent bit for the right Command key
    pub const RIGHT_COMMAND: u64 = 0x0000_0010;
}

/// Raw virtual keycodes
pub mod keycodes {
    use super::KeyCode;

    pub const LEFT_COMMAND: KeyCode = 0x37;
    pub const RIGHT_COMMAND: KeyCode = 0x36;
    /// 英数
    pub const JIS_EISU: KeyCode = 0x66;
    /// かな
    pub const JIS_KANA: KeyCode = 0x68;
}

/// Which physical Command key an event concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierSide {
    Left,
    Right,
}

impl ModifierSide {
    /// Resolve the side a flags-changed keycode belongs to
    pub fn from_keycode(keycode: KeyCode) -> Option<Self> {
        match keycode {
            keycodes::LEFT_COMMAND => Some(Self::Left),
            keycodes::RIGHT_COMMAND => Some(Self::Right),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn keycode(self) -> KeyCode {
        match self {
            Self::Left => keycodes::LEFT_COMMAND,
            Self::Right => keycodes::RIGHT_COMMAND,
        }
    }

    /// Device-dependent flag bit that is set while this side is held
    pub fn flag_mask(self) -> u64 {
        match self {
            Self::Left => flags::LEFT_COMMAND,
            Self::Right => flags::RIGHT_COMMAND,
        }
    }

    /// Whether the flag word reports this side as held
    pub fn is_down(self, flags: u64) -> bool {
        flags & self.flag_mask() != 0
    }

    /// The key synthesized when this side is tapped
    pub fn substitute(self) -> SubstituteKey {
        match self {
            Self::Left => SubstituteKey::Eisu,
            Self::Right => SubstituteKey::Kana,
        }
    }
}

impl std::fmt::Display for ModifierSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModifierSide::Left => write!(f, "left-command"),
            ModifierSide::Right => write!(f, "right-command"),
        }
    }
}

/// Layout-switch key synthesized in place of a tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstituteKey {
    Eisu,
    Kana,
}

impl SubstituteKey {
    pub fn keycode(self) -> KeyCode {
        match self {
            Self::Eisu => keycodes::JIS_EISU,
            Self::Kana => keycodes::JIS_KANA,
        }
    }
}

impl std::fmt::Display for SubstituteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubstituteKey::Eisu => write!(f, "EISU"),
            SubstituteKey::Kana => write!(f, "KANA"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Observed flag words for a lone Command press.
    const LEFT_DOWN: u64 = 0b1_0000_0000_0001_0000_1000;
    const RIGHT_DOWN: u64 = 0b1_0000_0000_0001_0001_0000;
    const RELEASED: u64 = 0b1_0000_0000;

    #[test]
    fn test_side_from_keycode() {
        assert_eq!(ModifierSide::from_keycode(0x37), Some(ModifierSide::Left));
        assert_eq!(ModifierSide::from_keycode(0x36), Some(ModifierSide::Right));
        // Left shift is a flags-changed key we do not track
        assert_eq!(ModifierSide::from_keycode(0x38), None);
    }

    #[test]
    fn test_is_down_reads_device_bits() {
        assert!(ModifierSide::Left.is_down(LEFT_DOWN));
        assert!(!ModifierSide::Right.is_down(LEFT_DOWN));
        assert!(ModifierSide::Right.is_down(RIGHT_DOWN));
        assert!(!ModifierSide::Left.is_down(RIGHT_DOWN));
        assert!(!ModifierSide::Left.is_down(RELEASED));
        assert!(!ModifierSide::Right.is_down(RELEASED));
    }

    #[test]
    fn test_side_keycodes() {
        assert_eq!(ModifierSide::Left.keycode(), 55);
        assert_eq!(ModifierSide::Right.keycode(), 54);
    }

    #[test]
    fn test_fixed_mapping() {
        assert_eq!(ModifierSide::Left.substitute(), SubstituteKey::Eisu);
        assert_eq!(ModifierSide::Right.substitute(), SubstituteKey::Kana);
        assert_eq!(SubstituteKey::Eisu.keycode(), 102);
        assert_eq!(SubstituteKey::Kana.keycode(), 104);
    }
}

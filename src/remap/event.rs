//! Platform-neutral view of a tapped input event

use std::time::Duration;

use super::keys::KeyCode;

/// What kind of event the hook observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The OS disabled the hook for exceeding its callback budget
    Invalidated,
    /// A modifier key went up or down
    FlagsChanged { keycode: KeyCode, flags: u64 },
    /// A regular key went down
    KeyDown { keycode: KeyCode },
    /// Anything else delivered to the hook
    Other,
}

/// An observed event with the time it was generated, measured since boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: EventKind,
    pub timestamp: Duration,
}

impl InputEvent {
    pub fn new(kind: EventKind, timestamp: Duration) -> Self {
        Self { kind, timestamp }
    }

    pub fn invalidated(timestamp: Duration) -> Self {
        Self::new(EventKind::Invalidated, timestamp)
    }

    pub fn flags_changed(keycode: KeyCode, flags: u64, timestamp: Duration) -> Self {
        Self::new(EventKind::FlagsChanged { keycode, flags }, timestamp)
    }

    pub fn key_down(keycode: KeyCode, timestamp: Duration) -> Self {
        Self::new(EventKind::KeyDown { keycode }, timestamp)
    }
}

//! Tap composer
//!
//! Decides, for every event the session observes, whether a Command key was
//! tapped on its own. A tap is a press and release of one side within
//! [`TAP_THRESHOLD`] with no regular key pressed in between. Taps are
//! answered by synthesizing that side's substitute key; everything else is
//! left alone.

use std::time::Duration;

use tracing::{debug, info};

use super::event::{EventKind, InputEvent};
use super::keys::{KeyCode, ModifierSide, SubstituteKey, TAP_THRESHOLD};
use crate::session::SessionError;

/// Errors building a synthetic key pair
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("failed to create event source")]
    Source,

    #[error("failed to create keyboard event for keycode {0}")]
    Event(KeyCode),
}

/// The session's handle on the event currently being handled
pub trait TapProxy {
    /// Post a keydown+keyup pair right after the in-flight event.
    ///
    /// Both halves must be built before either is posted.
    fn synthesize(&mut self, key: SubstituteKey) -> Result<(), SynthesisError>;

    /// Re-enable the hook after the OS disabled it
    fn rearm(&mut self) -> Result<(), SessionError>;
}

/// Per-side tap tracking
#[derive(Debug, Default)]
pub struct Composer {
    /// When the left Command key went down, while it is still held
    left: Option<Duration>,
    /// When the right Command key went down, while it is still held
    right: Option<Duration>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start time of the pending tap for `side`, if any
    #[cfg(test)]
    pub fn pending(&self, side: ModifierSide) -> Option<Duration> {
        match side {
            ModifierSide::Left => self.left,
            ModifierSide::Right => self.right,
        }
    }

    fn record_mut(&mut self, side: ModifierSide) -> &mut Option<Duration> {
        match side {
            ModifierSide::Left => &mut self.left,
            ModifierSide::Right => &mut self.right,
        }
    }

    /// Forget both pending taps
    pub fn clear(&mut self) {
        self.left = None;
        self.right = None;
    }

    /// Handle one observed event.
    ///
    /// The event itself is never altered; the caller passes it on unchanged.
    /// Only a failed re-arm after a forced timeout is reported as an error.
    pub fn handle<P: TapProxy>(
        &mut self,
        event: &InputEvent,
        proxy: &mut P,
    ) -> Result<(), SessionError> {
        match event.kind {
            EventKind::Invalidated => {
                info!("event tap disabled by timeout, re-arming");
                self.clear();
                proxy.rearm()?;
            }
            EventKind::FlagsChanged { keycode, flags } => {
                if let Some(side) = ModifierSide::from_keycode(keycode) {
                    self.handle_side(side, side.is_down(flags), event.timestamp, proxy);
                }
            }
            EventKind::KeyDown { .. } => {
                // Command + something: neither side may fire on release
                if self.left.is_some() || self.right.is_some() {
                    debug!("key pressed while Command held, tap windows closed");
                }
                self.clear();
            }
            EventKind::Other => {}
        }

        Ok(())
    }

    fn handle_side<P: TapProxy>(
        &mut self,
        side: ModifierSide,
        down: bool,
        now: Duration,
        proxy: &mut P,
    ) {
        let record = self.record_mut(side);

        match (down, *record) {
            (true, None) => {
                *record = Some(now);
                debug!(%side, "tap window opened");
            }
            (true, Some(_)) => {}
            (false, Some(pressed_at)) => {
                *record = None;

                let held = now.saturating_sub(pressed_at);
                if held < TAP_THRESHOLD {
                    Self::press(side.substitute(), proxy);
                    debug!(%side, held_ms = held.as_millis() as u64, "tap detected");
                } else {
                    debug!(%side, held_ms = held.as_millis() as u64, "held too long, no tap");
                }
            }
            (false, None) => {}
        }
    }

    /// Synthesize `key`, dropping it if the pair cannot be built
    fn press<P: TapProxy>(key: SubstituteKey, proxy: &mut P) {
        if let Err(e) = proxy.synthesize(key) {
            debug!(%key, ?e, "substitute key dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remap::keys::keycodes;

    /// Records what the composer asked the session to do
    #[derive(Default)]
    struct RecordingProxy {
        pressed: Vec<SubstituteKey>,
        rearms: usize,
        fail_synthesis: bool,
        fail_rearm: bool,
    }

    impl TapProxy for RecordingProxy {
        fn synthesize(&mut self, key: SubstituteKey) -> Result<(), SynthesisError> {
            if self.fail_synthesis {
                return Err(SynthesisError::Event(key.keycode()));
            }
            self.pressed.push(key);
            Ok(())
        }

        fn rearm(&mut self) -> Result<(), SessionError> {
            if self.fail_rearm {
                return Err(SessionError::RearmFailed);
            }
            self.rearms += 1;
            Ok(())
        }
    }

    /// Drives a composer with events placed at millisecond offsets
    struct Harness {
        composer: Composer,
        proxy: RecordingProxy,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                composer: Composer::new(),
                proxy: RecordingProxy::default(),
            }
        }

        fn at(&self, ms: u64) -> Duration {
            Duration::from_millis(ms)
        }

        fn feed(&mut self, event: InputEvent) -> Result<(), SessionError> {
            self.composer.handle(&event, &mut self.proxy)
        }

        fn down(&mut self, side: ModifierSide, ms: u64) {
            let word = COMMAND | NON_COALESCED | side.flag_mask();
            let event = InputEvent::flags_changed(side.keycode(), word, self.at(ms));
            self.feed(event).unwrap();
        }

        fn up(&mut self, side: ModifierSide, ms: u64) {
            let event = InputEvent::flags_changed(side.keycode(), NON_COALESCED, self.at(ms));
            self.feed(event).unwrap();
        }

        fn key(&mut self, keycode: KeyCode, ms: u64) {
            let event = InputEvent::key_down(keycode, self.at(ms));
            self.feed(event).unwrap();
        }

        fn invalidate(&mut self, ms: u64) -> Result<(), SessionError> {
            let event = InputEvent::invalidated(self.at(ms));
            self.feed(event)
        }
    }

    const KEY_C: KeyCode = 0x08;
    // Bits real flag words carry alongside the device bit
    const COMMAND: u64 = 0x0010_0000;
    const NON_COALESCED: u64 = 0x0000_0100;

    #[test]
    fn test_initial_state() {
        let composer = Composer::new();
        assert_eq!(composer.pending(ModifierSide::Left), None);
        assert_eq!(composer.pending(ModifierSide::Right), None);
    }

    #[test]
    fn test_left_tap_fires_eisu() {
        let mut h = Harness::new();
        h.down(ModifierSide::Left, 0);
        h.up(ModifierSide::Left, 120);
        assert_eq!(h.proxy.pressed, vec![SubstituteKey::Eisu]);
        assert_eq!(h.composer.pending(ModifierSide::Left), None);
    }

    #[test]
    fn test_right_tap_fires_kana() {
        let mut h = Harness::new();
        h.down(ModifierSide::Right, 0);
        h.up(ModifierSide::Right, 40);
        assert_eq!(h.proxy.pressed, vec![SubstituteKey::Kana]);
    }

    #[test]
    fn test_long_hold_fires_nothing() {
        let mut h = Harness::new();
        h.down(ModifierSide::Left, 0);
        h.up(ModifierSide::Left, 450);
        assert!(h.proxy.pressed.is_empty());
        assert_eq!(h.composer.pending(ModifierSide::Left), None);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut h = Harness::new();
        h.down(ModifierSide::Left, 0);
        h.up(ModifierSide::Left, 300);
        assert!(h.proxy.pressed.is_empty());

        h.down(ModifierSide::Left, 1_000);
        h.up(ModifierSide::Left, 1_299);
        assert_eq!(h.proxy.pressed, vec![SubstituteKey::Eisu]);
    }

    #[test]
    fn test_interleaved_sides_fire_independently() {
        let mut h = Harness::new();
        h.down(ModifierSide::Left, 0);
        h.down(ModifierSide::Right, 1);
        h.up(ModifierSide::Right, 10);
        h.up(ModifierSide::Left, 50);
        assert_eq!(h.proxy.pressed, vec![SubstituteKey::Kana, SubstituteKey::Eisu]);
    }

    #[test]
    fn test_combo_suppresses_tap() {
        let mut h = Harness::new();
        h.down(ModifierSide::Left, 0);
        h.key(KEY_C, 5);
        h.up(ModifierSide::Left, 10);
        assert!(h.proxy.pressed.is_empty());
    }

    #[test]
    fn test_combo_clears_both_sides() {
        let mut h = Harness::new();
        h.down(ModifierSide::Right, 0);
        h.down(ModifierSide::Left, 2);
        h.key(KEY_C, 5);
        assert_eq!(h.composer.pending(ModifierSide::Left), None);
        assert_eq!(h.composer.pending(ModifierSide::Right), None);

        h.up(ModifierSide::Left, 10);
        h.up(ModifierSide::Right, 12);
        assert!(h.proxy.pressed.is_empty());
    }

    #[test]
    fn test_repeat_down_keeps_first_timestamp() {
        let mut h = Harness::new();
        h.down(ModifierSide::Left, 0);
        h.down(ModifierSide::Left, 250);
        assert_eq!(h.composer.pending(ModifierSide::Left), Some(h.at(0)));

        // Measured from the first down, so 320ms is too long
        h.up(ModifierSide::Left, 320);
        assert!(h.proxy.pressed.is_empty());
    }

    #[test]
    fn test_release_without_press_is_ignored() {
        let mut h = Harness::new();
        h.up(ModifierSide::Right, 10);
        assert!(h.proxy.pressed.is_empty());
        assert_eq!(h.composer.pending(ModifierSide::Right), None);
    }

    #[test]
    fn test_untracked_modifier_is_ignored() {
        let mut h = Harness::new();
        h.down(ModifierSide::Left, 0);

        // Left shift going down is a flags-changed event, not a key-down
        let shift = InputEvent::flags_changed(0x38, 0x0002_0002, h.at(20));
        h.feed(shift).unwrap();

        h.up(ModifierSide::Left, 60);
        assert_eq!(h.proxy.pressed, vec![SubstituteKey::Eisu]);
    }

    #[test]
    fn test_other_events_pass_through() {
        let mut h = Harness::new();
        h.down(ModifierSide::Left, 0);
        h.feed(InputEvent::new(EventKind::Other, h.at(10))).unwrap();
        assert_eq!(h.composer.pending(ModifierSide::Left), Some(h.at(0)));
        assert!(h.proxy.pressed.is_empty());
        assert_eq!(h.proxy.rearms, 0);
    }

    #[test]
    fn test_key_after_tap_leaves_next_tap_alone() {
        let mut h = Harness::new();
        h.down(ModifierSide::Left, 0);
        h.up(ModifierSide::Left, 30);

        h.key(keycodes::JIS_EISU, 30);
        h.down(ModifierSide::Right, 40);
        h.up(ModifierSide::Right, 80);
        assert_eq!(h.proxy.pressed, vec![SubstituteKey::Eisu, SubstituteKey::Kana]);
    }

    #[test]
    fn test_synthesis_failure_is_silent() {
        let mut h = Harness::new();
        h.proxy.fail_synthesis = true;
        h.down(ModifierSide::Left, 0);
        h.up(ModifierSide::Left, 20);
        assert!(h.proxy.pressed.is_empty());
        assert_eq!(h.composer.pending(ModifierSide::Left), None);
    }

    #[test]
    fn test_invalidation_clears_and_rearms() {
        let mut h = Harness::new();
        h.down(ModifierSide::Left, 0);
        h.down(ModifierSide::Right, 5);
        h.invalidate(10).unwrap();

        assert_eq!(h.proxy.rearms, 1);
        assert_eq!(h.composer.pending(ModifierSide::Left), None);
        assert_eq!(h.composer.pending(ModifierSide::Right), None);

        // Releases belonging to the lost presses do nothing
        h.up(ModifierSide::Left, 20);
        h.up(ModifierSide::Right, 25);
        assert!(h.proxy.pressed.is_empty());
    }

    #[test]
    fn test_tap_after_recovery() {
        let mut h = Harness::new();
        h.invalidate(0).unwrap();
        h.down(ModifierSide::Right, 100);
        h.up(ModifierSide::Right, 150);
        assert_eq!(h.proxy.rearms, 1);
        assert_eq!(h.proxy.pressed, vec![SubstituteKey::Kana]);
    }

    #[test]
    fn test_failed_rearm_is_fatal() {
        let mut h = Harness::new();
        h.proxy.fail_rearm = true;
        h.down(ModifierSide::Left, 0);

        let result = h.invalidate(10);
        assert!(matches!(result, Err(SessionError::RearmFailed)));
        assert_eq!(h.composer.pending(ModifierSide::Left), None);
    }
}

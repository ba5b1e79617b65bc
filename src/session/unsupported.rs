//! Stand-in session for platforms without a global event tap

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::error;

use super::SessionError;
use crate::events::SessionEvent;

/// Session that can never be enabled
pub struct Session {
    _event_tx: mpsc::Sender<SessionEvent>,
}

impl Session {
    pub fn new(event_tx: mpsc::Sender<SessionEvent>, _poll_interval: Duration) -> Self {
        Self {
            _event_tx: event_tx,
        }
    }

    pub fn enable(&mut self) -> Result<(), SessionError> {
        error!(os = std::env::consts::OS, "no global event tap on this platform");
        Err(SessionError::Unsupported)
    }

    pub fn disable(&mut self) {}

    pub fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_is_refused() {
        let (tx, _rx) = mpsc::channel(4);
        let mut session = Session::new(tx, Duration::from_millis(100));
        assert!(matches!(session.enable(), Err(SessionError::Unsupported)));
        assert!(!session.is_enabled());

        // Disabling twice is harmless
        session.disable();
        session.disable();
    }
}

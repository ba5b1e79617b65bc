//! Notifications from the interception session to the supervisor
//!
//! Sent from the session thread; the tokio side decides what to do with
//! them.

use crate::session::SessionError;

/// Lifecycle events emitted by the session thread
#[derive(Debug)]
pub enum SessionEvent {
    /// The OS disabled the tap and it was re-enabled
    Recovered,

    /// The tap is gone and could not be brought back
    Failed(SessionError),
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Recovered => write!(f, "TAP_RECOVERED"),
            SessionEvent::Failed(e) => write!(f, "TAP_FAILED ({})", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display() {
        assert_eq!(SessionEvent::Recovered.to_string(), "TAP_RECOVERED");

        let failed = SessionEvent::Failed(SessionError::RearmFailed);
        assert!(failed.to_string().starts_with("TAP_FAILED"));
        assert!(failed.to_string().contains("stayed disabled"));
    }
}

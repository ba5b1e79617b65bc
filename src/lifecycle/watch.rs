//! Supervision of the interception session from the async side

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::events::SessionEvent;

/// Follow session events until the session fails or goes away.
///
/// Returns an error for an unrecoverable session failure, which the caller
/// turns into a non-zero exit. A closed channel ends the watch cleanly.
pub async fn watch_session(mut events: mpsc::Receiver<SessionEvent>) -> Result<()> {
    while let Some(event) = events.recv().await {
        debug!(%event, "session event");

        match event {
            SessionEvent::Recovered => {
                info!("event tap re-armed after forced timeout");
            }
            SessionEvent::Failed(e) => {
                return Err(e).context("interception session failed");
            }
        }
    }

    debug!("session event channel closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionError;

    #[test]
    fn test_recovery_keeps_watching() {
        let (tx, rx) = mpsc::channel(4);
        tx.try_send(SessionEvent::Recovered).unwrap();
        tx.try_send(SessionEvent::Recovered).unwrap();
        drop(tx);

        let result = tokio_test::block_on(watch_session(rx));
        assert!(result.is_ok());
    }

    #[test]
    fn test_failure_ends_watch() {
        let (tx, rx) = mpsc::channel(4);
        tx.try_send(SessionEvent::Recovered).unwrap();
        tx.try_send(SessionEvent::Failed(SessionError::RearmFailed)).unwrap();

        let err = tokio_test::block_on(watch_session(rx)).unwrap_err();
        assert!(err.to_string().contains("interception session failed"));
        assert!(matches!(
            err.downcast_ref::<SessionError>(),
            Some(SessionError::RearmFailed)
        ));
    }
}

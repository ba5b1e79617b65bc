//! Errors raised by the interception session

/// Conditions the session cannot recover from
///
/// Every variant is fatal to the daemon: without a live hook the Command
/// keys go unremapped and nothing tells the user.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("interception session is already enabled")]
    AlreadyEnabled,

    #[error("failed to create event tap - check Accessibility permissions")]
    TapCreation,

    #[error("failed to create run loop source for the event tap")]
    RunLoopSource,

    #[error("failed to spawn session thread: {0}")]
    ThreadSpawn(String),

    #[error("session thread exited before the tap was ready")]
    WorkerExited,

    #[error("event tap was disabled by timeout but no tap is registered")]
    TapMissing,

    #[error("event tap stayed disabled after re-enabling it")]
    RearmFailed,

    #[error("global event taps are only available on macOS")]
    Unsupported,
}

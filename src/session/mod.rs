//! Interception session
//!
//! Owns the OS hook on the global keyboard stream, the run loop it is
//! delivered on, and the channel for injecting synthesized events. Only
//! macOS provides such a hook; elsewhere enabling the session fails.

mod error;

#[cfg(target_os = "macos")]
mod tap;
#[cfg(not(target_os = "macos"))]
mod unsupported;

pub use error::SessionError;
#[cfg(target_os = "macos")]
pub use tap::Session;
#[cfg(not(target_os = "macos"))]
pub use unsupported::Session;

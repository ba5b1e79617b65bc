//! Process lifecycle: permissions, signals and session supervision

mod access;
mod shutdown;
mod watch;

pub use access::is_process_trusted;
pub use shutdown::ShutdownSignal;
pub use watch::watch_session;

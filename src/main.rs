//! cmdtap-daemon: Command-key taps as input-source keys on macOS
//!
//! This daemon runs as a LaunchAgent and provides:
//! - A global CGEventTap on modifier changes and key presses
//! - Left Command tapped alone -> 英数 (Eisu), right Command -> かな (Kana)
//! - Automatic re-arming when macOS disables the tap for running too long
//!
//! Held Command keys and Command shortcuts pass through untouched.
//! Menu bar UI, login items and relaunch live outside this daemon.

mod config;
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
mod events;
mod lifecycle;
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
mod remap;
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
mod session;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::lifecycle::{is_process_trusted, watch_session, ShutdownSignal};
use crate::session::Session;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "cmdtap-daemon starting");

    let config = Config::load()?;
    info!(?config, "configuration loaded");

    if !is_process_trusted(config.prompt_for_access) {
        warn!("Accessibility access not granted - enable it in System Settings and restart");
    }

    let shutdown = ShutdownSignal::new();

    // Session thread -> supervisor
    let (event_tx, event_rx) = mpsc::channel(16);

    let mut session = Session::new(event_tx, config.run_loop_interval);
    if let Err(e) = session.enable() {
        error!(%e, "failed to enable interception session");
        return Err(e).context("failed to enable interception session");
    }

    info!(enabled = session.is_enabled(), "remapping active, entering main loop");

    let outcome = tokio::select! {
        result = watch_session(event_rx) => result,

        signal = shutdown.wait() => {
            let signal = signal.context("failed to install signal handlers")?;
            info!(%signal, "shutdown signal received");
            Ok(())
        }
    };

    // Cleanup
    info!("shutting down...");
    session.disable();

    if let Err(e) = &outcome {
        error!("cmdtap-daemon stopping on fatal error: {:#}", e);
    }

    info!("cmdtap-daemon stopped");

    outcome
}

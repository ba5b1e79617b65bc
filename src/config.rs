//! Configuration loading
//!
//! Only process-level knobs live here. Which keys are remapped and the tap
//! threshold are fixed.

use std::time::Duration;

use anyhow::{bail, Context, Result};

const PROMPT_VAR: &str = "CMDTAP_PROMPT";
const POLL_MS_VAR: &str = "CMDTAP_POLL_MS";

const DEFAULT_POLL_MS: u64 = 100;

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Ask macOS to show the Accessibility prompt when not yet trusted
    pub prompt_for_access: bool,

    /// How long the session thread runs its loop between stop checks
    pub run_loop_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt_for_access: true,
            run_loop_interval: Duration::from_millis(DEFAULT_POLL_MS),
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(PROMPT_VAR) {
            config.prompt_for_access =
                parse_bool(&raw).with_context(|| format!("invalid {}", PROMPT_VAR))?;
        }

        if let Some(raw) = lookup(POLL_MS_VAR) {
            let ms: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid {}: {:?}", POLL_MS_VAR, raw))?;
            if ms == 0 {
                bail!("invalid {}: must be at least 1", POLL_MS_VAR);
            }
            config.run_loop_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {:?}", other),
    }
}

//! Command-tap remapping
//!
//! Turns a lone tap of left Command into 英数 and of right Command into
//! かな, so a US keyboard can switch input sources like a JIS one.

mod composer;
mod event;
mod keys;

#[cfg_attr(not(target_os = "macos"), allow(unused_imports))]
pub use composer::{Composer, SynthesisError, TapProxy};
#[cfg_attr(not(target_os = "macos"), allow(unused_imports))]
pub use event::{EventKind, InputEvent};
#[cfg_attr(not(target_os = "macos"), allow(unused_imports))]
pub use keys::{KeyCode, SubstituteKey};

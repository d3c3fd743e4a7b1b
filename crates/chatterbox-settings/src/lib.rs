//! # chatterbox-settings
//!
//! Configuration management with layered sources for the Chatterbox server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ChatterboxSettings::default()`]
//! 2. **Settings file**: `~/.chatterbox/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `CHATTERBOX_*` and `REDIS_URL` (highest priority)
//!
//! Settings are loaded once at startup and passed explicitly to the
//! components that need them.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

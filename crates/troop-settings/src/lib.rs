//! # troop-settings
//!
//! Configuration for the troop relay, loaded from three layers (in priority
//! order):
//! 1. **Compiled defaults**: [`TroopSettings::default()`]
//! 2. **User file**: `~/.troop/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `TROOP_*` overrides
//!
//! Command-line flags in the gateway binary sit above all three.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{LogFormat, LoggingSettings, RelaySettings, ServerSettings, TroopSettings};

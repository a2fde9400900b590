//! # posestream-settings
//!
//! Configuration with layered sources. Settings are loaded from (in priority
//! order, lowest first):
//!
//! 1. **Compiled defaults**: [`PosestreamSettings::default()`]
//! 2. **Settings file**: `~/.posestream/settings.json` or an explicit path,
//!    deep-merged over the defaults
//! 3. **Environment variables**: `POSESTREAM_*` overrides

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{LoggingSettings, PosestreamSettings, ProcessingSettings, ServerSettings};

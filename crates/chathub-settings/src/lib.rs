//! # chathub-settings
//!
//! Configuration for the chathub server, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`HubSettings::default()`]
//! 2. **Settings file**: `~/.chathub/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `CHATHUB_*` overrides (highest priority)
//!
//! The merged result is validated before it is handed out.
//!
//! # Usage
//!
//! ```no_run
//! use chathub_settings::load_settings;
//!
//! let settings = load_settings().unwrap();
//! println!("listening on {}:{}", settings.server.host, settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

//! # zendroid-settings
//!
//! Layered configuration for the Zendroid client:
//! 1. **Compiled defaults**: [`ZendroidSettings::default()`]
//! 2. **User file**: `~/.zendroid/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `ZENDROID_*` overrides (highest priority)
//!
//! ```no_run
//! let settings = zendroid_settings::load_settings().unwrap_or_default();
//! println!("server: {}", settings.server.base_url);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

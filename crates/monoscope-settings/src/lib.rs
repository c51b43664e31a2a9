//! # monoscope-settings
//!
//! Agent configuration with layered sources:
//! 1. **Compiled defaults**: [`AgentConfig::default()`]
//! 2. **Config file**: JSON, deep-merged over defaults
//! 3. **Environment variables**: `MONOSCOPE_*` overrides (highest priority)
//!
//! The config is owned by exactly one agent instance; there is no global.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_config, read_config_file};
pub use types::*;

//! Persisted manifest and its manager.
//!
//! The manifest (`.private-config.json` in the working directory) is the
//! engine's durable record: which paths are tracked, where the storage root
//! and secondary repository live, and the settings the services consult.
//! [`ConfigManager`] owns all reads and writes; every other component
//! receives settings by value.

mod manager;
mod manifest;

pub use manager::{ConfigHealth, ConfigManager, ExcludeSettingsUpdate};
pub use manifest::{
    CONFIG_FILE_NAME, CURRENT_VERSION, DEFAULT_PRIVATE_REPO_PATH, DEFAULT_STORAGE_PATH, Manifest,
    Metadata, Preset, Settings,
};

//! RelayCheck Settings
//!
//! Configuration of a verification run.
//!
//! ## Features
//!
//! - Cluster endpoints (API URL and token per node)
//! - Node roles (default routable set, passive node)
//! - Funding and ticket constants, polling interval and timeouts
//! - JSON serialization
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::PathBuf;
//! use relaycheck_settings::Settings;
//!
//! let settings = Settings::load_from(&PathBuf::from("relaycheck.json"))?;
//! settings.validate()?;
//! # Ok::<(), relaycheck_settings::SettingsError>(())
//! ```

mod config;

pub use config::{ClusterSettings, NodeEndpoint, ScenarioSettings, Settings};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    ReadError(std::io::Error),

    #[error("Failed to write settings: {0}")]
    WriteError(std::io::Error),

    #[error("Failed to parse settings: {0}")]
    ParseError(serde_json::Error),

    #[error("Failed to create config directory: {0}")]
    CreateDirError(std::io::Error),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Settings file used when none is given on the command line
pub fn default_settings_path() -> PathBuf {
    PathBuf::from("relaycheck.json")
}

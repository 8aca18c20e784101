//! ChanRelay Settings
//!
//! The relay's JSON configuration document and the one-shot bootstrap that
//! creates it.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use chanrelay_settings::Settings;
//!
//! let settings = Settings::load_from(Path::new("config.json"))?;
//! let keypair = settings.relay_keypair()?;
//! # Ok::<(), chanrelay_settings::SettingsError>(())
//! ```

mod bootstrap;
mod config;

pub use bootstrap::{generate_bootstrap_config, generate_identity, try_generate_bootstrap_config};
pub use config::Settings;

use std::path::PathBuf;

use chanrelay_crypto::KeyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings from {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write settings: {0}")]
    WriteError(std::io::Error),

    #[error("Failed to parse settings: {0}")]
    ParseError(serde_json::Error),

    #[error("Failed to create config directory: {0}")]
    CreateDirError(std::io::Error),

    #[error("Invalid server id {0:?}")]
    InvalidServerId(String),

    #[error("Invalid {field}: {source}")]
    InvalidKey {
        field: &'static str,
        source: KeyError,
    },

    #[error("our_public_key does not match our_private_key")]
    KeyMismatch,

    #[error("Missing {0}")]
    MissingKey(&'static str),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

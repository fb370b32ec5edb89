//! Configuration management for the sensestream pipeline
//!
//! Supports loading configuration from:
//! - TOML files (optional, lowest precedence above built-in defaults)
//! - Environment variables (same option names, upper-snake-cased)
//!
//! Invalid environment values log a warning and fall back to the default
//! rather than failing startup.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, AudioConfig, DecoderConfig, DisplayConfig, FrontendConfig,
    LanguageLockConfig, ModelPaths, QueueConfig, Settings, TimelineConfig, VadConfig, VadMode,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Required file missing: {kind} at {path}")]
    MissingFile { kind: &'static str, path: String },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

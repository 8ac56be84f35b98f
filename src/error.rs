//! Error types for signstream.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Model errors
    #[error("Model not found at {path}")]
    ModelNotFound { path: String },

    #[error("Failed to load model: {message}")]
    ModelLoad { message: String },

    #[error("Class list error: {message}")]
    ClassList { message: String },

    // Server errors
    #[error("Failed to bind {address}: {message}")]
    Bind { address: String, message: String },

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Pipeline error: {message}")]
    Pipeline { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SignError>;

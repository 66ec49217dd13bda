// src/error.rs

//! Error types for pypi2pkg
//!
//! Capabilities with their own failure vocabulary (trial installs, builds,
//! version parsing) define dedicated error enums next to their traits and
//! convert into this type where a failure has to cross module boundaries.

use thiserror::Error;

/// Library-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the resolution engine and its adapters
#[derive(Error, Debug)]
pub enum Error {
    /// A tool or environment could not be initialized
    #[error("Initialization error: {0}")]
    InitError(String),

    /// Something that was looked up does not exist
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Malformed input (requirement spec, tool output, version string)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A spawned command exited unsuccessfully
    #[error("Command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// A spawned command exceeded its time budget
    #[error("Command `{command}` timed out after {seconds} seconds")]
    CommandTimeout { command: String, seconds: u64 },

    /// A required external tool is missing from PATH
    #[error("Required tool not found: {0}")]
    ToolNotFound(String),

    /// The operation was interrupted by the user
    #[error("Interrupted")]
    Interrupted,

    /// Dependency resolution could not proceed
    #[error("Resolution error: {0}")]
    ResolutionError(String),

    /// A resolution node was asked to make a transition the state machine forbids
    #[error("Invalid state transition for {node}: {from} -> {to}")]
    InvalidTransition {
        node: String,
        from: &'static str,
        to: &'static str,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Native package database is in a state we refuse to work with
    #[error("Catalog error: {0}")]
    CatalogError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid version: {0}")]
    Version(#[from] crate::version::VersionError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

//! Error types for rig construction.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for rigging operations.
#[derive(Error, Debug)]
pub enum Error {
    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Target file exists and overwriting was not requested
    #[error("File already exists: {0}")]
    FileExists(PathBuf),

    /// File extension is not a supported scene format
    #[error("Unknown file format: {0}")]
    UnknownFormat(PathBuf),

    /// Node not found by name
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Attribute not found on a node
    #[error("Attribute not found: {node}.{attr}")]
    AttrNotFound { node: String, attr: String },

    /// Limb not found by name
    #[error("Limb not found: {0}")]
    LimbNotFound(String),

    /// Node name already used in the scene
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// Missing or unusable joint reference
    #[error("Invalid joint: {0}")]
    InvalidJoint(String),

    /// Invalid build configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Lifecycle method called out of order
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Geometry cannot be solved (straight chain, singular matrix)
    #[error("Degenerate geometry: {0}")]
    Degenerate(String),

    /// Evaluation found a dependency cycle
    #[error("Dependency cycle at {0}")]
    Cycle(String),

    /// Channel or attribute is locked
    #[error("Locked: {0}")]
    Locked(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a degenerate geometry error.
    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::Degenerate(msg.into())
    }

    /// Create an attribute lookup error.
    pub fn attr(node: impl Into<String>, attr: impl Into<String>) -> Self {
        Self::AttrNotFound { node: node.into(), attr: attr.into() }
    }

    /// True for errors caused by bad build input rather than the scene state.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::InvalidJoint(_) | Error::DuplicateName(_) | Error::Lifecycle(_)
        )
    }
}

/// Result type alias for rigging operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for negato-core.

use thiserror::Error;

/// Result type for negato operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for negato operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A rule or strategy record is structurally invalid.
    #[error("Invalid config: {0}")]
    Config(String),

    /// A user-supplied pattern failed to compile.
    #[error("Pattern error: {0}")]
    Pattern(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Create a config error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a pattern error.
    #[must_use]
    pub fn pattern(msg: impl Into<String>) -> Self {
        Self::Pattern(msg.into())
    }

    /// Create a parse error.
    #[must_use]
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}

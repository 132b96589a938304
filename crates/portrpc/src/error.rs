//! # Error Definitions
//!
//! Local failures of the wire layer. None of these ever travel across the
//! channel: a peer that sends a malformed message finds out through the
//! receiving side's diagnostics, not through a reply.

/// Failures while decoding or encoding wire values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An argument bag key was not a non-negative integer.
    InvalidIndex(String),
    /// An argument bag key exceeded the positional argument limit.
    IndexOutOfRange { index: usize, max: usize },
    /// A message could not be (de)serialized.
    Serialization(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIndex(key) => write!(f, "argument key '{}' is not a positional index", key),
            Self::IndexOutOfRange { index, max } => {
                write!(f, "argument index {} exceeds the limit of {}", index, max)
            }
            Self::Serialization(msg) => write!(f, "serialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// A specialized Result type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;

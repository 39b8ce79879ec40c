//! Error types for the interception engine

use crate::platform::ClientHandle;
use thiserror::Error;

/// Result type for snoop operations
pub type Result<T> = std::result::Result<T, SnoopError>;

/// Errors that can occur while installing, tracking or removing clients
#[derive(Debug, Error)]
pub enum SnoopError {
    /// No free slot left in the client registry
    #[error("Client registry is full ({capacity} slots)")]
    RegistryFull {
        capacity: usize,
    },

    /// A creation event arrived for a handle that is already tracked
    #[error("Client {0} is already registered")]
    AlreadyRegistered(ClientHandle),

    /// The shared driver library could not be opened
    #[error("Driver library '{library}' unavailable: {message}")]
    LibraryUnavailable {
        library: String,
        message: String,
    },

    /// The top-level creation hook could not be installed
    #[error("Failed to hook '{library}': {message}")]
    HookFailed {
        library: String,
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration file
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// A configured value outside its accepted range
    #[error("Config value {key} = {value} is out of range ({min}..={max})")]
    OutOfRange {
        key: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },

    /// Memory for a new client context could not be reserved
    #[error("Allocation failed: {0}")]
    Allocation(#[from] std::collections::TryReserveError),
}

impl SnoopError {
    /// Create a library unavailable error
    pub fn library_unavailable(library: impl Into<String>, message: impl Into<String>) -> Self {
        SnoopError::LibraryUnavailable {
            library: library.into(),
            message: message.into(),
        }
    }

    /// Create a hook failure error
    pub fn hook_failed(library: impl Into<String>, message: impl Into<String>) -> Self {
        SnoopError::HookFailed {
            library: library.into(),
            message: message.into(),
        }
    }
}

//! Error types for the town simulation core.
//!
//! The lifecycle itself has no fatal path: ignored requests and failed
//! placements degrade to "stay in the current state". These errors only
//! cover the fallible edges around it: configuration, wire frames and
//! invariant validation.

use thiserror::Error;

/// Result type alias using [`TownError`].
pub type Result<T> = std::result::Result<T, TownError>;

/// Top-level error type for the core crate.
#[derive(Debug, Error)]
pub enum TownError {
    /// Failed to read a configuration file.
    #[error("Failed to read config file '{path}': {message}")]
    ConfigRead {
        /// Path to the file that failed to read.
        path: String,
        /// Error message.
        message: String,
    },

    /// Configuration text is not valid RON for [`crate::config::TownConfig`].
    #[error("Failed to parse config: {0}")]
    ConfigParse(String),

    /// Configuration parsed but holds values the simulation cannot run with.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Failed to encode a replication frame or snapshot.
    #[error("Failed to encode replication data: {0}")]
    Encode(String),

    /// Failed to decode a replication frame or snapshot.
    #[error("Failed to decode replication data: {0}")]
    Decode(String),

    /// A lifecycle invariant does not hold.
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

//! Error types for the engine.

use thiserror::Error;

/// Main error type for the engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// A reservation did not fit in the remaining space of a memory arena.
    #[error("Arena '{arena}' exhausted: requested {requested} bytes, {available} available")]
    ArenaExhausted {
        /// Name of the arena scope.
        arena: &'static str,
        /// Bytes requested, including alignment padding.
        requested: usize,
        /// Bytes left before the request.
        available: usize,
    },

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;

//! Core utilities for the ember engine.
//!
//! This crate provides foundational types used across the renderer:
//! - Error types and result aliases
//! - Logging initialization
//! - Scoped memory arenas (frame, persistent, swap-chain)
//! - Renderer configuration

pub mod arena;
mod config;
mod error;
mod logging;

pub use arena::{
    ArenaScope, FrameArenas, FrameScope, MemoryArena, PersistentScope, SwapChainScope,
};
pub use config::{DEFAULT_ARENA_SIZE, DEFAULT_MAX_LISTENER_COUNT, RendererConfig};
pub use error::{Error, Result};
pub use logging::init_logging;

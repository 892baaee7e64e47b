//! Renderer configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default capacity of each memory arena (256 MiB).
pub const DEFAULT_ARENA_SIZE: usize = 256 * 1024 * 1024;

/// Default capacity of the swap-chain listener registry.
pub const DEFAULT_MAX_LISTENER_COUNT: usize = 8;

/// Settings read once at renderer creation.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```
/// use ember_core::RendererConfig;
///
/// let config = RendererConfig::from_toml_str("max_listener_count = 2").unwrap();
/// assert_eq!(config.max_listener_count, 2);
/// assert_eq!(config.app_name, "ember");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the Vulkan instance.
    pub app_name: String,
    /// Enables the validation layer and the debug messenger.
    pub enable_api_diagnostic: bool,
    pub frame_arena_size: usize,
    pub persistent_arena_size: usize,
    pub swap_chain_arena_size: usize,
    /// Maximum number of swap-chain listeners.
    pub max_listener_count: usize,
    /// Color the render pass clears to.
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "ember".to_string(),
            enable_api_diagnostic: cfg!(debug_assertions),
            frame_arena_size: DEFAULT_ARENA_SIZE,
            persistent_arena_size: DEFAULT_ARENA_SIZE,
            swap_chain_arena_size: DEFAULT_ARENA_SIZE,
            max_listener_count: DEFAULT_MAX_LISTENER_COUNT,
            clear_color: [0.1, 0.1, 0.15, 1.0],
        }
    }
}

impl RendererConfig {
    /// Parses a configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reads and parses a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Serializes the configuration to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

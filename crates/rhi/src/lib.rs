//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Thin RAII wrappers over `ash` for everything the renderer core builds:
//! - Instance, validation layer and debug messenger
//! - Presentation surface and the window contract
//! - Physical device selection and logical device creation
//! - Swapchain, render pass and framebuffers
//! - Command pools and synchronization primitives

mod error;

pub mod command;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod render_pass;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;

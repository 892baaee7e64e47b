//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// API diagnostics were requested but the validation layer is not installed
    #[error("Validation layer {0} requested but not available")]
    ValidationLayerUnavailable(String),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// None of the depth format candidates supports depth attachments
    #[error("No supported depth format")]
    NoSupportedDepthFormat,

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// More listeners registered than the renderer was configured for
    #[error("Listener capacity of {capacity} exceeded")]
    ListenerCapacityExceeded {
        /// Configured maximum listener count.
        capacity: usize,
    },

    /// Frame API called out of order
    #[error("Invalid frame state: {0}")]
    FrameState(&'static str),

    /// Error from the core crate
    #[error(transparent)]
    Core(#[from] ember_core::Error),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

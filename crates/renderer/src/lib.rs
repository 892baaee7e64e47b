//! Vulkan renderer core.
//!
//! This crate owns the swapchain lifecycle and the frame loop:
//! - [`FrameBackend`](backend::FrameBackend): the graphics operations a frame needs
//! - [`FrameLoop`](frame_loop::FrameLoop): frame protocol and swapchain state machine
//! - [`SwapchainListener`](listener::SwapchainListener): rebuild callbacks for drawing systems
//! - [`VulkanBackend`](vulkan::VulkanBackend) and the [`Renderer`] facade

pub mod backend;
pub mod depth_buffer;
pub mod frame_loop;
pub mod listener;
pub mod renderer;
pub mod swapchain_resources;
pub mod vulkan;

#[cfg(test)]
mod mock_backend;

pub use backend::{AcquireOutcome, FrameBackend, PresentOutcome};
pub use frame_loop::{BeginFrame, EndFrame, FrameLoop, SwapchainState};
pub use listener::{ListenerContext, ListenerRegistry, SwapchainListener};
pub use renderer::Renderer;
pub use vulkan::VulkanBackend;

pub use ember_rhi::sync::MAX_FRAMES_IN_FLIGHT;

//! Renderer facade.
//!
//! [`Renderer`] is the single entry and exit point of the core: it wires the
//! Vulkan backend, the memory arenas and the listener registry together and
//! exposes the per-frame API.
//!
//! # Example
//!
//! ```no_run
//! use ember_core::RendererConfig;
//! use ember_renderer::{BeginFrame, Renderer};
//! use ember_rhi::surface::WindowSurface;
//!
//! # fn example(window: impl WindowSurface + 'static) -> ember_rhi::RhiResult<()> {
//! let mut renderer = Renderer::new(window, &RendererConfig::default())?;
//!
//! if let BeginFrame::Recording { .. } = renderer.begin_frame()? {
//!     // Record draw calls into renderer.command_buffer()...
//!     renderer.end_frame(false)?;
//! }
//!
//! renderer.release()?;
//! # Ok(())
//! # }
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{error, info};

use ember_core::{FrameArenas, RendererConfig};
use ember_rhi::RhiResult;
use ember_rhi::command::CommandBuffer;
use ember_rhi::surface::WindowSurface;

use crate::frame_loop::{BeginFrame, EndFrame, FrameLoop, SwapchainState};
use crate::listener::SwapchainListener;
use crate::vulkan::VulkanBackend;

/// The renderer.
///
/// Must be used from a single thread in the order
/// `new → (begin_frame → end_frame)* → release`.
pub struct Renderer {
    frame_loop: FrameLoop<VulkanBackend>,
}

impl Renderer {
    /// Initializes Vulkan for `window`, allocates the arenas and builds the
    /// swapchain.
    ///
    /// # Errors
    ///
    /// Returns an error if Vulkan bootstrap fails: loader missing, validation
    /// layer unavailable, no suitable GPU or no depth format.
    pub fn new(window: impl WindowSurface + 'static, config: &RendererConfig) -> RhiResult<Self> {
        let (width, height) = window.framebuffer_size();
        info!("Initializing renderer ({}x{})", width, height);

        let backend = VulkanBackend::new(Box::new(window), config)?;
        let arenas = FrameArenas::from_config(config);
        let frame_loop = FrameLoop::new(backend, arenas, config.max_listener_count)?;

        info!("Renderer initialized");
        Ok(Self { frame_loop })
    }

    /// Registers a drawing system for swapchain cleanup and recreate calls.
    ///
    /// Listeners are called in registration order and live as long as the
    /// renderer.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ListenerCapacityExceeded`](ember_rhi::RhiError::ListenerCapacityExceeded)
    /// once `max_listener_count` listeners are registered.
    pub fn register_listener<L>(&mut self, listener: Rc<RefCell<L>>) -> RhiResult<()>
    where
        L: SwapchainListener<VulkanBackend> + 'static,
    {
        self.frame_loop.register_listener(listener)
    }

    /// Opens a frame: on [`BeginFrame::Recording`] the command buffer is
    /// inside the render pass and ready for draw calls.
    pub fn begin_frame(&mut self) -> RhiResult<BeginFrame> {
        self.frame_loop.begin_frame()
    }

    /// Submits and presents the open frame.
    ///
    /// Pass `true` when the window was resized since the last frame.
    pub fn end_frame(&mut self, window_resized: bool) -> RhiResult<EndFrame> {
        self.frame_loop.end_frame(window_resized)
    }

    /// Blocks until the device is idle.
    pub fn wait_idle(&mut self) -> RhiResult<()> {
        self.frame_loop.wait_idle()
    }

    /// Forces a swapchain rebuild with the listener fan-out.
    pub fn recreate_swapchain(&mut self) -> RhiResult<()> {
        self.frame_loop.recreate()
    }

    /// Tears everything down in reverse creation order.
    pub fn release(mut self) -> RhiResult<()> {
        self.frame_loop.release()
    }

    /// The Vulkan backend: device, physical device, command pool, graphics
    /// queue, render pass, image count and extent.
    #[inline]
    pub fn backend(&self) -> &VulkanBackend {
        self.frame_loop.backend()
    }

    /// The frame, persistent and swap-chain arenas.
    #[inline]
    pub fn arenas(&self) -> &FrameArenas {
        self.frame_loop.arenas()
    }

    /// Command buffer of the recording frame.
    pub fn command_buffer(&self) -> Option<&CommandBuffer> {
        let image_index = self.frame_loop.image_index()?;
        self.frame_loop.backend().command_buffer(image_index)
    }

    #[inline]
    pub fn current_frame(&self) -> usize {
        self.frame_loop.current_frame()
    }

    #[inline]
    pub fn state(&self) -> SwapchainState {
        self.frame_loop.state()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if self.frame_loop.state() != SwapchainState::Released
            && let Err(e) = self.frame_loop.release()
        {
            error!("Failed to release renderer: {}", e);
        }
    }
}

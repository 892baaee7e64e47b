//! The graphics operations the frame loop drives.
//!
//! [`FrameLoop`](crate::frame_loop::FrameLoop) implements the frame protocol
//! and the swapchain state machine once, over this trait. The Vulkan renderer
//! uses [`VulkanBackend`](crate::vulkan::VulkanBackend).

use std::fmt::Debug;

use ember_rhi::RhiResult;

/// Result of acquiring the next swapchain image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is available. A suboptimal swapchain still renders; the
    /// following present reports it.
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface and must be rebuilt.
    OutOfDate,
}

/// Result of presenting an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Suboptimal or out of date: the swapchain must be rebuilt.
    Stale,
}

/// Per-frame graphics operations plus swapchain resource management.
///
/// `slot` is a frame-in-flight index in `0..MAX_FRAMES_IN_FLIGHT`; every
/// slot owns an image-available semaphore, a render-finished semaphore and an
/// in-flight fence created signaled.
pub trait FrameBackend {
    /// Handle of an in-flight fence.
    type Fence: Copy + Eq + Debug;

    /// The in-flight fence of `slot`.
    fn in_flight_fence(&self, slot: usize) -> Self::Fence;

    /// Blocks until `fence` is signaled.
    fn wait_fence(&mut self, fence: Self::Fence) -> RhiResult<()>;

    /// Returns `fence` to the unsignaled state.
    fn reset_fence(&mut self, fence: Self::Fence) -> RhiResult<()>;

    /// Acquires the next image, signaling the image-available semaphore of `slot`.
    fn acquire_next_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome>;

    /// Resets and begins the command buffer of `image_index`, begins the render
    /// pass and sets the full-extent viewport and scissor.
    fn begin_recording(&mut self, image_index: u32) -> RhiResult<()>;

    /// Ends the render pass and the command buffer of `image_index`.
    fn end_recording(&mut self, image_index: u32) -> RhiResult<()>;

    /// Submits the command buffer of `image_index`: waits on the
    /// image-available semaphore of `slot`, signals its render-finished
    /// semaphore and its in-flight fence.
    fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()>;

    /// Presents `image_index` after the render-finished semaphore of `slot`.
    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome>;

    /// Blocks until the device is idle.
    fn wait_idle(&mut self) -> RhiResult<()>;

    /// Current drawable size of the window. `(0, 0)` while minimized.
    fn drawable_size(&self) -> (u32, u32);

    /// Builds the swapchain and everything sized from it.
    fn create_swapchain_resources(&mut self, width: u32, height: u32) -> RhiResult<()>;

    /// Destroys everything built by `create_swapchain_resources`.
    ///
    /// The device must be idle. Does nothing when no resources exist.
    fn destroy_swapchain_resources(&mut self);

    /// Number of swapchain images, 0 while no swapchain exists.
    fn image_count(&self) -> usize;
}

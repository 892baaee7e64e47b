//! Everything whose size or format follows the swapchain.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use ember_rhi::RhiResult;
use ember_rhi::command::{CommandBuffer, CommandPool};
use ember_rhi::device::Device;
use ember_rhi::instance::Instance;
use ember_rhi::render_pass::{Framebuffer, RenderPass};
use ember_rhi::surface::Surface;
use ember_rhi::swapchain::Swapchain;

use crate::depth_buffer::{DepthBuffer, find_depth_format};

/// Swapchain, depth buffer, render pass, one framebuffer and one command
/// buffer per swapchain image.
///
/// Built and destroyed as a unit, so these resources are either all present
/// or all absent. Fields drop in declaration order, dependents first.
pub struct SwapchainResources {
    command_buffers: Vec<CommandBuffer>,
    framebuffers: Vec<Framebuffer>,
    render_pass: RenderPass,
    depth_buffer: DepthBuffer,
    swapchain: Swapchain,
}

impl SwapchainResources {
    /// Builds the resources for a `width` x `height` drawable.
    pub fn new(
        instance: &Instance,
        device: &Arc<Device>,
        surface: &Surface,
        command_pool: &CommandPool,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let swapchain = Swapchain::new(instance, device.clone(), surface, width, height)?;
        let extent = swapchain.extent();

        let depth_format = find_depth_format(instance.handle(), device.physical_device())?;
        let depth_buffer = DepthBuffer::new(device.clone(), extent, depth_format)?;

        let render_pass = RenderPass::new(device.clone(), swapchain.format(), depth_format)?;

        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&view| {
                Framebuffer::new(
                    device.clone(),
                    &render_pass,
                    &[view, depth_buffer.image_view()],
                    extent,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;
        debug!("Created {} framebuffer(s)", framebuffers.len());

        let command_buffers = command_pool
            .allocate_command_buffers(swapchain.image_count())?
            .into_iter()
            .map(|handle| CommandBuffer::from_handle(device.clone(), handle))
            .collect();

        info!(
            "Swapchain resources ready: {}x{}, {} image(s)",
            extent.width,
            extent.height,
            swapchain.image_count()
        );

        Ok(Self {
            command_buffers,
            framebuffers,
            render_pass,
            depth_buffer,
            swapchain,
        })
    }

    /// Returns the command buffers to `command_pool` and destroys the rest.
    ///
    /// The device must be idle.
    pub fn destroy(self, command_pool: &CommandPool) {
        let handles: Vec<vk::CommandBuffer> =
            self.command_buffers.iter().map(CommandBuffer::handle).collect();
        command_pool.free_command_buffers(&handles);
        debug!("Destroying swapchain resources");
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn depth_buffer(&self) -> &DepthBuffer {
        &self.depth_buffer
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.command_buffers.len()
    }

    /// Framebuffer of swapchain image `image_index`.
    #[inline]
    pub fn framebuffer(&self, image_index: u32) -> Option<&Framebuffer> {
        self.framebuffers.get(image_index as usize)
    }

    /// Command buffer of swapchain image `image_index`.
    #[inline]
    pub fn command_buffer(&self, image_index: u32) -> Option<&CommandBuffer> {
        self.command_buffers.get(image_index as usize)
    }
}

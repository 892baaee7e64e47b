//! Vulkan implementation of [`FrameBackend`].

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use ember_core::RendererConfig;
use ember_rhi::command::{CommandBuffer, CommandPool, full_scissor, full_viewport};
use ember_rhi::device::Device;
use ember_rhi::instance::Instance;
use ember_rhi::physical_device::{PhysicalDeviceInfo, select_physical_device};
use ember_rhi::render_pass::clear_values;
use ember_rhi::surface::{Surface, WindowSurface};
use ember_rhi::sync::{FrameSync, MAX_FRAMES_IN_FLIGHT};
use ember_rhi::{RhiError, RhiResult};

use crate::backend::{AcquireOutcome, FrameBackend, PresentOutcome};
use crate::swapchain_resources::SwapchainResources;

const NO_SWAPCHAIN: RhiError = RhiError::FrameState("no swapchain resources");

/// Owns every Vulkan object of the renderer.
///
/// Fields wrapped in `ManuallyDrop` are destroyed explicitly in reverse
/// creation order by `Drop`.
pub struct VulkanBackend {
    clear_color: [f32; 4],
    /// Number of swapchain builds so far.
    generation: u64,
    resources: Option<SwapchainResources>,
    frame_syncs: ManuallyDrop<Vec<FrameSync>>,
    command_pool: ManuallyDrop<CommandPool>,
    device: ManuallyDrop<Arc<Device>>,
    physical_device: PhysicalDeviceInfo,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,
    window: Box<dyn WindowSurface>,
}

impl VulkanBackend {
    /// Creates instance, surface, device, command pool and per-slot sync
    /// objects. The swapchain is built separately.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The Vulkan loader is missing
    /// - Diagnostics are requested but the validation layer is not installed
    /// - Surface creation fails
    /// - No GPU meets the requirements
    pub fn new(window: Box<dyn WindowSurface>, config: &RendererConfig) -> RhiResult<Self> {
        info!("Initializing Vulkan backend");

        let extensions = window.required_instance_extensions()?;
        let instance = Instance::new(
            &config.app_name,
            config.enable_api_diagnostic,
            &extensions,
        )?;

        let surface = Surface::new(&instance, window.as_ref())?;

        let physical_device = select_physical_device(instance.handle(), &surface)?;
        info!(
            "Selected GPU: {} ({})",
            physical_device.device_name(),
            physical_device.device_type_name()
        );

        let device = Device::new(&instance, &physical_device)?;

        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;

        let frame_syncs = FrameSync::create_slots(&device, MAX_FRAMES_IN_FLIGHT)?;

        info!("Vulkan backend initialized");

        Ok(Self {
            clear_color: config.clear_color,
            generation: 0,
            resources: None,
            frame_syncs: ManuallyDrop::new(frame_syncs),
            command_pool: ManuallyDrop::new(command_pool),
            device: ManuallyDrop::new(device),
            physical_device,
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
            window,
        })
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    #[inline]
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue()
    }

    /// Current render pass, absent while the swapchain is suspended.
    pub fn render_pass(&self) -> Option<vk::RenderPass> {
        self.resources.as_ref().map(|r| r.render_pass().handle())
    }

    /// Current swapchain extent, absent while the swapchain is suspended.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.resources.as_ref().map(SwapchainResources::extent)
    }

    /// Swapchain image format, absent while the swapchain is suspended.
    pub fn color_format(&self) -> Option<vk::Format> {
        self.resources.as_ref().map(|r| r.swapchain().format())
    }

    pub fn depth_format(&self) -> Option<vk::Format> {
        self.resources.as_ref().map(|r| r.depth_buffer().format())
    }

    /// Command buffer of swapchain image `image_index`.
    pub fn command_buffer(&self, image_index: u32) -> Option<&CommandBuffer> {
        self.resources.as_ref()?.command_buffer(image_index)
    }

    fn resources(&self) -> RhiResult<&SwapchainResources> {
        self.resources.as_ref().ok_or(NO_SWAPCHAIN)
    }

    fn frame_sync(&self, slot: usize) -> RhiResult<&FrameSync> {
        self.frame_syncs
            .get(slot)
            .ok_or(RhiError::FrameState("frame slot out of range"))
    }

    fn recording_buffer(&self, image_index: u32) -> RhiResult<&CommandBuffer> {
        self.resources()?
            .command_buffer(image_index)
            .ok_or(RhiError::FrameState("image index has no command buffer"))
    }
}

impl FrameBackend for VulkanBackend {
    /// Fences are named by the slot that owns them.
    type Fence = usize;

    fn in_flight_fence(&self, slot: usize) -> usize {
        slot
    }

    fn wait_fence(&mut self, slot: usize) -> RhiResult<()> {
        self.frame_sync(slot)?.in_flight_fence().wait_forever()
    }

    fn reset_fence(&mut self, slot: usize) -> RhiResult<()> {
        self.frame_sync(slot)?.in_flight_fence().reset()
    }

    fn acquire_next_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
        let semaphore = self.frame_syncs[slot].image_available_semaphore().handle();

        match self.resources()?.swapchain().acquire_next_image(semaphore) {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn begin_recording(&mut self, image_index: u32) -> RhiResult<()> {
        let resources = self.resources()?;
        let cmd = self.recording_buffer(image_index)?;
        let framebuffer = resources
            .framebuffer(image_index)
            .ok_or(RhiError::FrameState("image index has no framebuffer"))?;
        let extent = resources.extent();

        cmd.reset()?;
        cmd.begin()?;

        let clear_values = clear_values(self.clear_color);
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(resources.render_pass().handle())
            .framebuffer(framebuffer.handle())
            .render_area(full_scissor(extent))
            .clear_values(&clear_values);

        cmd.begin_render_pass(&begin_info);
        cmd.set_viewport(&full_viewport(extent));
        cmd.set_scissor(&full_scissor(extent));

        Ok(())
    }

    fn end_recording(&mut self, image_index: u32) -> RhiResult<()> {
        let cmd = self.recording_buffer(image_index)?;
        cmd.end_render_pass();
        cmd.end()
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        let frame = &self.frame_syncs[slot];
        let cmd = self.recording_buffer(image_index)?;

        let wait_semaphores = [frame.image_available_semaphore().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished_semaphore().handle()];
        let command_buffers = [cmd.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the buffer was ended by end_recording and the fence was
        // reset by the frame loop before recording started.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], frame.in_flight_fence().handle())?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
        let semaphore = self.frame_syncs[slot].render_finished_semaphore().handle();

        match self.resources()?.swapchain().present(
            self.device.present_queue(),
            image_index,
            semaphore,
        ) {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => {
                debug!("Swapchain suboptimal during present");
                Ok(PresentOutcome::Stale)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during present");
                Ok(PresentOutcome::Stale)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn drawable_size(&self) -> (u32, u32) {
        self.window.framebuffer_size()
    }

    fn create_swapchain_resources(&mut self, width: u32, height: u32) -> RhiResult<()> {
        if self.generation > 0 {
            for frame in self.frame_syncs.iter_mut() {
                frame.renew_semaphores(&self.device)?;
            }
        }

        let resources = SwapchainResources::new(
            &self.instance,
            &self.device,
            &self.surface,
            &self.command_pool,
            width,
            height,
        )?;
        self.resources = Some(resources);
        self.generation += 1;

        debug!("Swapchain generation {}", self.generation);
        Ok(())
    }

    fn destroy_swapchain_resources(&mut self) {
        if let Some(resources) = self.resources.take() {
            resources.destroy(&self.command_pool);
        }
    }

    fn image_count(&self) -> usize {
        self.resources
            .as_ref()
            .map_or(0, SwapchainResources::image_count)
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        info!("Destroying Vulkan backend");

        if let Err(e) = self.device.wait_idle() {
            warn!("Failed to wait for device idle during drop: {:?}", e);
        }

        self.destroy_swapchain_resources();

        let other_owners = Arc::strong_count(&*self.device) - 1;
        if other_owners > 0 {
            warn!(
                "{} other owner(s) still hold the logical device past renderer teardown",
                other_owners
            );
        }

        // SAFETY: the device is idle and nothing uses these fields after this.
        unsafe {
            ManuallyDrop::drop(&mut self.frame_syncs);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.device);

            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Vulkan backend destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fences_are_named_by_slot() {
        fn slot_fenced<B: FrameBackend<Fence = usize>>() {}
        slot_fenced::<VulkanBackend>();
    }
}

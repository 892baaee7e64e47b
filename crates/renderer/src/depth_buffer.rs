//! Depth buffer management.
//!
//! The depth format is chosen once per swapchain build from an ordered list of
//! candidates; the image lives in GPU-only memory from gpu-allocator.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_rhi::device::Device;
//! use ember_renderer::depth_buffer::{DepthBuffer, find_depth_format};
//! use ash::vk;
//!
//! # fn example(instance: &ash::Instance, device: Arc<Device>) -> ember_rhi::RhiResult<()> {
//! let format = find_depth_format(instance, device.physical_device())?;
//! let extent = vk::Extent2D { width: 1920, height: 1080 };
//! let depth_buffer = DepthBuffer::new(device, extent, format)?;
//! let view = depth_buffer.image_view();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use ember_rhi::device::Device;
use ember_rhi::{RhiError, RhiResult};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Returns the first candidate for which `supports_depth_attachment` holds.
pub fn choose_depth_format(
    candidates: &[vk::Format],
    mut supports_depth_attachment: impl FnMut(vk::Format) -> bool,
) -> Option<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| supports_depth_attachment(format))
}

/// Picks the depth format for `physical_device`.
///
/// # Errors
///
/// Returns [`RhiError::NoSupportedDepthFormat`] if no candidate supports
/// depth/stencil attachments with optimal tiling.
pub fn find_depth_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> RhiResult<vk::Format> {
    let format = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
        let properties =
            unsafe { instance.get_physical_device_format_properties(physical_device, format) };
        properties
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
    .ok_or(RhiError::NoSupportedDepthFormat)?;

    debug!("Selected depth format {:?}", format);
    Ok(format)
}

/// Whether `format` carries a stencil aspect.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT
    )
}

fn allocator_poisoned() -> RhiError {
    ember_core::Error::Internal("GPU allocator mutex poisoned".to_string()).into()
}

/// Depth attachment image with its view and memory.
///
/// Destroyed in the order view, image, memory.
pub struct DepthBuffer {
    device: Arc<Device>,
    image: vk::Image,
    image_view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl DepthBuffer {
    /// Creates a depth buffer covering `extent`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `extent` has a zero dimension
    /// - Image creation, memory allocation or view creation fails
    pub fn new(device: Arc<Device>, extent: vk::Extent2D, format: vk::Format) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::SwapchainError(
                "Depth buffer dimensions must be greater than 0".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        // From here on the partially built buffer cleans up after itself.
        let mut depth_buffer = Self {
            device,
            image,
            image_view: vk::ImageView::null(),
            allocation: None,
            format,
            extent,
        };

        let requirements = unsafe {
            depth_buffer
                .device
                .handle()
                .get_image_memory_requirements(image)
        };

        let allocation = {
            let mut allocator = depth_buffer
                .device
                .allocator()
                .lock()
                .map_err(|_| allocator_poisoned())?;
            allocator.allocate(&AllocationCreateDesc {
                name: "depth_buffer",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?
        };

        // Owned before binding so that `Drop` frees it if binding fails.
        let device = &depth_buffer.device;
        store_then_bind(&mut depth_buffer.allocation, allocation, |allocation| unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        })?;

        let aspect_mask = if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_mask)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        depth_buffer.image_view =
            unsafe { depth_buffer.device.handle().create_image_view(&view_info, None)? };

        debug!(
            "Created depth buffer: {}x{} ({:?})",
            extent.width, extent.height, format
        );

        Ok(depth_buffer)
    }

    /// Returns the Vulkan image view handle.
    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    /// Returns the depth format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

/// Moves `value` into `slot`, then runs `bind` on it.
fn store_then_bind<T, E>(
    slot: &mut Option<T>,
    value: T,
    bind: impl FnOnce(&T) -> Result<(), E>,
) -> Result<(), E> {
    let value = slot.insert(value);
    bind(value)
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.image_view != vk::ImageView::null() {
                self.device
                    .handle()
                    .destroy_image_view(self.image_view, None);
            }
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator().lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free depth buffer allocation: {:?}", e);
                    }
                }
                Err(_) => error!("GPU allocator mutex poisoned; depth buffer memory leaked"),
            }
        }

        debug!(
            "Destroyed depth buffer: {}x{}",
            self.extent.width, self.extent.height
        );
    }
}

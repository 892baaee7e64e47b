//! Presentation surface and the window contract.

use std::ffi::c_char;

use ash::vk;
use tracing::{debug, info};

use crate::error::RhiResult;
use crate::instance::Instance;

/// What the renderer needs from a window.
///
/// Resize detection stays with the window layer; the renderer only reads the
/// current drawable size when it rebuilds the swapchain.
pub trait WindowSurface {
    /// Current drawable size in pixels. `(0, 0)` while minimized.
    fn framebuffer_size(&self) -> (u32, u32);

    /// Instance extensions required to create a surface for this window.
    fn required_instance_extensions(&self) -> RhiResult<Vec<*const c_char>>;

    /// Creates a presentation surface for this window.
    ///
    /// The returned handle is owned by the caller.
    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance)
    -> RhiResult<vk::SurfaceKHR>;
}

/// RAII wrapper for a Vulkan surface.
///
/// The instance must outlive this surface.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Creates the surface of `window` on `instance`.
    pub fn new(instance: &Instance, window: &dyn WindowSurface) -> RhiResult<Self> {
        let handle = window.create_surface(instance.entry(), instance.handle())?;
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        info!("Vulkan surface created");

        Ok(Self {
            handle,
            surface_loader,
        })
    }

    /// Get the raw Vulkan surface handle.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Get the surface extension loader used for capability queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }

    /// Returns whether `queue_family` of `physical_device` can present here.
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> RhiResult<bool> {
        let supported = unsafe {
            self.surface_loader.get_physical_device_surface_support(
                physical_device,
                queue_family,
                self.handle,
            )?
        };
        Ok(supported)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the handle was created for this loader's instance and is
        // destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        debug!("Vulkan surface destroyed");
    }
}

//! Window management using winit.
//!
//! [`Window`] implements the renderer's [`WindowSurface`] contract: live
//! drawable size, required instance extensions and surface creation.

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use ember_core::{Error, Result};
use ember_rhi::surface::WindowSurface;
use ember_rhi::{RhiError, RhiResult};

/// A winit window shared between the application and the renderer.
///
/// Cloning is cheap; clones refer to the same OS window.
#[derive(Clone)]
pub struct Window {
    window: Arc<WinitWindow>,
}

impl Window {
    /// Create a new resizable window with the given inner size and title.
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        info!("Window created: {}x{}", width, height);

        Ok(Self {
            window: Arc::new(window),
        })
    }

    /// Current inner size in physical pixels.
    pub fn size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    /// Request a redraw of the window.
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

impl WindowSurface for Window {
    fn framebuffer_size(&self) -> (u32, u32) {
        self.size()
    }

    fn required_instance_extensions(&self) -> RhiResult<Vec<*const c_char>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| RhiError::SurfaceError(format!("Failed to get display handle: {}", e)))?;

        let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())?;

        debug!(
            "Required Vulkan extensions for surface: {:?}",
            extensions
                .iter()
                // SAFETY: ash_window returns pointers to static, null-terminated
                // extension names.
                .map(|&ext| unsafe { CStr::from_ptr(ext) })
                .collect::<Vec<_>>()
        );

        Ok(extensions.to_vec())
    }

    fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> RhiResult<vk::SurfaceKHR> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| RhiError::SurfaceError(format!("Failed to get display handle: {}", e)))?;

        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| RhiError::SurfaceError(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: entry and instance are valid, and both handles come from a
        // live winit window that outlives the surface.
        let surface = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| RhiError::SurfaceError(format!("Failed to create Vulkan surface: {}", e)))?
        };

        Ok(surface)
    }
}

//! ember - demo driver for the Vulkan renderer core.
//!
//! Opens a window, clears it every frame and rebuilds a small overlay's
//! per-image state whenever the swapchain is recreated.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use ember_core::RendererConfig;
use ember_platform::Window;
use ember_renderer::{
    BeginFrame, EndFrame, FrameBackend, ListenerContext, Renderer, SwapchainListener,
    VulkanBackend,
};
use ember_rhi::RhiResult;

const CONFIG_PATH: &str = "ember.toml";

/// Per-image tint state, rebuilt with the swapchain.
#[derive(Default)]
struct Overlay {
    tints: Vec<[f32; 4]>,
    rebuilds: u32,
}

impl SwapchainListener<VulkanBackend> for Overlay {
    fn on_cleanup(&mut self, _ctx: &ListenerContext<'_, VulkanBackend>) -> RhiResult<()> {
        self.tints.clear();
        Ok(())
    }

    fn on_recreate(&mut self, ctx: &ListenerContext<'_, VulkanBackend>) -> RhiResult<()> {
        let backend = ctx.backend();
        let image_count = backend.image_count();

        let scratch = ctx.arenas().swap_chain().alloc_slice::<[f32; 4]>(image_count)?;
        for (i, tint) in scratch.iter_mut().enumerate() {
            let t = (i + 1) as f32 / image_count as f32;
            *tint = [t, 1.0 - t, 0.5, 1.0];
        }
        self.tints = scratch.to_vec();
        self.rebuilds += 1;

        if let Some(extent) = backend.extent() {
            debug!(
                "Overlay rebuilt for {} image(s) at {}x{} (rebuild {})",
                image_count, extent.width, extent.height, self.rebuilds
            );
        }
        Ok(())
    }
}

struct App {
    config: RendererConfig,
    window: Option<Window>,
    renderer: Option<Renderer>,
    overlay: Rc<RefCell<Overlay>>,
    window_resized: bool,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            overlay: Rc::new(RefCell::new(Overlay::default())),
            window_resized: false,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, 1280, 720, &self.config.app_name)?;
        let mut renderer = Renderer::new(window.clone(), &self.config)?;

        renderer.register_listener(self.overlay.clone())?;
        // The swapchain already exists; build the overlay state once now.
        renderer.recreate_swapchain()?;

        info!("Initialization complete, entering main loop");
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn draw(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        match renderer.begin_frame()? {
            BeginFrame::Recording { .. } => {
                let resized = std::mem::take(&mut self.window_resized);
                if renderer.end_frame(resized)? == EndFrame::Recreated {
                    debug!("Swapchain recreated after present");
                }
            }
            BeginFrame::Dropped => {
                // The rebuild already read the current window size.
                self.window_resized = false;
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.wait_idle()?;
            renderer.release()?;
        }
        self.window = None;
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.init(event_loop)
        {
            error!("Failed to initialize: {:#}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                if let Err(e) = self.shutdown() {
                    error!("Shutdown failed: {:#}", e);
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                self.window_resized = true;
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.draw() {
                    error!("Render error: {:#}", e);
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn load_config() -> Result<RendererConfig> {
    let path = Path::new(CONFIG_PATH);
    if path.exists() {
        info!("Loading configuration from {}", path.display());
        RendererConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))
    } else {
        Ok(RendererConfig::default())
    }
}

fn main() -> Result<()> {
    ember_core::init_logging();
    info!("Starting ember");

    let config = load_config()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}

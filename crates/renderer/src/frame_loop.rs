//! Frame protocol and swapchain state machine.
//!
//! ```text
//!            new (size > 0)
//!   ───────────────────────────► Ready ◄────────────────┐
//!            new (size = 0)        │ stale / resized    │ size > 0
//!   ───────────► Suspended ◄───────┤ (recreate)         │
//!                   │              ▼                    │
//!                   └── begin_frame retries ────────────┘
//!
//!   any ── release ──► Released
//! ```
//!
//! A recreate waits for the device, runs every listener's `on_cleanup`,
//! destroys the swapchain resources and, when the window has a drawable area,
//! builds them again and runs every listener's `on_recreate`.

use std::cell::RefCell;
use std::rc::Rc;

use ember_core::FrameArenas;
use ember_rhi::sync::MAX_FRAMES_IN_FLIGHT;
use ember_rhi::{RhiError, RhiResult};
use tracing::{debug, info, trace};

use crate::backend::{AcquireOutcome, FrameBackend, PresentOutcome};
use crate::listener::{ListenerContext, ListenerRegistry, SwapchainListener};

/// Swapchain lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapchainState {
    /// Swapchain resources exist; frames can be drawn.
    Ready,
    /// The window has no drawable area; no swapchain resources exist.
    Suspended,
    /// Terminal.
    Released,
}

/// Result of [`FrameLoop::begin_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BeginFrame {
    /// The command buffer of `image_index` is recording inside the render pass.
    Recording { image_index: u32 },
    /// Nothing is drawn this tick: the swapchain was rebuilt or is suspended.
    Dropped,
}

/// Result of [`FrameLoop::end_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndFrame {
    Presented,
    /// The frame was presented (or dropped by the driver) and the swapchain
    /// was rebuilt afterwards.
    Recreated,
}

/// Drives a [`FrameBackend`] through the per-frame protocol.
pub struct FrameLoop<B: FrameBackend> {
    backend: B,
    listeners: ListenerRegistry<B>,
    arenas: FrameArenas,
    state: SwapchainState,
    current_frame: usize,
    /// Image whose command buffer is recording, between begin and end.
    recording: Option<u32>,
    /// Fence of the slot that last submitted work for each swapchain image.
    images_in_flight: Vec<Option<B::Fence>>,
}

impl<B: FrameBackend> FrameLoop<B> {
    /// Builds the swapchain resources for the current drawable size.
    ///
    /// Starts suspended when the window has no drawable area.
    pub fn new(
        mut backend: B,
        arenas: FrameArenas,
        max_listener_count: usize,
    ) -> RhiResult<Self> {
        let (width, height) = backend.drawable_size();
        let state = if width == 0 || height == 0 {
            info!("Window has no drawable area, swapchain suspended");
            SwapchainState::Suspended
        } else {
            backend.create_swapchain_resources(width, height)?;
            SwapchainState::Ready
        };

        let images_in_flight = vec![None; backend.image_count()];

        Ok(Self {
            backend,
            listeners: ListenerRegistry::new(max_listener_count),
            arenas,
            state,
            current_frame: 0,
            recording: None,
            images_in_flight,
        })
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn arenas(&self) -> &FrameArenas {
        &self.arenas
    }

    /// Frame-in-flight slot used by the next frame.
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    #[inline]
    pub fn state(&self) -> SwapchainState {
        self.state
    }

    /// Image being recorded, if a frame is open.
    #[inline]
    pub fn image_index(&self) -> Option<u32> {
        self.recording
    }

    #[inline]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Adds a listener called on every swapchain cleanup and recreate.
    ///
    /// Listeners registered after the swapchain was built get their first
    /// call on the next rebuild.
    pub fn register_listener<L>(&mut self, listener: Rc<RefCell<L>>) -> RhiResult<()>
    where
        L: SwapchainListener<B> + 'static,
    {
        self.ensure_not_released()?;
        self.listeners.register(listener)
    }

    /// Opens a frame.
    ///
    /// Waits for the slot's previous submission, acquires an image, waits for
    /// any other slot still using that image and starts recording.
    pub fn begin_frame(&mut self) -> RhiResult<BeginFrame> {
        self.ensure_not_released()?;
        if self.recording.is_some() {
            return Err(RhiError::FrameState(
                "begin_frame called while a frame is recording",
            ));
        }

        if self.state == SwapchainState::Suspended {
            self.recreate()?;
            if self.state == SwapchainState::Suspended {
                return Ok(BeginFrame::Dropped);
            }
        }

        let slot = self.current_frame;
        let fence = self.backend.in_flight_fence(slot);
        self.backend.wait_fence(fence)?;

        let image_index = match self.backend.acquire_next_image(slot)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    trace!("Acquired image {} from a suboptimal swapchain", image_index);
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date on acquire");
                self.recreate()?;
                return Ok(BeginFrame::Dropped);
            }
        };

        let image = image_index as usize;
        if image >= self.images_in_flight.len() {
            return Err(RhiError::SwapchainError(format!(
                "acquired image index {} out of range ({} images)",
                image_index,
                self.images_in_flight.len()
            )));
        }

        if let Some(previous) = self.images_in_flight[image]
            && previous != fence
        {
            self.backend.wait_fence(previous)?;
        }
        self.images_in_flight[image] = Some(fence);
        self.backend.reset_fence(fence)?;

        self.backend.begin_recording(image_index)?;
        self.recording = Some(image_index);

        Ok(BeginFrame::Recording { image_index })
    }

    /// Closes, submits and presents the open frame.
    ///
    /// `window_resized` forces a rebuild even when the present succeeded.
    /// The frame arena is emptied either way.
    pub fn end_frame(&mut self, window_resized: bool) -> RhiResult<EndFrame> {
        self.ensure_not_released()?;
        let image_index = self
            .recording
            .ok_or(RhiError::FrameState("end_frame called without a recording frame"))?;

        let slot = self.current_frame;
        self.recording = None;
        self.backend.end_recording(image_index)?;
        self.backend.submit(slot, image_index)?;
        let outcome = self.backend.present(slot, image_index)?;

        let result = if outcome == PresentOutcome::Stale || window_resized {
            debug!(
                "Recreating swapchain after present (stale: {}, resized: {})",
                outcome == PresentOutcome::Stale,
                window_resized
            );
            self.recreate()?;
            EndFrame::Recreated
        } else {
            self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
            EndFrame::Presented
        };

        self.arenas.end_frame();
        trace!("Frame arena emptied");

        Ok(result)
    }

    /// Blocks until the device is idle.
    pub fn wait_idle(&mut self) -> RhiResult<()> {
        self.ensure_not_released()?;
        self.backend.wait_idle()
    }

    /// Final teardown of the swapchain side: cleanup without recreate.
    ///
    /// The backend itself is destroyed when the loop is dropped.
    pub fn release(&mut self) -> RhiResult<()> {
        self.ensure_not_released()?;

        self.backend.wait_idle()?;
        self.recording = None;
        if self.state == SwapchainState::Ready {
            self.cleanup()?;
        }
        self.state = SwapchainState::Released;

        info!("Frame loop released");
        Ok(())
    }

    /// Destroys and, if the window has a drawable area, rebuilds the
    /// swapchain resources with the listener fan-out around it.
    pub fn recreate(&mut self) -> RhiResult<()> {
        self.ensure_not_released()?;
        if self.recording.is_some() {
            return Err(RhiError::FrameState(
                "cannot recreate the swapchain while a frame is recording",
            ));
        }

        if self.state == SwapchainState::Ready {
            self.backend.wait_idle()?;
            self.cleanup()?;
            self.state = SwapchainState::Suspended;
        }

        let (width, height) = self.backend.drawable_size();
        if width == 0 || height == 0 {
            debug!("Window has no drawable area, swapchain suspended");
            return Ok(());
        }

        self.backend.create_swapchain_resources(width, height)?;
        self.images_in_flight = vec![None; self.backend.image_count()];
        self.state = SwapchainState::Ready;

        let ctx = ListenerContext::new(&self.backend, &self.arenas);
        self.listeners.notify_recreate(&ctx)?;

        info!("Swapchain recreated at {}x{}", width, height);
        Ok(())
    }

    fn cleanup(&mut self) -> RhiResult<()> {
        let ctx = ListenerContext::new(&self.backend, &self.arenas);
        self.listeners.notify_cleanup(&ctx)?;

        self.backend.destroy_swapchain_resources();
        self.images_in_flight.clear();
        self.arenas.end_swap_chain();
        trace!("Swap-chain arena emptied");
        Ok(())
    }

    fn ensure_not_released(&self) -> RhiResult<()> {
        if self.state == SwapchainState::Released {
            Err(RhiError::FrameState("renderer has been released"))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
impl<B: FrameBackend> FrameLoop<B> {
    pub(crate) fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

//! Synchronization primitives.
//!
//! - [`Semaphore`] orders GPU work (acquire → submit → present)
//! - [`Fence`] lets the CPU wait for a submission to finish
//! - [`FrameSync`] bundles the objects owned by one frame-in-flight slot
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_rhi::device::Device;
//! use ember_rhi::sync::{FrameSync, MAX_FRAMES_IN_FLIGHT};
//!
//! # fn example(device: Arc<Device>) -> ember_rhi::RhiResult<()> {
//! let frame_syncs = FrameSync::create_slots(&device, MAX_FRAMES_IN_FLIGHT)?;
//!
//! let slot = &frame_syncs[0];
//! slot.in_flight_fence().wait_forever()?;
//! slot.in_flight_fence().reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Vulkan semaphore wrapper, created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new unsignaled semaphore.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - Creates the fence signaled, so that a wait issued before
    ///   its first submission returns immediately
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits for the fence to become signaled.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Timeout in nanoseconds
    ///
    /// # Errors
    ///
    /// Returns `vk::Result::TIMEOUT` if the timeout expires, or any other
    /// error reported by the driver.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout)?
        };
        Ok(())
    }

    /// Waits without a timeout. A GPU that never signals is not recoverable.
    pub fn wait_forever(&self) -> RhiResult<()> {
        self.wait(u64::MAX)
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be pending in any queue submission.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects of one frame-in-flight slot.
///
/// ```text
/// 1. Wait on in_flight_fence (the slot's previous submission is done)
/// 2. Acquire an image, signaling image_available
/// 3. Reset in_flight_fence
/// 4. Submit: wait image_available, signal render_finished and in_flight_fence
/// 5. Present, waiting on render_finished
/// ```
pub struct FrameSync {
    image_available_semaphore: Semaphore,
    render_finished_semaphore: Semaphore,
    in_flight_fence: Fence,
}

impl FrameSync {
    /// Creates the objects of one slot; the fence starts signaled.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let image_available_semaphore = Semaphore::new(device.clone())?;
        let render_finished_semaphore = Semaphore::new(device.clone())?;
        let in_flight_fence = Fence::new(device, true)?;

        Ok(Self {
            image_available_semaphore,
            render_finished_semaphore,
            in_flight_fence,
        })
    }

    /// Creates `count` slots.
    pub fn create_slots(device: &Arc<Device>, count: usize) -> RhiResult<Vec<Self>> {
        let slots = (0..count)
            .map(|_| Self::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        debug!("Created synchronization objects for {} frame slot(s)", count);
        Ok(slots)
    }

    /// Replaces both semaphores with fresh unsignaled ones.
    ///
    /// A present that reports an out-of-date swapchain may leave the
    /// render-finished semaphore in an unknown state. The device must be idle.
    pub fn renew_semaphores(&mut self, device: &Arc<Device>) -> RhiResult<()> {
        self.image_available_semaphore = Semaphore::new(device.clone())?;
        self.render_finished_semaphore = Semaphore::new(device.clone())?;
        Ok(())
    }

    #[inline]
    pub fn image_available_semaphore(&self) -> &Semaphore {
        &self.image_available_semaphore
    }

    #[inline]
    pub fn render_finished_semaphore(&self) -> &Semaphore {
        &self.render_finished_semaphore
    }

    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight_fence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_frames_in_flight_constant() {
        assert_eq!(MAX_FRAMES_IN_FLIGHT, 2);
    }

    #[test]
    fn test_sync_objects_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
    }
}

//! Recording [`FrameBackend`] for frame protocol tests.
//!
//! Fences follow the Vulkan rules: a submission moves a reset fence to
//! pending, and only a wait (or a device-wide idle) completes it. Anything the
//! real driver would reject or deadlock on is recorded as a violation instead.

use std::collections::{HashSet, VecDeque};

use ember_rhi::RhiResult;
use ember_rhi::sync::MAX_FRAMES_IN_FLIGHT;

use crate::backend::{AcquireOutcome, FrameBackend, PresentOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FenceState {
    Signaled,
    Reset,
    /// Guards the submission with this id.
    Pending(u64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    WaitFence(usize),
    ResetFence(usize),
    Acquire { slot: usize },
    BeginRecording(u32),
    EndRecording(u32),
    Submit { slot: usize, image_index: u32 },
    Present { slot: usize, image_index: u32 },
    WaitIdle,
    CreateResources { width: u32, height: u32 },
    DestroyResources,
}

pub(crate) struct MockBackend {
    fences: [FenceState; MAX_FRAMES_IN_FLIGHT],
    completed: HashSet<u64>,
    next_submission: u64,
    /// Last submission that wrote each image.
    image_submissions: Vec<Option<u64>>,
    configured_image_count: usize,
    built: bool,
    next_image: u32,
    recording: Option<u32>,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    drawable_size: (u32, u32),
    pub(crate) calls: Vec<Call>,
    pub(crate) violations: Vec<String>,
}

impl MockBackend {
    pub(crate) fn new(image_count: usize) -> Self {
        Self {
            fences: [FenceState::Signaled; MAX_FRAMES_IN_FLIGHT],
            completed: HashSet::new(),
            next_submission: 0,
            image_submissions: Vec::new(),
            configured_image_count: image_count,
            built: false,
            next_image: 0,
            recording: None,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            drawable_size: (800, 600),
            calls: Vec::new(),
            violations: Vec::new(),
        }
    }

    pub(crate) fn set_drawable_size(&mut self, width: u32, height: u32) {
        self.drawable_size = (width, height);
    }

    /// Image count used by the next swapchain build.
    pub(crate) fn set_image_count(&mut self, image_count: usize) {
        self.configured_image_count = image_count;
    }

    /// Outcome of the next acquire; unscripted acquires cycle through the images.
    pub(crate) fn script_acquire(&mut self, outcome: AcquireOutcome) {
        self.acquire_script.push_back(outcome);
    }

    /// Outcome of the next present; unscripted presents succeed.
    pub(crate) fn script_present(&mut self, outcome: PresentOutcome) {
        self.present_script.push_back(outcome);
    }

    pub(crate) fn fence_state(&self, slot: usize) -> FenceState {
        self.fences[slot]
    }

    pub(crate) fn has_resources(&self) -> bool {
        self.built
    }

    pub(crate) fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|&&c| c == call).count()
    }

    pub(crate) fn count_matching(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|&c| pred(c)).count()
    }

    pub(crate) fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn violation(&mut self, message: String) {
        self.violations.push(message);
    }
}

impl FrameBackend for MockBackend {
    type Fence = usize;

    fn in_flight_fence(&self, slot: usize) -> usize {
        slot
    }

    fn wait_fence(&mut self, fence: usize) -> RhiResult<()> {
        self.calls.push(Call::WaitFence(fence));
        match self.fences[fence] {
            FenceState::Signaled => {}
            FenceState::Reset => {
                self.violation(format!("wait on fence {} that nothing will signal", fence));
            }
            FenceState::Pending(submission) => {
                self.completed.insert(submission);
                self.fences[fence] = FenceState::Signaled;
            }
        }
        Ok(())
    }

    fn reset_fence(&mut self, fence: usize) -> RhiResult<()> {
        self.calls.push(Call::ResetFence(fence));
        if let FenceState::Pending(_) = self.fences[fence] {
            self.violation(format!("reset of pending fence {}", fence));
        }
        self.fences[fence] = FenceState::Reset;
        Ok(())
    }

    fn acquire_next_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
        self.calls.push(Call::Acquire { slot });
        if !self.built {
            self.violation("acquire without a swapchain".to_string());
        }

        if let Some(outcome) = self.acquire_script.pop_front() {
            return Ok(outcome);
        }

        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.configured_image_count.max(1) as u32;
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn begin_recording(&mut self, image_index: u32) -> RhiResult<()> {
        self.calls.push(Call::BeginRecording(image_index));
        if self.recording.is_some() {
            self.violation("begin_recording while recording".to_string());
        }
        if let Some(&Some(submission)) = self.image_submissions.get(image_index as usize)
            && !self.completed.contains(&submission)
        {
            self.violation(format!(
                "image {} reused while submission {} may still be running",
                image_index, submission
            ));
        }
        self.recording = Some(image_index);
        Ok(())
    }

    fn end_recording(&mut self, image_index: u32) -> RhiResult<()> {
        self.calls.push(Call::EndRecording(image_index));
        if self.recording != Some(image_index) {
            self.violation(format!("end_recording({}) without matching begin", image_index));
        }
        self.recording = None;
        Ok(())
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        self.calls.push(Call::Submit { slot, image_index });
        if self.fences[slot] != FenceState::Reset {
            self.violation(format!("submit with unreset fence {}", slot));
        }

        let submission = self.next_submission;
        self.next_submission += 1;
        self.fences[slot] = FenceState::Pending(submission);
        if let Some(entry) = self.image_submissions.get_mut(image_index as usize) {
            *entry = Some(submission);
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
        self.calls.push(Call::Present { slot, image_index });
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Presented))
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.calls.push(Call::WaitIdle);
        for fence in &mut self.fences {
            if let FenceState::Pending(submission) = *fence {
                self.completed.insert(submission);
                *fence = FenceState::Signaled;
            }
        }
        Ok(())
    }

    fn drawable_size(&self) -> (u32, u32) {
        self.drawable_size
    }

    fn create_swapchain_resources(&mut self, width: u32, height: u32) -> RhiResult<()> {
        self.calls.push(Call::CreateResources { width, height });
        if self.built {
            self.violation("swapchain resources built twice".to_string());
        }
        self.built = true;
        self.next_image = 0;
        self.image_submissions = vec![None; self.configured_image_count];
        Ok(())
    }

    fn destroy_swapchain_resources(&mut self) {
        self.calls.push(Call::DestroyResources);
        if self
            .fences
            .iter()
            .any(|fence| matches!(fence, FenceState::Pending(_)))
        {
            self.violation("swapchain resources destroyed while work is pending".to_string());
        }
        self.built = false;
        self.image_submissions.clear();
    }

    fn image_count(&self) -> usize {
        if self.built {
            self.configured_image_count
        } else {
            0
        }
    }
}

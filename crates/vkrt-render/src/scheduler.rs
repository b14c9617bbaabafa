//! Double-buffered frame pacing.
//!
//! [`FrameScheduler`] owns the frame counter and drives one frame through a
//! [`FrameBackend`]. The backend performs the actual GPU calls, which keeps the
//! fence discipline testable without a device.

use vkrt_core::constants::MAX_FRAMES_IN_FLIGHT;

/// The GPU-facing steps of one frame, addressed by slot index.
pub trait FrameBackend {
    type Error;

    /// Block until the slot's previous submission has finished.
    fn wait_for_slot(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Write this frame's uniforms into the slot's mapped buffer.
    fn write_uniforms(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Acquire a swapchain image, signaling the slot's image-available semaphore.
    ///
    /// `Ok(None)` means the swapchain is out of date and nothing was acquired.
    /// Otherwise returns the image index and whether the swapchain is suboptimal.
    fn acquire_image(&mut self, slot: usize) -> Result<Option<(u32, bool)>, Self::Error>;

    /// Reset and re-record the slot's command buffer for `image_index`.
    fn record(&mut self, slot: usize, image_index: u32) -> Result<(), Self::Error>;

    /// Return the slot's fence to the unsignaled state.
    fn reset_fence(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Submit the slot's command buffer; its fence signals on completion.
    fn submit(&mut self, slot: usize) -> Result<(), Self::Error>;

    /// Present `image_index`. Returns `true` when the swapchain should be recreated.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<bool, Self::Error>;
}

/// What happened to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and presented.
    Presented {
        slot: usize,
        image_index: u32,
        /// Acquire or present reported a suboptimal or out-of-date swapchain.
        swapchain_stale: bool,
    },
    /// Acquire found the swapchain out of date. Nothing was submitted and the
    /// slot is reused by the next frame.
    SwapchainOutOfDate { slot: usize },
}

impl FrameOutcome {
    /// True when the caller should recreate the swapchain before the next frame.
    pub fn needs_recreate(&self) -> bool {
        match self {
            Self::Presented {
                swapchain_stale, ..
            } => *swapchain_stale,
            Self::SwapchainOutOfDate { .. } => true,
        }
    }
}

/// Cycles frames through [`MAX_FRAMES_IN_FLIGHT`] slots.
#[derive(Debug)]
pub struct FrameScheduler {
    frame_counter: u64,
    /// Per slot: the fence is signaled, or submitted work will signal it.
    /// False only between a fence reset and a successful submit.
    fence_live: [bool; MAX_FRAMES_IN_FLIGHT],
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self {
            frame_counter: 0,
            // Slot fences are created signaled.
            fence_live: [true; MAX_FRAMES_IN_FLIGHT],
        }
    }
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames submitted so far.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Slot the next frame will use.
    pub fn current_slot(&self) -> usize {
        (self.frame_counter % MAX_FRAMES_IN_FLIGHT as u64) as usize
    }

    /// Slots whose fence is safe to wait on.
    ///
    /// A fence reset by a frame whose submit failed is never signaled, so
    /// waiting on it would block forever. Teardown drains only these slots.
    pub fn waitable_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_FRAMES_IN_FLIGHT).filter(|&slot| self.fence_live[slot])
    }

    /// Run one frame.
    ///
    /// The slot's fence is reset only after the command buffer was recorded
    /// and immediately before the submit that signals it again. An
    /// out-of-date swapchain or a failed record leaves the fence signaled.
    /// The counter advances only once the frame was submitted.
    pub fn render_frame<B: FrameBackend>(
        &mut self,
        backend: &mut B,
    ) -> Result<FrameOutcome, B::Error> {
        let slot = self.current_slot();

        // A fence orphaned by a failed submit has no work to wait for.
        if self.fence_live[slot] {
            backend.wait_for_slot(slot)?;
        }
        backend.write_uniforms(slot)?;

        let Some((image_index, suboptimal)) = backend.acquire_image(slot)? else {
            tracing::debug!(slot, "Swapchain out of date on acquire");
            return Ok(FrameOutcome::SwapchainOutOfDate { slot });
        };

        backend.record(slot, image_index)?;
        backend.reset_fence(slot)?;
        self.fence_live[slot] = false;
        backend.submit(slot)?;
        self.fence_live[slot] = true;
        let present_stale = backend.present(slot, image_index)?;

        self.frame_counter += 1;

        tracing::trace!(
            frame = self.frame_counter,
            slot,
            image_index,
            "Frame presented"
        );

        Ok(FrameOutcome::Presented {
            slot,
            image_index,
            swapchain_stale: suboptimal || present_stale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Uniforms(usize),
        Acquire(usize),
        Reset(usize),
        Record(usize),
        Submit(usize),
        Present(usize),
    }

    /// Fence double driven by a simulated clock.
    ///
    /// The GPU executes submissions one after another, each taking
    /// `gpu_frame_time`. Recording costs `cpu_record_time` of CPU time.
    struct SimulatedBackend {
        now: f64,
        gpu_frame_time: f64,
        cpu_record_time: f64,
        gpu_free_at: f64,
        fence_signaled: [bool; MAX_FRAMES_IN_FLIGHT],
        /// Completion time of each slot's outstanding submission.
        pending: [Option<f64>; MAX_FRAMES_IN_FLIGHT],
        waits: Vec<(usize, f64)>,
        calls: Vec<Call>,
        next_image: u32,
        image_count: u32,
        out_of_date_acquires: usize,
        suboptimal_present: bool,
        fail_record: Option<&'static str>,
        fail_submit: Option<&'static str>,
    }

    impl SimulatedBackend {
        fn new(gpu_frame_time: f64, cpu_record_time: f64) -> Self {
            Self {
                now: 0.0,
                gpu_frame_time,
                cpu_record_time,
                gpu_free_at: 0.0,
                fence_signaled: [true; MAX_FRAMES_IN_FLIGHT],
                pending: [None; MAX_FRAMES_IN_FLIGHT],
                waits: Vec::new(),
                calls: Vec::new(),
                next_image: 0,
                image_count: 3,
                out_of_date_acquires: 0,
                suboptimal_present: false,
                fail_record: None,
                fail_submit: None,
            }
        }

        /// Signal every fence whose work finished by `now`.
        fn retire(&mut self) {
            for slot in 0..MAX_FRAMES_IN_FLIGHT {
                if self.pending[slot].is_some_and(|done| done <= self.now) {
                    self.pending[slot] = None;
                    self.fence_signaled[slot] = true;
                }
            }
        }

        fn outstanding(&self) -> usize {
            self.pending
                .iter()
                .filter(|done| done.is_some_and(|done| done > self.now))
                .count()
        }

        fn slots_used(&self) -> Vec<usize> {
            self.calls
                .iter()
                .filter_map(|call| match call {
                    Call::Submit(slot) => Some(*slot),
                    _ => None,
                })
                .collect()
        }
    }

    impl FrameBackend for SimulatedBackend {
        type Error = String;

        fn wait_for_slot(&mut self, slot: usize) -> Result<(), String> {
            self.calls.push(Call::Wait(slot));
            let start = self.now;
            if !self.fence_signaled[slot] {
                let done = self.pending[slot].ok_or("unsignaled fence with no work")?;
                self.now = self.now.max(done);
            }
            self.retire();
            self.waits.push((slot, self.now - start));
            Ok(())
        }

        fn write_uniforms(&mut self, slot: usize) -> Result<(), String> {
            self.calls.push(Call::Uniforms(slot));
            if self.pending[slot].is_some() {
                return Err(format!("uniforms of slot {slot} written while in use"));
            }
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> Result<Option<(u32, bool)>, String> {
            self.calls.push(Call::Acquire(slot));
            if self.out_of_date_acquires > 0 {
                self.out_of_date_acquires -= 1;
                return Ok(None);
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(Some((index, false)))
        }

        fn reset_fence(&mut self, slot: usize) -> Result<(), String> {
            self.calls.push(Call::Reset(slot));
            if self.pending[slot].is_some() {
                return Err(format!("fence of slot {slot} reset while work is pending"));
            }
            self.fence_signaled[slot] = false;
            Ok(())
        }

        fn record(&mut self, slot: usize, _image_index: u32) -> Result<(), String> {
            self.calls.push(Call::Record(slot));
            if let Some(error) = self.fail_record.take() {
                return Err(error.into());
            }
            if self.pending[slot].is_some() {
                return Err(format!("slot {slot} re-recorded while work is pending"));
            }
            self.now += self.cpu_record_time;
            self.retire();
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> Result<(), String> {
            self.calls.push(Call::Submit(slot));
            if let Some(error) = self.fail_submit.take() {
                return Err(error.into());
            }
            if self.fence_signaled[slot] {
                return Err(format!("slot {slot} submitted with a signaled fence"));
            }
            let done = self.gpu_free_at.max(self.now) + self.gpu_frame_time;
            self.gpu_free_at = done;
            self.pending[slot] = Some(done);
            if self.outstanding() > MAX_FRAMES_IN_FLIGHT {
                return Err("more frames in flight than slots".into());
            }
            Ok(())
        }

        fn present(&mut self, slot: usize, _image_index: u32) -> Result<bool, String> {
            self.calls.push(Call::Present(slot));
            Ok(self.suboptimal_present)
        }
    }

    #[test]
    fn slots_alternate_zero_one_zero() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = SimulatedBackend::new(10.0, 1.0);

        for _ in 0..3 {
            scheduler.render_frame(&mut backend).unwrap();
        }

        assert_eq!(backend.slots_used(), vec![0, 1, 0]);
        assert_eq!(scheduler.frame_counter(), 3);
    }

    #[test]
    fn third_frame_waits_at_most_one_gpu_frame() {
        let gpu_frame_time = 10.0;
        let mut scheduler = FrameScheduler::new();
        let mut backend = SimulatedBackend::new(gpu_frame_time, 1.0);

        for _ in 0..3 {
            scheduler.render_frame(&mut backend).unwrap();
        }

        let waits: Vec<f64> = backend.waits.iter().map(|(_, waited)| *waited).collect();
        assert_eq!(waits[0], 0.0);
        assert_eq!(waits[1], 0.0);
        assert!(waits[2] > 0.0, "slot 0 is still busy when frame 2 starts");
        assert!(waits[2] <= gpu_frame_time);
    }

    #[test]
    fn gpu_bound_loop_never_exceeds_two_frames_in_flight() {
        let gpu_frame_time = 16.0;
        let mut scheduler = FrameScheduler::new();
        let mut backend = SimulatedBackend::new(gpu_frame_time, 0.5);

        for _ in 0..50 {
            scheduler.render_frame(&mut backend).unwrap();
            assert!(backend.outstanding() <= MAX_FRAMES_IN_FLIGHT);
        }

        for (_, waited) in &backend.waits {
            assert!(*waited <= gpu_frame_time);
        }
        // Once saturated the CPU runs exactly one GPU frame per frame.
        assert!(backend.now >= 48.0 * gpu_frame_time);
    }

    #[test]
    fn cpu_bound_loop_never_waits() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = SimulatedBackend::new(1.0, 5.0);

        for _ in 0..10 {
            scheduler.render_frame(&mut backend).unwrap();
        }

        assert!(backend.waits.iter().all(|(_, waited)| *waited == 0.0));
    }

    #[test]
    fn steps_run_in_frame_order() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = SimulatedBackend::new(10.0, 1.0);

        scheduler.render_frame(&mut backend).unwrap();

        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(0),
                Call::Uniforms(0),
                Call::Acquire(0),
                Call::Record(0),
                Call::Reset(0),
                Call::Submit(0),
                Call::Present(0),
            ]
        );
    }

    #[test]
    fn out_of_date_acquire_keeps_fence_signaled() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = SimulatedBackend::new(10.0, 1.0);
        backend.out_of_date_acquires = 1;

        let outcome = scheduler.render_frame(&mut backend).unwrap();
        assert_eq!(outcome, FrameOutcome::SwapchainOutOfDate { slot: 0 });
        assert!(outcome.needs_recreate());
        assert!(backend.fence_signaled[0]);
        assert_eq!(scheduler.frame_counter(), 0);
        assert!(!backend.calls.contains(&Call::Reset(0)));

        // The retry reuses slot 0 and does not block on its fence.
        let outcome = scheduler.render_frame(&mut backend).unwrap();
        assert!(matches!(outcome, FrameOutcome::Presented { slot: 0, .. }));
        assert_eq!(backend.waits[1], (0, 0.0));
    }

    #[test]
    fn suboptimal_present_marks_swapchain_stale() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = SimulatedBackend::new(10.0, 1.0);
        backend.suboptimal_present = true;

        let outcome = scheduler.render_frame(&mut backend).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Presented {
                slot: 0,
                image_index: 0,
                swapchain_stale: true,
            }
        );
    }

    #[test]
    fn backend_errors_do_not_advance_the_counter() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = SimulatedBackend::new(10.0, 1.0);
        backend.fail_submit = Some("device lost");

        assert_eq!(scheduler.render_frame(&mut backend), Err("device lost".to_string()));
        assert_eq!(scheduler.frame_counter(), 0);
        assert!(!backend.calls.contains(&Call::Present(0)));
    }

    /// Wait on every fence teardown would wait on.
    fn drain(scheduler: &FrameScheduler, backend: &mut SimulatedBackend) -> Result<(), String> {
        for slot in scheduler.waitable_slots() {
            backend.wait_for_slot(slot)?;
        }
        Ok(())
    }

    #[test]
    fn failed_record_leaves_fence_signaled() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = SimulatedBackend::new(10.0, 1.0);
        backend.fail_record = Some("begin_command_buffer: OUT_OF_HOST_MEMORY");

        assert!(scheduler.render_frame(&mut backend).is_err());
        assert!(!backend.calls.contains(&Call::Reset(0)));
        assert!(backend.fence_signaled[0]);
        assert_eq!(scheduler.waitable_slots().collect::<Vec<_>>(), vec![0, 1]);
        drain(&scheduler, &mut backend).unwrap();
    }

    #[test]
    fn failed_submit_is_not_waited_on() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = SimulatedBackend::new(10.0, 1.0);
        scheduler.render_frame(&mut backend).unwrap();
        scheduler.render_frame(&mut backend).unwrap();

        backend.fail_submit = Some("queue_submit: OUT_OF_DEVICE_MEMORY");
        assert!(scheduler.render_frame(&mut backend).is_err());

        // Slot 0's fence was reset and never submitted.
        assert!(!backend.fence_signaled[0]);
        assert!(backend.pending[0].is_none());
        assert_eq!(scheduler.waitable_slots().collect::<Vec<_>>(), vec![1]);
        drain(&scheduler, &mut backend).unwrap();
    }

    #[test]
    fn frame_after_failed_submit_skips_the_orphaned_fence() {
        let mut scheduler = FrameScheduler::new();
        let mut backend = SimulatedBackend::new(10.0, 1.0);
        backend.fail_submit = Some("queue_submit: OUT_OF_DEVICE_MEMORY");
        assert!(scheduler.render_frame(&mut backend).is_err());

        let outcome = scheduler.render_frame(&mut backend).unwrap();
        assert!(matches!(outcome, FrameOutcome::Presented { slot: 0, .. }));
        assert_eq!(scheduler.frame_counter(), 1);
        assert_eq!(scheduler.waitable_slots().count(), MAX_FRAMES_IN_FLIGHT);
        drain(&scheduler, &mut backend).unwrap();
    }
}

// SPDX-License-Identifier: CEPL-1.0
//! Per-frame sequencing, kept apart from the Vulkan calls that carry it out.
//!
//! `FrameLoop` walks one frame through
//! `Idle -> ImageAcquired -> RecordingCommands -> Submitted -> Presented -> Idle`
//! against anything implementing [`FrameDevice`].

use crate::error::VkError;
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    ImageAcquired,
    RecordingCommands,
    Submitted,
    Presented,
}

/// Outcome of a bounded fence wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceStatus {
    Signaled,
    NotReady,
}

/// The device-side half of a frame. `slot` indexes the sync pool, `image`
/// the swapchain.
pub trait FrameDevice {
    /// Blocks until an image is available; signals the slot's semaphore.
    fn acquire(&mut self, slot: usize) -> Result<u32, VkError>;
    fn record(&mut self, image: u32) -> Result<(), VkError>;
    /// Waits on the slot's semaphore, signals the slot's fence.
    fn submit(&mut self, slot: usize) -> Result<(), VkError>;
    fn wait(&mut self, slot: usize, timeout_ns: u64) -> Result<FenceStatus, VkError>;
    fn present(&mut self, image: u32) -> Result<(), VkError>;
    /// Returns the slot to the pool, ready for its next submit.
    fn release(&mut self, slot: usize) -> Result<(), VkError>;
}

pub struct FrameLoop {
    state: FrameState,
    slot: usize,
    slot_count: usize,
    fence_timeout_ns: u64,
    frames: u64,
    /// Slots whose fence was signaled by a submit but never released.
    fence_pending: Vec<bool>,
    stranded: Option<usize>,
}

impl FrameLoop {
    pub fn new(slot_count: usize, fence_timeout_ns: u64) -> Self {
        let slot_count = slot_count.max(1);
        Self {
            state: FrameState::Idle,
            slot: 0,
            slot_count,
            fence_timeout_ns,
            frames: 0,
            fence_pending: vec![false; slot_count],
            stranded: None,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Completed frames so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Runs one full frame and returns the presented image index.
    ///
    /// On error the frame is abandoned and the loop goes back to `Idle` on
    /// the same slot. A fence left signaled by the abandoned frame is waited
    /// on and released before the slot's next acquire. A failure between a
    /// successful acquire and a successful submit leaves the slot's semaphore
    /// signaled with nothing to consume it; every later call then returns
    /// [`VkError::StrandedSlot`].
    pub fn render<D: FrameDevice + ?Sized>(&mut self, dev: &mut D) -> Result<u32, VkError> {
        if let Some(slot) = self.stranded {
            return Err(VkError::StrandedSlot { slot });
        }
        let out = self.advance(dev);
        self.state = FrameState::Idle;
        let image = out?;
        self.slot = (self.slot + 1) % self.slot_count;
        self.frames += 1;
        Ok(image)
    }

    fn advance<D: FrameDevice + ?Sized>(&mut self, dev: &mut D) -> Result<u32, VkError> {
        let slot = self.slot;

        if self.fence_pending[slot] {
            debug!("slot {slot}: settling fence left by an abandoned frame");
            self.settle(dev, slot)?;
            dev.release(slot)?;
            self.fence_pending[slot] = false;
        }

        let image = dev.acquire(slot)?;
        self.state = FrameState::ImageAcquired;
        trace!("frame {}: slot {slot} acquired image {image}", self.frames);

        self.state = FrameState::RecordingCommands;
        if let Err(err) = dev.record(image).and_then(|()| dev.submit(slot)) {
            self.stranded = Some(slot);
            return Err(err);
        }
        self.fence_pending[slot] = true;
        self.state = FrameState::Submitted;

        self.settle(dev, slot)?;

        dev.present(image)?;
        self.state = FrameState::Presented;

        dev.release(slot)?;
        self.fence_pending[slot] = false;
        Ok(image)
    }

    fn settle<D: FrameDevice + ?Sized>(&self, dev: &mut D, slot: usize) -> Result<(), VkError> {
        let mut polls = 0u32;
        while dev.wait(slot, self.fence_timeout_ns)? == FenceStatus::NotReady {
            polls += 1;
            debug!("frame {}: fence not ready (poll {polls})", self.frames);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Acquire(usize),
        Record(u32),
        Submit(usize),
        Wait(usize),
        Present(u32),
        Release(usize),
    }

    const SLOTS: usize = 4;

    /// Swapchain stand-in: hands out images round robin and reports the
    /// fence as not ready `pending` times before signaling. Tracks each
    /// slot's semaphore and fence the way the driver would and logs misuse
    /// into `violations`. `fail_on` fails the named step once.
    struct MockDevice {
        images: u32,
        next_image: u32,
        pending: u32,
        fail_on: Option<&'static str>,
        calls: Vec<Call>,
        semaphore_signaled: [bool; SLOTS],
        fence_signaled: [bool; SLOTS],
        violations: Vec<String>,
    }

    impl MockDevice {
        fn with_images(images: u32) -> Self {
            Self {
                images,
                next_image: 0,
                pending: 0,
                fail_on: None,
                calls: Vec::new(),
                semaphore_signaled: [false; SLOTS],
                fence_signaled: [false; SLOTS],
                violations: Vec::new(),
            }
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls.iter().filter(|c| pred(c)).count()
        }

        fn check(&mut self, step: &'static str) -> Result<(), VkError> {
            if self.fail_on == Some(step) {
                self.fail_on = None;
                return Err(VkError::Vk {
                    call: step,
                    result: vk::Result::ERROR_DEVICE_LOST,
                });
            }
            Ok(())
        }
    }

    impl FrameDevice for MockDevice {
        fn acquire(&mut self, slot: usize) -> Result<u32, VkError> {
            self.calls.push(Call::Acquire(slot));
            self.check("acquire")?;
            if self.semaphore_signaled[slot] {
                self.violations
                    .push(format!("acquire on slot {slot} with its semaphore still signaled"));
            }
            self.semaphore_signaled[slot] = true;
            let image = self.next_image;
            self.next_image = (self.next_image + 1) % self.images;
            Ok(image)
        }

        fn record(&mut self, image: u32) -> Result<(), VkError> {
            self.calls.push(Call::Record(image));
            self.check("record")
        }

        fn submit(&mut self, slot: usize) -> Result<(), VkError> {
            self.calls.push(Call::Submit(slot));
            self.check("submit")?;
            if self.fence_signaled[slot] {
                self.violations
                    .push(format!("submit on slot {slot} with its fence already signaled"));
            }
            self.semaphore_signaled[slot] = false;
            self.fence_signaled[slot] = true;
            Ok(())
        }

        fn wait(&mut self, slot: usize, _timeout_ns: u64) -> Result<FenceStatus, VkError> {
            self.calls.push(Call::Wait(slot));
            self.check("wait")?;
            if self.pending > 0 {
                self.pending -= 1;
                return Ok(FenceStatus::NotReady);
            }
            Ok(FenceStatus::Signaled)
        }

        fn present(&mut self, image: u32) -> Result<(), VkError> {
            self.calls.push(Call::Present(image));
            self.check("present")
        }

        fn release(&mut self, slot: usize) -> Result<(), VkError> {
            self.calls.push(Call::Release(slot));
            self.check("release")?;
            self.fence_signaled[slot] = false;
            Ok(())
        }
    }

    #[test]
    fn single_render_touches_each_step_once() {
        let mut dev = MockDevice::with_images(2);
        dev.next_image = 1;
        let mut frame = FrameLoop::new(2, 100_000_000);

        let image = frame.render(&mut dev).unwrap();

        assert_eq!(image, 1);
        assert_eq!(dev.count(|c| matches!(c, Call::Acquire(_))), 1);
        assert_eq!(dev.count(|c| matches!(c, Call::Submit(_))), 1);
        assert_eq!(dev.count(|c| matches!(c, Call::Wait(_))), 1);
        assert_eq!(dev.count(|c| matches!(c, Call::Present(_))), 1);
        assert_eq!(
            dev.calls,
            vec![
                Call::Acquire(0),
                Call::Record(1),
                Call::Submit(0),
                Call::Wait(0),
                Call::Present(1),
                Call::Release(0),
            ]
        );
        assert_eq!(frame.state(), FrameState::Idle);
        assert_eq!(frame.frames(), 1);
    }

    #[test]
    fn not_ready_fence_is_polled_until_signaled() {
        let mut dev = MockDevice::with_images(2);
        dev.pending = 3;
        let mut frame = FrameLoop::new(2, 1);

        frame.render(&mut dev).unwrap();

        assert_eq!(dev.count(|c| matches!(c, Call::Wait(0))), 4);
        assert_eq!(dev.count(|c| matches!(c, Call::Present(0))), 1);
    }

    #[test]
    fn slots_cycle_through_the_pool() {
        let mut dev = MockDevice::with_images(3);
        let mut frame = FrameLoop::new(2, 1);

        for _ in 0..3 {
            frame.render(&mut dev).unwrap();
        }

        let slots: Vec<usize> = dev
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Submit(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 0]);
        assert_eq!(frame.slot(), 1);
        assert_eq!(frame.frames(), 3);
    }

    #[test]
    fn submit_failure_halts_the_loop() {
        let mut dev = MockDevice::with_images(2);
        dev.fail_on = Some("submit");
        let mut frame = FrameLoop::new(2, 1);

        let err = frame.render(&mut dev).unwrap_err();

        assert_eq!(err.vk_result(), Some(vk::Result::ERROR_DEVICE_LOST));
        assert_eq!(dev.count(|c| matches!(c, Call::Wait(_))), 0);
        assert_eq!(dev.count(|c| matches!(c, Call::Present(_))), 0);
        assert_eq!(frame.state(), FrameState::Idle);
        assert_eq!(frame.slot(), 0);
        assert_eq!(frame.frames(), 0);

        let calls = dev.calls.len();
        let err = frame.render(&mut dev).unwrap_err();
        assert!(matches!(err, VkError::StrandedSlot { slot: 0 }));
        assert_eq!(dev.calls.len(), calls);
        assert!(dev.violations.is_empty(), "{:?}", dev.violations);
    }

    #[test]
    fn record_failure_never_reacquires_the_signaled_semaphore() {
        let mut dev = MockDevice::with_images(2);
        dev.fail_on = Some("record");
        let mut frame = FrameLoop::new(1, 1);

        assert!(frame.render(&mut dev).is_err());
        for _ in 0..3 {
            assert!(matches!(
                frame.render(&mut dev),
                Err(VkError::StrandedSlot { slot: 0 })
            ));
        }

        assert_eq!(dev.count(|c| matches!(c, Call::Acquire(_))), 1);
        assert_eq!(dev.count(|c| matches!(c, Call::Submit(_))), 0);
        assert!(dev.violations.is_empty(), "{:?}", dev.violations);
    }

    #[test]
    fn acquire_failure_leaves_the_loop_usable() {
        let mut dev = MockDevice::with_images(2);
        dev.fail_on = Some("acquire");
        let mut frame = FrameLoop::new(2, 1);

        assert!(frame.render(&mut dev).is_err());
        frame.render(&mut dev).unwrap();

        assert_eq!(frame.frames(), 1);
        assert!(dev.violations.is_empty(), "{:?}", dev.violations);
    }

    #[test]
    fn present_failure_settles_the_fence_before_the_slot_is_reused() {
        let mut dev = MockDevice::with_images(2);
        dev.fail_on = Some("present");
        let mut frame = FrameLoop::new(1, 1);

        assert!(frame.render(&mut dev).is_err());
        assert_eq!(frame.slot(), 0);
        dev.calls.clear();

        let image = frame.render(&mut dev).unwrap();

        assert_eq!(
            dev.calls,
            vec![
                Call::Wait(0),
                Call::Release(0),
                Call::Acquire(0),
                Call::Record(image),
                Call::Submit(0),
                Call::Wait(0),
                Call::Present(image),
                Call::Release(0),
            ]
        );
        assert_eq!(frame.frames(), 1);
        assert!(dev.violations.is_empty(), "{:?}", dev.violations);
    }

    #[test]
    fn failed_release_is_retried_on_the_next_frame() {
        let mut dev = MockDevice::with_images(2);
        dev.fail_on = Some("release");
        let mut frame = FrameLoop::new(2, 1);

        assert!(frame.render(&mut dev).is_err());
        frame.render(&mut dev).unwrap();
        frame.render(&mut dev).unwrap();

        assert_eq!(dev.count(|c| matches!(c, Call::Release(0))), 3);
        assert!(dev.violations.is_empty(), "{:?}", dev.violations);
    }

    #[test]
    fn hard_wait_error_is_not_retried() {
        let mut dev = MockDevice::with_images(2);
        dev.fail_on = Some("wait");
        let mut frame = FrameLoop::new(2, 1);

        assert!(frame.render(&mut dev).is_err());
        assert_eq!(dev.count(|c| matches!(c, Call::Wait(_))), 1);
    }

    #[test]
    fn zero_slots_still_renders() {
        let mut dev = MockDevice::with_images(1);
        let mut frame = FrameLoop::new(0, 1);
        frame.render(&mut dev).unwrap();
        frame.render(&mut dev).unwrap();
        assert_eq!(frame.slot(), 0);
    }
}

//! Frame pipeline for managing multiple frames in flight.
//!
//! [`FramePipeline`] coordinates CPU-GPU synchronization across frames: the
//! CPU captures and compiles frame N+1 while the GPU executes frame N.
//!
//! # Frame Slots
//!
//! With N frames in flight there are N slots. Per-slot resources (the
//! transient pool of that slot) may only be touched again once the slot's
//! fence has signaled.
//!
//! ```text
//! frames_in_flight = 2
//!
//! Slot 0: [Frame 0] ──► [Frame 2] ──► [Frame 4] ──►
//! Slot 1: [Frame 1] ──► [Frame 3] ──► [Frame 5] ──►
//! ```
//!
//! # Stalls
//!
//! Waits never time out. Every `stall_warning_timeout` without progress the
//! wait logs a warning and asks the device whether it is still alive, so a
//! removed device surfaces as [`FrameGraphError::DeviceLost`] instead of a
//! hang.

use std::time::{Duration, Instant};

use crate::backend::{Fence, RenderDevice};
use crate::error::{FrameGraphError, FrameGraphResult};

#[derive(Debug)]
struct InFlightFrame {
    frame_number: u64,
    fence: Fence,
}

/// Manages multiple frames in flight for CPU-GPU parallelism.
///
/// Not thread-safe; owned by the frame graph on the render thread.
#[derive(Debug)]
pub struct FramePipeline {
    /// Last submitted frame per slot. `None` if the slot hasn't been used yet.
    slots: Vec<Option<InFlightFrame>>,
    current_slot: usize,
    frames_in_flight: usize,
    /// Total frames submitted.
    frame_count: u64,
    stall_warning_timeout: Duration,
}

impl FramePipeline {
    /// Create a new frame pipeline.
    ///
    /// # Panics
    ///
    /// Panics if `frames_in_flight` is 0.
    pub fn new(frames_in_flight: usize, stall_warning_timeout: Duration) -> Self {
        assert!(frames_in_flight > 0, "frames_in_flight must be at least 1");

        Self {
            slots: (0..frames_in_flight).map(|_| None).collect(),
            current_slot: 0,
            frames_in_flight,
            frame_count: 0,
            stall_warning_timeout,
        }
    }

    /// Begin a new frame, blocking until the current slot is free.
    ///
    /// Nothing is counted until [`end_frame`](Self::end_frame), so a frame
    /// that fails before submission can simply begin again.
    pub fn begin_frame(&mut self, device: &dyn RenderDevice) -> FrameGraphResult<()> {
        self.wait_slot(self.current_slot, device)?;

        log::trace!(
            "Begin frame {} (slot {})",
            self.current_frame(),
            self.current_slot
        );
        Ok(())
    }

    /// Record the fence of the submitted frame and advance to the next slot.
    pub fn end_frame(&mut self, fence: Fence) {
        self.frame_count += 1;
        log::trace!(
            "End frame {} (slot {})",
            self.frame_count,
            self.current_slot
        );

        self.slots[self.current_slot] = Some(InFlightFrame {
            frame_number: self.frame_count,
            fence,
        });
        self.current_slot = (self.current_slot + 1) % self.frames_in_flight;
    }

    /// Block until the oldest in-flight frame has finished on the GPU.
    ///
    /// The oldest frame lives in the slot the next frame will reuse. Once it
    /// has completed, further calls return immediately.
    pub fn wait_oldest(&self, device: &dyn RenderDevice) -> FrameGraphResult<()> {
        self.wait_slot(self.current_slot, device)
    }

    /// Block until every in-flight frame has finished.
    pub fn wait_idle(&self, device: &dyn RenderDevice) -> FrameGraphResult<()> {
        log::trace!("Waiting for GPU idle ({} slots)", self.frames_in_flight);

        // Oldest first, so stall warnings name frames in submission order
        for offset in 0..self.frames_in_flight {
            self.wait_slot((self.current_slot + offset) % self.frames_in_flight, device)?;
        }

        log::trace!("GPU idle");
        Ok(())
    }

    fn wait_slot(&self, slot: usize, device: &dyn RenderDevice) -> FrameGraphResult<()> {
        let Some(frame) = &self.slots[slot] else {
            return Ok(());
        };

        let start = Instant::now();
        while !frame.fence.wait_timeout(self.stall_warning_timeout) {
            device
                .check_device_status()
                .map_err(FrameGraphError::from_backend)?;
            log::warn!(
                "GPU stall: frame {} (slot {}) still pending after {:.1?}",
                frame.frame_number,
                slot,
                start.elapsed()
            );
        }
        Ok(())
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Slot of the frame currently being built, 0 to `frames_in_flight - 1`.
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Total frames submitted.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Number of the frame being built, one past the last submitted frame.
    pub fn current_frame(&self) -> u64 {
        self.frame_count + 1
    }

    /// Highest frame number `n` such that every frame up to `n` has
    /// completed on the GPU.
    pub fn last_completed_frame(&self) -> u64 {
        // A frame only leaves its slot after begin_frame waited on its fence
        self.slots
            .iter()
            .flatten()
            .filter(|frame| !frame.fence.is_signaled())
            .map(|frame| frame.frame_number.saturating_sub(1))
            .min()
            .unwrap_or(self.frame_count)
    }

    /// Check if a slot is ready (non-blocking).
    pub fn is_slot_ready(&self, slot: usize) -> bool {
        assert!(slot < self.frames_in_flight, "Invalid slot index");

        match &self.slots[slot] {
            Some(frame) => frame.fence.is_signaled(),
            None => true,
        }
    }

    /// Check if all slots are ready (non-blocking).
    pub fn is_idle(&self) -> bool {
        self.slots
            .iter()
            .flatten()
            .all(|frame| frame.fence.is_signaled())
    }
}

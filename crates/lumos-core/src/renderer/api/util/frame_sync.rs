// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Frame-in-flight pacing with explicit fence states.
//!
//! Per-frame resources (batch vertex buffers, uniform ring slots) are indexed
//! by the slot returned from [`FramesInFlight::begin_frame`] and may only be
//! overwritten once that slot is back in [`FenceState::Reusable`].
//!
//! ```text
//! Reusable ──begin──► Recording ──submit──► Submitted(i) ──gpu done──► GpuComplete
//!    ▲                    │                                              │
//!    └──────abandon───────┘◄──────────────────recycle────────────────────┘
//! ```

use crate::renderer::api::command::SubmissionIndex;
use crate::renderer::error::RenderError;
use crate::renderer::traits::SubmissionTracker;
use std::fmt;

/// Upper bound on concurrently recorded frames.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Synchronisation state of one frame slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    /// Resources of the slot may be overwritten.
    Reusable,
    /// The CPU is recording commands for this slot.
    Recording,
    /// Commands were submitted and may still run on the GPU.
    Submitted(SubmissionIndex),
    /// The GPU finished; resources are not yet recycled.
    GpuComplete,
}

impl fmt::Display for FenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FenceState::Reusable => write!(f, "Reusable"),
            FenceState::Recording => write!(f, "Recording"),
            FenceState::Submitted(index) => write!(f, "Submitted({})", index.0),
            FenceState::GpuComplete => write!(f, "GpuComplete"),
        }
    }
}

/// One entry of the frame ring.
#[derive(Debug, Clone, Copy)]
pub struct FrameSlot {
    /// Current fence state.
    pub state: FenceState,
    /// Frame number last recorded into this slot.
    pub frame_number: u64,
}

/// A ring of frame slots driven by submission completion.
#[derive(Debug)]
pub struct FramesInFlight {
    slots: Vec<FrameSlot>,
    current: usize,
    frame_counter: u64,
}

impl FramesInFlight {
    /// Creates `count` reusable slots.
    ///
    /// ## Errors
    /// * `RenderError::InvalidFrameState` - If `count` is outside `1..=3`.
    pub fn new(count: usize) -> Result<Self, RenderError> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&count) {
            return Err(RenderError::InvalidFrameState(format!(
                "frames in flight must be within 1..={MAX_FRAMES_IN_FLIGHT}, got {count}"
            )));
        }
        Ok(Self {
            slots: vec![
                FrameSlot {
                    state: FenceState::Reusable,
                    frame_number: 0,
                };
                count
            ],
            current: 0,
            frame_counter: 0,
        })
    }

    /// Number of slots in the ring.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always `false`; a ring has at least one slot.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The slot the next (or current) frame records into.
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Number of frames submitted so far.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// State of slot `index`.
    pub fn state(&self, index: usize) -> Option<FenceState> {
        self.slots.get(index).map(|s| s.state)
    }

    /// Promotes every finished submission to [`FenceState::GpuComplete`]
    /// without blocking.
    pub fn poll<T: SubmissionTracker + ?Sized>(&mut self, tracker: &T) {
        for slot in &mut self.slots {
            if let FenceState::Submitted(index) = slot.state {
                if tracker.poll_submission(index) {
                    slot.state = FenceState::GpuComplete;
                }
            }
        }
    }

    /// Starts recording into the current slot, blocking until its previous
    /// submission has finished on the GPU.
    ///
    /// ## Returns
    /// The slot index to use for per-frame resources.
    pub fn begin_frame<T: SubmissionTracker + ?Sized>(
        &mut self,
        tracker: &T,
    ) -> Result<usize, RenderError> {
        let current = self.current;
        if let FenceState::Submitted(index) = self.slots[current].state {
            log::trace!(
                "FramesInFlight: waiting on submission {} for slot {}",
                index.0,
                current
            );
            tracker.wait_for_submission(index)?;
            self.slots[current].state = FenceState::GpuComplete;
        }
        self.start_recording(current)
    }

    /// Non-blocking variant of [`begin_frame`](Self::begin_frame): returns
    /// `Ok(None)` while the slot's GPU work is still running.
    pub fn try_begin_frame<T: SubmissionTracker + ?Sized>(
        &mut self,
        tracker: &T,
    ) -> Result<Option<usize>, RenderError> {
        let current = self.current;
        if let FenceState::Submitted(index) = self.slots[current].state {
            if !tracker.poll_submission(index) {
                return Ok(None);
            }
            self.slots[current].state = FenceState::GpuComplete;
        }
        self.start_recording(current).map(Some)
    }

    fn start_recording(&mut self, current: usize) -> Result<usize, RenderError> {
        let slot = &mut self.slots[current];
        match slot.state {
            FenceState::GpuComplete | FenceState::Reusable => {
                slot.state = FenceState::Recording;
                slot.frame_number = self.frame_counter;
                Ok(current)
            }
            other => Err(RenderError::InvalidFrameState(format!(
                "slot {current} cannot start recording while {other}"
            ))),
        }
    }

    /// Marks the recording slot as submitted and advances the ring.
    pub fn submit(&mut self, index: SubmissionIndex) -> Result<(), RenderError> {
        let current = self.current;
        let slot = &mut self.slots[current];
        if slot.state != FenceState::Recording {
            return Err(RenderError::InvalidFrameState(format!(
                "slot {current} submitted while {}",
                slot.state
            )));
        }
        slot.state = FenceState::Submitted(index);
        self.frame_counter += 1;
        self.current = (current + 1) % self.slots.len();
        Ok(())
    }

    /// Drops the frame being recorded; the slot becomes reusable at once.
    pub fn abandon(&mut self) -> Result<(), RenderError> {
        let current = self.current;
        let slot = &mut self.slots[current];
        if slot.state != FenceState::Recording {
            return Err(RenderError::InvalidFrameState(format!(
                "slot {current} abandoned while {}",
                slot.state
            )));
        }
        slot.state = FenceState::Reusable;
        Ok(())
    }

    /// Blocks until every submitted slot has finished, then recycles them.
    pub fn wait_idle<T: SubmissionTracker + ?Sized>(
        &mut self,
        tracker: &T,
    ) -> Result<(), RenderError> {
        for slot in &mut self.slots {
            if let FenceState::Submitted(index) = slot.state {
                tracker.wait_for_submission(index)?;
                slot.state = FenceState::GpuComplete;
            }
            if slot.state == FenceState::GpuComplete {
                slot.state = FenceState::Reusable;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::error::ResourceError;
    use std::cell::RefCell;
    use std::collections::HashSet;

    #[derive(Default)]
    struct ManualTracker {
        completed: RefCell<HashSet<u64>>,
        waits: RefCell<Vec<u64>>,
    }

    impl ManualTracker {
        fn complete(&self, index: u64) {
            self.completed.borrow_mut().insert(index);
        }
    }

    impl SubmissionTracker for ManualTracker {
        fn poll_submission(&self, index: SubmissionIndex) -> bool {
            self.completed.borrow().contains(&index.0)
        }

        fn wait_for_submission(&self, index: SubmissionIndex) -> Result<(), ResourceError> {
            self.waits.borrow_mut().push(index.0);
            self.complete(index.0);
            Ok(())
        }
    }

    #[test]
    fn rejects_out_of_range_counts() {
        assert!(FramesInFlight::new(0).is_err());
        assert!(FramesInFlight::new(4).is_err());
        assert_eq!(FramesInFlight::new(3).unwrap().len(), 3);
    }

    #[test]
    fn slot_follows_full_cycle() {
        let tracker = ManualTracker::default();
        let mut frames = FramesInFlight::new(2).unwrap();

        assert_eq!(frames.begin_frame(&tracker).unwrap(), 0);
        assert_eq!(frames.state(0), Some(FenceState::Recording));
        frames.submit(SubmissionIndex(10)).unwrap();
        assert_eq!(frames.state(0), Some(FenceState::Submitted(SubmissionIndex(10))));

        assert_eq!(frames.begin_frame(&tracker).unwrap(), 1);
        frames.submit(SubmissionIndex(11)).unwrap();

        tracker.complete(10);
        frames.poll(&tracker);
        assert_eq!(frames.state(0), Some(FenceState::GpuComplete));

        assert_eq!(frames.begin_frame(&tracker).unwrap(), 0);
        assert!(tracker.waits.borrow().is_empty());
    }

    #[test]
    fn begin_blocks_on_unfinished_slot() {
        let tracker = ManualTracker::default();
        let mut frames = FramesInFlight::new(1).unwrap();
        frames.begin_frame(&tracker).unwrap();
        frames.submit(SubmissionIndex(1)).unwrap();

        assert_eq!(frames.try_begin_frame(&tracker).unwrap(), None);
        assert_eq!(frames.begin_frame(&tracker).unwrap(), 0);
        assert_eq!(*tracker.waits.borrow(), vec![1]);
    }

    #[test]
    fn invalid_transitions_are_errors() {
        let tracker = ManualTracker::default();
        let mut frames = FramesInFlight::new(2).unwrap();
        assert!(matches!(
            frames.submit(SubmissionIndex(0)),
            Err(RenderError::InvalidFrameState(_))
        ));
        frames.begin_frame(&tracker).unwrap();
        assert!(frames.begin_frame(&tracker).is_err());
        frames.abandon().unwrap();
        assert_eq!(frames.state(0), Some(FenceState::Reusable));
        assert!(frames.abandon().is_err());
    }

    #[test]
    fn wait_idle_recycles_everything() {
        let tracker = ManualTracker::default();
        let mut frames = FramesInFlight::new(3).unwrap();
        for i in 0..3 {
            frames.begin_frame(&tracker).unwrap();
            frames.submit(SubmissionIndex(i)).unwrap();
        }
        frames.wait_idle(&tracker).unwrap();
        assert!((0..3).all(|i| frames.state(i) == Some(FenceState::Reusable)));
        assert_eq!(frames.frame_counter(), 3);
    }
}

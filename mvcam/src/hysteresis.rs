//! # Temporal persistence of motion
//!
//! A single frame with a big enough region is not yet motion. The tracker keeps the decisions of
//! the last `window` frames and only latches the trigger once a long enough stretch of them
//! contains motion. The trigger is released only after the window holds no motion at all.

use std::collections::VecDeque;

/// Fixed capacity FIFO of per-frame motion decisions.
#[derive(Clone, Debug)]
pub struct MotionHistory {
    frames: VecDeque<bool>,
    window: usize,
}

impl MotionHistory {
    pub fn new(window: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(window),
            window,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Append a decision, evicting the oldest one once the window is full.
    pub fn push(&mut self, motion: bool) {
        if self.window == 0 {
            return;
        }

        if self.frames.len() == self.window {
            self.frames.pop_front();
        }

        self.frames.push_back(motion);
    }

    /// Length of the longest contiguous stretch of motion frames anywhere in the window.
    pub fn longest_run(&self) -> usize {
        self.frames
            .iter()
            .fold((0, 0), |(longest, current), &motion| {
                let current = if motion { current + 1 } else { 0 };
                (longest.max(current), current)
            })
            .0
    }

    /// Number of motion frames in the window.
    pub fn count(&self) -> usize {
        self.frames.iter().filter(|&&m| m).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.frames.iter().copied()
    }
}

/// What to do with the trigger after a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerUpdate {
    Set,
    Clear,
    Hold,
}

/// Hysteresis latch over a motion history.
#[derive(Clone, Debug)]
pub struct HysteresisTracker {
    history: MotionHistory,
    frames: usize,
}

impl HysteresisTracker {
    /// Create a new tracker.
    ///
    /// # Arguments
    ///
    /// * `window` - number of frame decisions to keep.
    /// * `frames` - minimum run of motion frames to set the trigger.
    pub fn new(window: usize, frames: usize) -> Self {
        Self {
            history: MotionHistory::new(window),
            frames,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn set_frames(&mut self, frames: usize) {
        self.frames = frames;
    }

    pub fn history(&self) -> &MotionHistory {
        &self.history
    }

    /// Record the decision of the next frame and compute the trigger transition.
    pub fn update(&mut self, motion: bool) -> TriggerUpdate {
        self.history.push(motion);
        self.evaluate()
    }

    /// Age the history with a no-motion frame without evaluating the latch.
    pub fn age(&mut self) {
        self.history.push(false);
    }

    fn evaluate(&self) -> TriggerUpdate {
        let longest = self.history.longest_run();

        if longest == 0 {
            TriggerUpdate::Clear
        } else if longest >= self.frames {
            TriggerUpdate::Set
        } else {
            TriggerUpdate::Hold
        }
    }
}
